//! Breathing-belt signal simulator with sensor offset, drift and artifacts
//!
//! Produces BITalino-style frames `[seq, d0, d1, d2, d3, a0, a1, ...]`: a
//! 4-bit sequence counter, four digital inputs and one 10-bit analog value
//! per acquired channel.

use crate::signal_patterns::BreathingPattern;
use breath_core::{BreathError, BreathResult, Sample};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Frame offset of the first analog channel
pub const ANALOG_OFFSET: usize = 5;

/// Largest value of the 10-bit analog converter
pub const ADC_MAX: f64 = 1023.0;

/// Configuration for belt simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeltConfig {
    /// Sampling rate in Hz
    pub sampling_rate: f64,
    /// Number of analog channels in each frame
    pub channel_count: usize,
    /// Respiration pattern to generate
    pub pattern: BreathingPattern,
    /// Resting sensor reading in ADC counts
    pub adc_offset: f64,
    /// ADC counts per unit of chest displacement
    pub counts_per_unit: f64,
    /// Relative gain per channel; negative inverts the sensor
    pub channel_gains: Vec<f64>,
    /// Noise configuration
    pub noise: NoiseConfig,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
}

/// Noise and artifact configuration, amplitudes in ADC counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Gaussian noise standard deviation (0.0 = no noise)
    pub gaussian_std: f64,
    /// Slow baseline drift amplitude
    pub baseline_drift: f64,
    /// Baseline drift frequency in Hz
    pub drift_frequency: f64,
    /// Per-sample probability of a one-sample spike
    pub spike_prob: f64,
    /// Spike amplitude
    pub spike_amp: f64,
    /// Per-sample probability that a motion artifact starts
    pub motion_artifact_prob: f64,
    /// Motion artifact amplitude
    pub motion_artifact_amp: f64,
    /// Motion artifact duration in seconds
    pub motion_artifact_secs: f64,
}

impl NoiseConfig {
    /// No noise, drift or artifacts
    pub fn clean() -> Self {
        Self {
            gaussian_std: 0.0,
            baseline_drift: 0.0,
            drift_frequency: 0.01,
            spike_prob: 0.0,
            spike_amp: 0.0,
            motion_artifact_prob: 0.0,
            motion_artifact_amp: 0.0,
            motion_artifact_secs: 0.0,
        }
    }
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            gaussian_std: 1.5,
            baseline_drift: 25.0,
            drift_frequency: 0.01,
            spike_prob: 0.002,
            spike_amp: 250.0,
            motion_artifact_prob: 0.0005,
            motion_artifact_amp: 120.0,
            motion_artifact_secs: 1.5,
        }
    }
}

impl Default for BeltConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 100.0,
            channel_count: 2,
            pattern: BreathingPattern::default(),
            adc_offset: 512.0,
            counts_per_unit: 120.0,
            channel_gains: vec![1.0, 0.7],
            noise: NoiseConfig::default(),
            seed: None,
        }
    }
}

/// Ongoing motion artifact
#[derive(Debug, Clone, Copy)]
struct MotionEvent {
    remaining: usize,
    total: usize,
    amplitude: f64,
}

/// Breathing-belt simulator
pub struct BeltSimulator {
    config: BeltConfig,
    rng: StdRng,
    normal_dist: Option<Normal<f64>>,
    sample_index: u64,
    motion: Option<MotionEvent>,
}

impl BeltSimulator {
    /// Create new belt simulator with configuration
    pub fn new(config: BeltConfig) -> BreathResult<Self> {
        validate(&config)?;

        let seed = config.seed.unwrap_or_else(rand::random);
        let normal_dist = noise_distribution(config.noise.gaussian_std)?;

        Ok(Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            normal_dist,
            sample_index: 0,
            motion: None,
        })
    }

    /// Generate the next `count` frames
    pub fn generate(&mut self, count: usize) -> Vec<Sample> {
        (0..count).map(|_| self.next_frame()).collect()
    }

    /// Generate one frame
    pub fn next_frame(&mut self) -> Sample {
        let time = self.sample_index as f64 / self.config.sampling_rate;
        let displacement = self.config.pattern.displacement_at_time(time);
        let disturbance = self.disturbance(time);

        let mut values = Vec::with_capacity(ANALOG_OFFSET + self.config.channel_count);
        values.push((self.sample_index % 16) as f64);
        values.extend([0.0; 4]);
        for channel in 0..self.config.channel_count {
            let gain = self.config.channel_gains.get(channel).copied().unwrap_or(1.0);
            let noise = match &self.normal_dist {
                Some(normal) => normal.sample(&mut self.rng),
                None => 0.0,
            };
            let reading = self.config.adc_offset
                + gain * self.config.counts_per_unit * displacement
                + disturbance
                + noise;
            values.push(reading.round().clamp(0.0, ADC_MAX));
        }

        self.sample_index += 1;
        Sample::new(time, values)
    }

    /// Drift, spikes and motion artifacts shared by every channel
    fn disturbance(&mut self, time: f64) -> f64 {
        let noise = &self.config.noise;
        let mut value = noise.baseline_drift * (2.0 * PI * noise.drift_frequency * time).sin();

        if noise.spike_prob > 0.0 && self.rng.gen::<f64>() < noise.spike_prob {
            value += noise.spike_amp * if self.rng.gen::<bool>() { 1.0 } else { -1.0 };
        }

        if self.motion.is_none()
            && noise.motion_artifact_prob > 0.0
            && self.rng.gen::<f64>() < noise.motion_artifact_prob
        {
            let total = (noise.motion_artifact_secs * self.config.sampling_rate).max(1.0) as usize;
            self.motion = Some(MotionEvent {
                remaining: total,
                total,
                amplitude: noise.motion_artifact_amp * self.rng.gen_range(-1.0..1.0),
            });
        }
        if let Some(event) = self.motion.as_mut() {
            // Abrupt shift that settles back over the event
            let progress = 1.0 - event.remaining as f64 / event.total as f64;
            value += event.amplitude * (1.0 - progress);
            event.remaining -= 1;
            if event.remaining == 0 {
                self.motion = None;
            }
        }

        value
    }

    /// Reconfigure rate and channel count, keeping the time base
    pub fn configure(&mut self, sampling_rate: f64, channel_count: usize) -> BreathResult<()> {
        let mut config = self.config.clone();
        config.sampling_rate = sampling_rate;
        config.channel_count = channel_count;
        validate(&config)?;

        // Keep elapsed time continuous across a rate change
        let elapsed = self.sample_index as f64 / self.config.sampling_rate;
        self.sample_index = (elapsed * sampling_rate).round() as u64;
        self.config = config;
        Ok(())
    }

    /// Frames produced so far
    pub fn samples_generated(&self) -> u64 {
        self.sample_index
    }

    /// Reset time offset (useful for restarting simulation)
    pub fn reset_time(&mut self) {
        self.sample_index = 0;
        self.motion = None;
    }

    /// Get current configuration
    pub fn config(&self) -> &BeltConfig {
        &self.config
    }
}

fn validate(config: &BeltConfig) -> BreathResult<()> {
    if !config.sampling_rate.is_finite() || config.sampling_rate <= 0.0 {
        return Err(BreathError::ConfigurationError {
            message: format!("Sampling rate must be positive, got {}", config.sampling_rate),
        });
    }
    if config.channel_count == 0 || config.channel_count > 6 {
        return Err(BreathError::ConfigurationError {
            message: format!(
                "Belt frames carry 1 to 6 analog channels, got {}",
                config.channel_count
            ),
        });
    }
    Ok(())
}

fn noise_distribution(std_dev: f64) -> BreathResult<Option<Normal<f64>>> {
    if std_dev == 0.0 {
        return Ok(None);
    }
    Normal::new(0.0, std_dev)
        .map(Some)
        .map_err(|e| BreathError::ConfigurationError {
            message: format!("Failed to create normal distribution: {}", e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use breath_core::ChannelStats;

    fn seeded(noise: NoiseConfig) -> BeltSimulator {
        BeltSimulator::new(BeltConfig {
            noise,
            seed: Some(7),
            ..BeltConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_frame_layout() {
        let mut simulator = seeded(NoiseConfig::default());
        let frames = simulator.generate(40);

        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.width(), ANALOG_OFFSET + 2);
            assert_eq!(frame.values[0], (i % 16) as f64);
            assert!((frame.timestamp - i as f64 / 100.0).abs() < 1e-12);
            for &analog in &frame.values[ANALOG_OFFSET..] {
                assert!((0.0..=ADC_MAX).contains(&analog));
            }
        }
        assert_eq!(simulator.samples_generated(), 40);
    }

    #[test]
    fn test_signal_sits_on_offset() {
        let mut simulator = seeded(NoiseConfig::clean());
        let channel: Vec<f64> = simulator
            .generate(400)
            .iter()
            .map(|frame| frame.values[ANALOG_OFFSET])
            .collect();

        let stats = ChannelStats::calculate(&channel);
        assert!((stats.mean - 512.0).abs() < 5.0);
        // 120 counts per unit at unit depth
        assert!(stats.peak_to_peak > 200.0 && stats.peak_to_peak < 250.0);
    }

    #[test]
    fn test_seed_reproducible() {
        let a = seeded(NoiseConfig::default()).generate(500);
        let b = seeded(NoiseConfig::default()).generate(500);
        assert_eq!(a, b);
    }

    #[test]
    fn test_configure_keeps_time() {
        let mut simulator = seeded(NoiseConfig::clean());
        simulator.generate(100);
        simulator.configure(1000.0, 1).unwrap();
        let frame = simulator.next_frame();
        assert!((frame.timestamp - 1.0).abs() < 1e-12);
        assert_eq!(frame.width(), ANALOG_OFFSET + 1);
        assert!(simulator.configure(100.0, 0).is_err());
    }
}
