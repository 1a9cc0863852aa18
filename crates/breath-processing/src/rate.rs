//! Breathing-rate estimation from the corrected series
//!
//! The latest window is de-meaned, Hann-windowed and zero-padded before a
//! real FFT. The strongest bin inside the breathing band gives the rate.

use crate::config::RateConfig;
use breath_core::{BreathError, BreathResult};
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// One rate estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateEstimate {
    pub breaths_per_minute: f64,
    pub frequency_hz: f64,
    /// Share of in-band power carried by the peak bin (0.0-1.0)
    pub confidence: f64,
    /// Seconds of signal the estimate was computed from
    pub window_secs: f64,
}

/// Spectral breathing-rate estimator
pub struct BreathingRateEstimator {
    sampling_rate: f64,
    window_samples: usize,
    min_samples: usize,
    band: (f64, f64),
    planner: RealFftPlanner<f64>,
}

impl BreathingRateEstimator {
    pub fn new(sampling_rate: f64, config: &RateConfig) -> Self {
        Self {
            sampling_rate,
            window_samples: (config.window_secs * sampling_rate).round() as usize,
            min_samples: (config.min_window_secs * sampling_rate).round().max(2.0) as usize,
            band: (config.band_low_hz, config.band_high_hz),
            planner: RealFftPlanner::new(),
        }
    }

    /// Estimate from the tail of `series`; `None` until enough history exists
    /// or when the band carries no power.
    pub fn estimate(&mut self, series: &[f64]) -> BreathResult<Option<RateEstimate>> {
        if series.len() < self.min_samples {
            return Ok(None);
        }
        let window = &series[series.len().saturating_sub(self.window_samples)..];
        let n = window.len();

        let mean = window.iter().sum::<f64>() / n as f64;
        let fft_len = (n * 4).next_power_of_two();
        let fft = self.planner.plan_fft_forward(fft_len);

        let mut input = fft.make_input_vec();
        for (i, (slot, &x)) in input.iter_mut().zip(window).enumerate() {
            let hann = 0.5 * (1.0 - (2.0 * PI * i as f64 / (n - 1) as f64).cos());
            *slot = (x - mean) * hann;
        }
        let mut spectrum = fft.make_output_vec();
        fft.process(&mut input, &mut spectrum)
            .map_err(|e| BreathError::ProcessingError {
                message: format!("FFT failed: {}", e),
            })?;

        let resolution = self.sampling_rate / fft_len as f64;
        let low_bin = (self.band.0 / resolution).ceil() as usize;
        let high_bin = ((self.band.1 / resolution).floor() as usize).min(spectrum.len() - 1);
        if low_bin > high_bin {
            return Ok(None);
        }

        let power: Vec<f64> = spectrum[low_bin..=high_bin].iter().map(|c| c.norm_sqr()).collect();
        let total: f64 = power.iter().sum();
        if total <= f64::EPSILON {
            return Ok(None);
        }
        let (peak, peak_power) = power
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best });

        let frequency_hz = (low_bin + peak) as f64 * resolution;
        Ok(Some(RateEstimate {
            breaths_per_minute: frequency_hz * 60.0,
            frequency_hz,
            confidence: peak_power / total,
            window_secs: n as f64 / self.sampling_rate,
        }))
    }
}
