//! Spike removal and motion-artifact correction
//!
//! Both steps work on the whole buffered filtered series. Spike removal
//! compares every sample against an edge-padded running median; motion
//! detection compares the sample-to-sample step against the trailing local
//! standard deviation and the flagged samples are then re-drawn by linear
//! interpolation.

use crate::config::ArtifactConfig;
use breath_core::stats::{median, population_std};
use breath_core::{invalid_parameter, BreathResult};

/// Running median with replicated edges; output has the input's length
pub fn median_filter(signal: &[f64], kernel_size: usize) -> BreathResult<Vec<f64>> {
    if kernel_size == 0 || kernel_size % 2 == 0 {
        return Err(invalid_parameter!(
            "median kernel must be odd, got {}",
            kernel_size
        ));
    }
    if signal.is_empty() {
        return Ok(Vec::new());
    }

    let half = kernel_size / 2;
    let last = signal.len() - 1;
    let mut window = Vec::with_capacity(kernel_size);

    let mut output = Vec::with_capacity(signal.len());
    for i in 0..signal.len() {
        window.clear();
        window.extend((0..kernel_size).map(|k| signal[(i + k).saturating_sub(half).min(last)]));
        output.push(median(&window).unwrap_or(signal[i]));
    }
    Ok(output)
}

/// Replace spikes with the running median.
///
/// A sample is a spike when it deviates from the median reference by more
/// than `threshold` population standard deviations of the whole signal.
pub fn remove_spikes(signal: &[f64], kernel_size: usize, threshold: f64) -> BreathResult<Vec<f64>> {
    remove_spikes_counted(signal, kernel_size, threshold).map(|(cleaned, _)| cleaned)
}

/// Flag samples whose step from the previous sample exceeds `threshold`
/// times the standard deviation of the trailing `window` samples.
pub fn detect_motion_artifacts(
    signal: &[f64],
    window: usize,
    threshold: f64,
) -> BreathResult<Vec<bool>> {
    if window == 0 {
        return Err(invalid_parameter!("motion window must be at least 1"));
    }
    if threshold.is_nan() || threshold < 0.0 {
        return Err(invalid_parameter!(
            "motion threshold must be non-negative, got {}",
            threshold
        ));
    }

    Ok((0..signal.len())
        .map(|i| {
            if i == 0 {
                return false;
            }
            let diff = (signal[i] - signal[i - 1]).abs();
            let start = (i + 1).saturating_sub(window);
            let local_std = population_std(&signal[start..=i]);
            diff > threshold * local_std
        })
        .collect())
}

/// Mark flagged samples as missing (NaN)
pub fn mask_artifacts(signal: &[f64], mask: &[bool]) -> Vec<f64> {
    signal
        .iter()
        .zip(mask.iter().chain(std::iter::repeat(&false)))
        .map(|(&x, &flagged)| if flagged { f64::NAN } else { x })
        .collect()
}

/// Fill missing (NaN) samples by linear interpolation between the nearest
/// valid neighbours. Gaps touching either end hold the nearest valid value;
/// a signal with no valid sample comes back unchanged.
pub fn interpolate_artifacts(signal: &[f64]) -> Vec<f64> {
    let valid: Vec<usize> = (0..signal.len()).filter(|&i| !signal[i].is_nan()).collect();
    let (Some(&first), Some(&last)) = (valid.first(), valid.last()) else {
        return signal.to_vec();
    };

    let mut output = signal.to_vec();
    output[..first].fill(signal[first]);
    output[last + 1..].fill(signal[last]);

    for pair in valid.windows(2) {
        let (left, right) = (pair[0], pair[1]);
        if right - left < 2 {
            continue;
        }
        let span = (right - left) as f64;
        let (y0, y1) = (signal[left], signal[right]);
        for (offset, slot) in output[left + 1..right].iter_mut().enumerate() {
            let t = (offset + 1) as f64 / span;
            *slot = y0 + (y1 - y0) * t;
        }
    }
    output
}

/// Result of one correction pass
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    /// Corrected series, same length as the input
    pub signal: Vec<f64>,
    /// Samples replaced by the median reference
    pub spikes_replaced: usize,
    /// Samples re-drawn after motion detection
    pub artifacts_interpolated: usize,
    /// False when the history was too short and the input passed through
    pub applied: bool,
}

/// Spike removal followed by motion-artifact interpolation
#[derive(Debug, Clone)]
pub struct ArtifactCorrector {
    config: ArtifactConfig,
}

impl ArtifactCorrector {
    pub fn new(config: ArtifactConfig) -> BreathResult<Self> {
        if config.spike_kernel == 0 || config.spike_kernel % 2 == 0 {
            return Err(invalid_parameter!(
                "spike kernel must be odd, got {}",
                config.spike_kernel
            ));
        }
        if config.motion_window == 0 {
            return Err(invalid_parameter!("motion window must be at least 1"));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ArtifactConfig {
        &self.config
    }

    /// Correct the full buffered series
    pub fn correct(&self, buffer: &[f64]) -> BreathResult<Correction> {
        if !self.config.enabled || buffer.len() < self.config.min_history {
            return Ok(Correction {
                signal: buffer.to_vec(),
                spikes_replaced: 0,
                artifacts_interpolated: 0,
                applied: false,
            });
        }

        let (despiked, spikes_replaced) =
            remove_spikes_counted(buffer, self.config.spike_kernel, self.config.spike_threshold)?;
        let mask = detect_motion_artifacts(
            &despiked,
            self.config.motion_window,
            self.config.motion_threshold,
        )?;
        let artifacts_interpolated = mask.iter().filter(|&&flagged| flagged).count();
        let signal = if artifacts_interpolated > 0 {
            interpolate_artifacts(&mask_artifacts(&despiked, &mask))
        } else {
            despiked
        };

        Ok(Correction {
            signal,
            spikes_replaced,
            artifacts_interpolated,
            applied: true,
        })
    }
}

fn remove_spikes_counted(
    signal: &[f64],
    kernel_size: usize,
    threshold: f64,
) -> BreathResult<(Vec<f64>, usize)> {
    if threshold.is_nan() || threshold < 0.0 {
        return Err(invalid_parameter!(
            "spike threshold must be non-negative, got {}",
            threshold
        ));
    }
    let reference = median_filter(signal, kernel_size)?;
    let limit = threshold * population_std(signal);

    let mut replaced = 0;
    let cleaned = signal
        .iter()
        .zip(&reference)
        .map(|(&x, &med)| {
            if (x - med).abs() > limit {
                replaced += 1;
                med
            } else {
                x
            }
        })
        .collect();
    Ok((cleaned, replaced))
}
