//! Descriptive statistics over sample slices
//!
//! Standard deviations here are population (divide by `n`).

use serde::{Deserialize, Serialize};

/// Arithmetic mean, 0.0 for an empty slice
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population standard deviation, 0.0 for an empty slice
pub fn population_std(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mean = mean(data);
    let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / data.len() as f64;
    variance.sqrt()
}

/// Median of a slice; for even lengths the upper middle element.
///
/// Returns `None` for an empty slice. Ordering is `f64::total_cmp`, so a
/// positive NaN ranks above every number and a negative NaN below.
pub fn median(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let mut scratch = data.to_vec();
    let mid = scratch.len() / 2;
    let (_, value, _) = scratch.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    Some(*value)
}

/// Basic statistics for one signal channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean: f64,
    pub rms: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub peak_to_peak: f64,
}

impl ChannelStats {
    pub fn calculate(data: &[f64]) -> Self {
        if data.is_empty() {
            return Self {
                mean: 0.0,
                rms: 0.0,
                std_dev: 0.0,
                min: 0.0,
                max: 0.0,
                peak_to_peak: 0.0,
            };
        }

        let sum_sq: f64 = data.iter().map(|x| x * x).sum();
        let rms = (sum_sq / data.len() as f64).sqrt();

        let min = data.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = data.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

        Self {
            mean: mean(data),
            rms,
            std_dev: population_std(data),
            min,
            max,
            peak_to_peak: max - min,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_population_std() {
        // Classic example: population std of this set is exactly 2
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((population_std(&data) - 2.0).abs() < 1e-12);
        assert_eq!(population_std(&[3.0]), 0.0);
        assert_eq!(population_std(&[]), 0.0);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[5.0, 1.0, 3.0]), Some(3.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(3.0));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_channel_stats() {
        let stats = ChannelStats::calculate(&[-1.0, 1.0, -1.0, 1.0]);
        assert_eq!(stats.mean, 0.0);
        assert!((stats.rms - 1.0).abs() < 1e-12);
        assert!((stats.std_dev - 1.0).abs() < 1e-12);
        assert_eq!(stats.peak_to_peak, 2.0);

        let empty = ChannelStats::calculate(&[]);
        assert_eq!(empty.max, 0.0);
    }
}
