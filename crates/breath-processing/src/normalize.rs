//! Min/max normalization into [0, 1]

use crate::range::RangeTracker;
use breath_core::Clock;
use std::sync::Arc;
use std::time::Duration;

/// Value returned for a degenerate (flat or unknown) range
pub const FLAT_RANGE_VALUE: f64 = 0.5;

/// Rescale `value` linearly so `min` maps to 0 and `max` to 1.
///
/// A zero-width or unknown range yields 0.5, as does a non-finite value.
/// Results are clamped to `[0, 1]`.
pub fn normalize(value: f64, min: Option<f64>, max: Option<f64>) -> f64 {
    let (Some(min), Some(max)) = (min, max) else {
        return FLAT_RANGE_VALUE;
    };
    let width = max - min;
    if width == 0.0 || !width.is_finite() || !value.is_finite() {
        return FLAT_RANGE_VALUE;
    }
    ((value - min) / width).clamp(0.0, 1.0)
}

/// Range tracking and normalization for one channel
#[derive(Debug)]
pub struct AdaptiveNormalizer {
    range: RangeTracker,
}

impl AdaptiveNormalizer {
    pub fn new(reset_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            range: RangeTracker::new(reset_interval, clock),
        }
    }

    /// Update the range with `value`, then normalize it against that range
    pub fn push(&mut self, value: f64) -> f64 {
        self.range.update(value);
        let (max, min) = self.range.current_range();
        normalize(value, min, max)
    }

    pub fn range(&self) -> &RangeTracker {
        &self.range
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breath_core::ManualClock;

    #[test]
    fn test_degenerate_range() {
        for v in [-10.0, 0.0, 0.3, 1e9] {
            assert_eq!(normalize(v, Some(2.0), Some(2.0)), 0.5);
        }
        assert_eq!(normalize(1.0, None, None), 0.5);
        assert_eq!(normalize(f64::NAN, Some(0.0), Some(1.0)), 0.5);
    }

    #[test]
    fn test_endpoints_and_monotonicity() {
        assert_eq!(normalize(-2.0, Some(-2.0), Some(6.0)), 0.0);
        assert_eq!(normalize(6.0, Some(-2.0), Some(6.0)), 1.0);
        assert_eq!(normalize(2.0, Some(-2.0), Some(6.0)), 0.5);

        let mut last = 0.0;
        for i in 0..=100 {
            let v = -3.0 + i as f64 * 0.1;
            let n = normalize(v, Some(-2.0), Some(6.0));
            assert!(n >= last && (0.0..=1.0).contains(&n));
            last = n;
        }
    }

    #[test]
    fn test_adaptive_normalizer() {
        let clock = Arc::new(ManualClock::new());
        let mut normalizer = AdaptiveNormalizer::new(Duration::from_secs(60), clock.clone());

        // First observation sees a flat range
        assert_eq!(normalizer.push(4.0), 0.5);
        assert_eq!(normalizer.push(8.0), 1.0);
        assert_eq!(normalizer.push(4.0), 0.0);
        assert_eq!(normalizer.push(6.0), 0.5);

        clock.advance(Duration::from_secs(61));
        assert_eq!(normalizer.push(100.0), 0.5);
        assert_eq!(normalizer.range().current_range(), (Some(100.0), Some(100.0)));
    }
}
