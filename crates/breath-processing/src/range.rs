//! Windowed min/max tracking for adaptive normalization
//!
//! The window does not decay: once `reset_interval` has elapsed since the
//! window opened, the next observation starts a fresh window seeded by it.

use breath_core::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Bounds of the current normalization window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeWindow {
    pub max: f64,
    pub min: f64,
    /// Clock reading when the window opened
    pub window_start: Duration,
}

impl RangeWindow {
    fn seeded(value: f64, now: Duration) -> Self {
        Self {
            max: value,
            min: value,
            window_start: now,
        }
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TrackerState {
    Cold,
    Tracking(RangeWindow),
}

/// Min/max tracker with periodic full reset
pub struct RangeTracker {
    clock: Arc<dyn Clock>,
    reset_interval: Duration,
    state: TrackerState,
    resets: u64,
}

impl RangeTracker {
    pub fn new(reset_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            reset_interval,
            state: TrackerState::Cold,
            resets: 0,
        }
    }

    /// Fold one observation into the window. Non-finite values are ignored.
    pub fn update(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        let now = self.clock.now();
        let interval = self.reset_interval;
        match self.state {
            TrackerState::Tracking(ref mut window)
                if now.saturating_sub(window.window_start) <= interval =>
            {
                window.max = window.max.max(value);
                window.min = window.min.min(value);
            }
            TrackerState::Tracking(_) => {
                self.resets += 1;
                self.state = TrackerState::Tracking(RangeWindow::seeded(value, now));
            }
            TrackerState::Cold => {
                self.state = TrackerState::Tracking(RangeWindow::seeded(value, now));
            }
        }
    }

    /// `(max, min)`, both `None` while cold
    pub fn current_range(&self) -> (Option<f64>, Option<f64>) {
        match &self.state {
            TrackerState::Cold => (None, None),
            TrackerState::Tracking(window) => (Some(window.max), Some(window.min)),
        }
    }

    pub fn window(&self) -> Option<&RangeWindow> {
        match &self.state {
            TrackerState::Cold => None,
            TrackerState::Tracking(window) => Some(window),
        }
    }

    pub fn is_cold(&self) -> bool {
        self.state == TrackerState::Cold
    }

    /// Windows discarded because the interval elapsed
    pub fn resets(&self) -> u64 {
        self.resets
    }

    pub fn reset_interval(&self) -> Duration {
        self.reset_interval
    }
}

impl std::fmt::Debug for RangeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeTracker")
            .field("reset_interval", &self.reset_interval)
            .field("state", &self.state)
            .field("resets", &self.resets)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breath_core::ManualClock;

    fn tracker(clock: &Arc<ManualClock>) -> RangeTracker {
        RangeTracker::new(Duration::from_secs(60), clock.clone())
    }

    #[test]
    fn test_cold_until_first_update() {
        let clock = Arc::new(ManualClock::new());
        let mut range = tracker(&clock);
        assert!(range.is_cold());
        assert_eq!(range.current_range(), (None, None));

        range.update(f64::NAN);
        assert!(range.is_cold());

        range.update(0.4);
        assert_eq!(range.current_range(), (Some(0.4), Some(0.4)));
    }

    #[test]
    fn test_bounds_widen_monotonically() {
        let clock = Arc::new(ManualClock::new());
        let mut range = tracker(&clock);

        let values = [0.0, 1.5, -0.5, 0.7, 2.0, -1.0, 0.1];
        let mut last_max = f64::NEG_INFINITY;
        let mut last_min = f64::INFINITY;
        for value in values {
            clock.advance(Duration::from_secs(5));
            range.update(value);
            let (max, min) = range.current_range();
            let (max, min) = (max.unwrap(), min.unwrap());
            assert!(max >= last_max && min <= last_min && min <= max);
            last_max = max;
            last_min = min;
        }
        assert_eq!(range.current_range(), (Some(2.0), Some(-1.0)));
        assert_eq!(range.resets(), 0);
    }

    #[test]
    fn test_reset_after_interval() {
        let clock = Arc::new(ManualClock::new());
        let mut range = tracker(&clock);
        range.update(-3.0);
        range.update(3.0);

        // Exactly the interval still counts as the same window
        clock.advance(Duration::from_secs(60));
        range.update(0.5);
        assert_eq!(range.current_range(), (Some(3.0), Some(-3.0)));

        clock.advance(Duration::from_millis(1));
        range.update(0.5);
        assert_eq!(range.current_range(), (Some(0.5), Some(0.5)));
        assert_eq!(range.resets(), 1);
        assert_eq!(
            range.window().map(|w| w.window_start),
            Some(Duration::from_millis(60_001))
        );
    }
}
