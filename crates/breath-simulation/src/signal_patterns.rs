//! Pre-defined respiration patterns for belt simulation
//!
//! Patterns describe chest displacement over time in arbitrary units,
//! roughly within `[-depth, depth]`.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Predefined breathing patterns
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BreathingPattern {
    /// Steady breathing at a fixed rate
    Regular { rate_bpm: f64, depth: f64 },
    /// Rate wandering slowly around a centre rate
    Variable {
        rate_bpm: f64,
        depth: f64,
        /// Peak rate deviation in breaths per minute
        rate_variation: f64,
        /// Seconds per full wander cycle
        variation_period: f64,
    },
    /// Breathing interrupted by pauses
    Apnea {
        rate_bpm: f64,
        depth: f64,
        breathing_secs: f64,
        pause_secs: f64,
    },
    /// Regular breathing with a periodic deep breath
    Sigh {
        rate_bpm: f64,
        depth: f64,
        sigh_every_secs: f64,
        sigh_depth: f64,
    },
}

impl BreathingPattern {
    /// Chest displacement at time `time` (seconds)
    pub fn displacement_at_time(&self, time: f64) -> f64 {
        match *self {
            BreathingPattern::Regular { rate_bpm, depth } => {
                depth * (2.0 * PI * rate_bpm / 60.0 * time).sin()
            }

            BreathingPattern::Variable {
                rate_bpm,
                depth,
                rate_variation,
                variation_period,
            } => {
                // Integrate the instantaneous frequency so the phase stays continuous
                let f0 = rate_bpm / 60.0;
                let df = rate_variation / 60.0;
                let wander = df * variation_period / (2.0 * PI)
                    * (1.0 - (2.0 * PI * time / variation_period).cos());
                depth * (2.0 * PI * (f0 * time + wander)).sin()
            }

            BreathingPattern::Apnea {
                rate_bpm,
                depth,
                breathing_secs,
                pause_secs,
            } => {
                let phase = time % (breathing_secs + pause_secs);
                if phase < breathing_secs {
                    depth * (2.0 * PI * rate_bpm / 60.0 * phase).sin()
                } else {
                    0.0
                }
            }

            BreathingPattern::Sigh {
                rate_bpm,
                depth,
                sigh_every_secs,
                sigh_depth,
            } => {
                let period = 60.0 / rate_bpm;
                let since_sigh = time % sigh_every_secs;
                let amplitude = if since_sigh < period { sigh_depth } else { depth };
                amplitude * (2.0 * PI * time / period).sin()
            }
        }
    }

    /// Centre breathing rate
    pub fn nominal_rate_bpm(&self) -> f64 {
        match *self {
            BreathingPattern::Regular { rate_bpm, .. }
            | BreathingPattern::Variable { rate_bpm, .. }
            | BreathingPattern::Apnea { rate_bpm, .. }
            | BreathingPattern::Sigh { rate_bpm, .. } => rate_bpm,
        }
    }

    /// Get pattern description
    pub fn description(&self) -> &'static str {
        match self {
            BreathingPattern::Regular { .. } => "Regular breathing",
            BreathingPattern::Variable { .. } => "Variable rate",
            BreathingPattern::Apnea { .. } => "Breathing with apnea pauses",
            BreathingPattern::Sigh { .. } => "Breathing with periodic sighs",
        }
    }

    /// Look up a preset by name, case-insensitively
    pub fn preset(name: &str) -> Option<BreathingPattern> {
        Self::presets()
            .into_iter()
            .find(|(preset, _)| preset.eq_ignore_ascii_case(name))
            .map(|(_, pattern)| pattern)
    }

    /// Create common preset patterns
    pub fn presets() -> Vec<(&'static str, BreathingPattern)> {
        vec![
            ("regular", BreathingPattern::Regular { rate_bpm: 15.0, depth: 1.0 }),
            ("slow", BreathingPattern::Regular { rate_bpm: 8.0, depth: 1.4 }),
            ("fast", BreathingPattern::Regular { rate_bpm: 28.0, depth: 0.6 }),
            ("variable", BreathingPattern::Variable {
                rate_bpm: 15.0, depth: 1.0, rate_variation: 4.0, variation_period: 60.0
            }),
            ("apnea", BreathingPattern::Apnea {
                rate_bpm: 14.0, depth: 1.0, breathing_secs: 30.0, pause_secs: 12.0
            }),
            ("deep", BreathingPattern::Sigh {
                rate_bpm: 12.0, depth: 0.8, sigh_every_secs: 45.0, sigh_depth: 2.0
            }),
        ]
    }
}

impl Default for BreathingPattern {
    fn default() -> Self {
        BreathingPattern::Regular { rate_bpm: 15.0, depth: 1.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_period() {
        let pattern = BreathingPattern::Regular { rate_bpm: 15.0, depth: 2.0 };
        // 15 bpm: one breath every 4 s, peak at 1 s
        assert!((pattern.displacement_at_time(1.0) - 2.0).abs() < 1e-12);
        assert!(pattern.displacement_at_time(4.0).abs() < 1e-12);
    }

    #[test]
    fn test_apnea_pause_is_flat() {
        let pattern = BreathingPattern::preset("apnea").unwrap();
        for i in 0..100 {
            let t = 30.5 + i as f64 * 0.1;
            assert_eq!(pattern.displacement_at_time(t), 0.0);
        }
    }

    #[test]
    fn test_presets_bounded() {
        for (name, pattern) in BreathingPattern::presets() {
            let peak = (0..6000)
                .map(|i| pattern.displacement_at_time(i as f64 * 0.01).abs())
                .fold(0.0, f64::max);
            assert!(peak > 0.1 && peak <= 2.0 + 1e-9, "{}: {}", name, peak);
            assert!(pattern.nominal_rate_bpm() > 0.0);
        }
        assert!(BreathingPattern::preset("DEEP").is_some());
        assert!(BreathingPattern::preset("hiccups").is_none());
    }
}
