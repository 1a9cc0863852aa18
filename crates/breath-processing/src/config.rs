//! Configuration management for the acquisition pipeline

use crate::filters::FilterConfig;
use breath_core::{config_error, BreathError, BreathResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Global processing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Configuration name/profile
    pub name: String,
    /// Acquisition device parameters
    pub device: DeviceConfig,
    /// Filter stages in execution order
    pub filters: Vec<FilterConfig>,
    /// Spike and motion-artifact correction
    pub artifacts: ArtifactConfig,
    /// Adaptive min/max normalization
    pub normalization: NormalizationConfig,
    /// Cap on buffered samples per channel; `None` keeps the whole run
    pub history_limit: Option<usize>,
    /// Breathing-rate estimation
    pub rate: RateConfig,
    /// Network publish sink
    pub outlet: OutletConfig,
    /// Plot sink
    pub plot: PlotConfig,
    /// Reconnect behaviour on recoverable faults
    pub reconnect: ReconnectPolicy,
}

/// Acquisition device parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device identifier (MAC address, port, simulator name)
    pub identifier: String,
    /// Sampling rate in Hz
    pub sampling_rate: u32,
    /// Acquisition channels enabled on the device
    pub channels: Vec<usize>,
    /// Frame offsets holding the sensor values, one per channel
    pub frame_offsets: Vec<usize>,
    /// Samples per blocking read
    pub batch_size: usize,
}

/// Artifact correction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactConfig {
    pub enabled: bool,
    /// Filtered samples required before correction runs
    pub min_history: usize,
    /// Median kernel for spike removal (odd)
    pub spike_kernel: usize,
    /// Spike threshold in standard deviations
    pub spike_threshold: f64,
    /// Trailing window for the local standard deviation
    pub motion_window: usize,
    /// Motion threshold in local standard deviations
    pub motion_threshold: f64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_history: 5,
            spike_kernel: 5,
            spike_threshold: 3.0,
            motion_window: 10,
            motion_threshold: 5.0,
        }
    }
}

/// Normalization window parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationConfig {
    /// Seconds after which the min/max window starts over
    pub reset_interval_secs: f64,
}

impl NormalizationConfig {
    pub fn reset_interval(&self) -> Duration {
        Duration::from_secs_f64(self.reset_interval_secs)
    }
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            reset_interval_secs: 60.0,
        }
    }
}

/// Breathing-rate estimation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateConfig {
    pub enabled: bool,
    /// Analysis window in seconds
    pub window_secs: f64,
    /// Shortest history worth estimating from
    pub min_window_secs: f64,
    /// Lower edge of the breathing band (Hz)
    pub band_low_hz: f64,
    /// Upper edge of the breathing band (Hz)
    pub band_high_hz: f64,
    /// Estimate every N batches
    pub every_batches: usize,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 30.0,
            min_window_secs: 10.0,
            band_low_hz: 0.1,
            band_high_hz: 1.0,
            every_batches: 100,
        }
    }
}

/// Publish sink parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutletConfig {
    pub enabled: bool,
    /// Logical stream name consumers match on
    pub stream_name: String,
    /// Logical stream type consumers match on
    pub stream_type: String,
    pub source_id: String,
    /// Declared rate, 0 meaning irregular
    pub nominal_srate: f64,
    /// Datagram destination, multicast allowed
    pub destination: String,
}

impl Default for OutletConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stream_name: "BreathingBelt".to_string(),
            stream_type: "Breathing".to_string(),
            source_id: "breathingbelt001".to_string(),
            nominal_srate: 0.0,
            destination: "239.255.42.99:16571".to_string(),
        }
    }
}

/// Plot sink parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotConfig {
    pub enabled: bool,
    /// Reuse one frame across redraws; otherwise draw once
    pub live: bool,
    /// Which configured channel to plot
    pub channel: usize,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            live: true,
            channel: 0,
        }
    }
}

/// Reconnect policy for recoverable source faults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Consecutive reconnect attempts before giving up
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Longest a blocking read may wait before it counts as a stall
    pub read_timeout_ms: u64,
}

impl ReconnectPolicy {
    /// Wait before reconnect attempt `attempt` (1-based): doubling, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            read_timeout_ms: 2_000,
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self::breathing_belt()
    }
}

/// Preset configurations for common setups
impl ProcessingConfig {
    /// Reference two-sensor belt: 100 Hz, offsets 5 and 6, highpass then bandpass
    pub fn breathing_belt() -> Self {
        Self {
            name: "Breathing belt".to_string(),
            device: DeviceConfig {
                identifier: "98:D3:C1:FD:FF:DB".to_string(),
                sampling_rate: 100,
                channels: vec![0, 1],
                frame_offsets: vec![5, 6],
                batch_size: 10,
            },
            filters: vec![
                FilterConfig::highpass(0.05, 5),
                FilterConfig::bandpass(0.1, 1.0, 2),
            ],
            artifacts: ArtifactConfig::default(),
            normalization: NormalizationConfig::default(),
            history_limit: None,
            rate: RateConfig::default(),
            outlet: OutletConfig::default(),
            plot: PlotConfig::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Same acquisition with the bandpass stage alone
    pub fn bandpass_only() -> Self {
        Self {
            name: "Breathing belt (bandpass only)".to_string(),
            filters: vec![FilterConfig::bandpass(0.1, 1.0, 2)],
            ..Self::breathing_belt()
        }
    }

    /// Number of sensor channels processed
    pub fn channel_count(&self) -> usize {
        self.device.frame_offsets.len()
    }

    pub fn sampling_rate_hz(&self) -> f64 {
        self.device.sampling_rate as f64
    }

    /// Validate entire configuration
    pub fn validate(&self) -> BreathResult<()> {
        let device = &self.device;
        if device.identifier.trim().is_empty() {
            return Err(config_error!("Device identifier must not be empty"));
        }
        if device.sampling_rate == 0 {
            return Err(config_error!("Sampling rate must be greater than 0"));
        }
        if device.batch_size == 0 {
            return Err(config_error!("Batch size must be greater than 0"));
        }
        if device.frame_offsets.is_empty() || device.frame_offsets.len() > 2 {
            return Err(config_error!(
                "Between 1 and 2 sensor channels are supported, got {}",
                device.frame_offsets.len()
            ));
        }
        if device.channels.len() != device.frame_offsets.len() {
            return Err(config_error!(
                "{} acquisition channels but {} frame offsets",
                device.channels.len(),
                device.frame_offsets.len()
            ));
        }

        if self.filters.is_empty() {
            return Err(config_error!("At least one filter stage is required"));
        }
        for filter in &self.filters {
            filter.design(self.sampling_rate_hz())?;
        }

        let artifacts = &self.artifacts;
        if artifacts.spike_kernel == 0 || artifacts.spike_kernel % 2 == 0 {
            return Err(config_error!(
                "Spike kernel must be odd, got {}",
                artifacts.spike_kernel
            ));
        }
        if artifacts.motion_window == 0 {
            return Err(config_error!("Motion window must be greater than 0"));
        }
        if !is_non_negative(artifacts.spike_threshold) || !is_non_negative(artifacts.motion_threshold) {
            return Err(config_error!("Artifact thresholds must be non-negative"));
        }

        let interval = self.normalization.reset_interval_secs;
        if !interval.is_finite() || interval <= 0.0 {
            return Err(config_error!("Normalization interval must be positive"));
        }

        if let Some(limit) = self.history_limit {
            if limit < device.batch_size {
                return Err(config_error!(
                    "History limit {} must hold at least one batch of {}",
                    limit,
                    device.batch_size
                ));
            }
        }

        if self.rate.enabled {
            let rate = &self.rate;
            if !is_positive(rate.min_window_secs) || rate.window_secs < rate.min_window_secs {
                return Err(config_error!(
                    "Rate window {} s must cover the minimum {} s",
                    rate.window_secs,
                    rate.min_window_secs
                ));
            }
            if !is_positive(rate.band_low_hz)
                || rate.band_low_hz >= rate.band_high_hz
                || rate.band_high_hz >= self.sampling_rate_hz() / 2.0
            {
                return Err(config_error!(
                    "Breathing band {}-{} Hz is invalid",
                    rate.band_low_hz,
                    rate.band_high_hz
                ));
            }
            if rate.every_batches == 0 {
                return Err(config_error!("Rate cadence must be greater than 0"));
            }
        }

        if self.outlet.enabled {
            if self.outlet.stream_name.is_empty() || self.outlet.stream_type.is_empty() {
                return Err(config_error!("Outlet stream name and type are required"));
            }
            if self.outlet.nominal_srate < 0.0 {
                return Err(config_error!("Outlet nominal rate must be non-negative"));
            }
        }

        if self.plot.enabled && self.plot.channel >= self.channel_count() {
            return Err(config_error!(
                "Plot channel {} out of range for {} channel(s)",
                self.plot.channel,
                self.channel_count()
            ));
        }

        if self.reconnect.initial_backoff_ms > self.reconnect.max_backoff_ms {
            return Err(config_error!("Initial backoff exceeds maximum backoff"));
        }
        if self.reconnect.read_timeout_ms == 0 {
            return Err(config_error!("Read timeout must be greater than 0"));
        }

        Ok(())
    }

    /// Export configuration to JSON
    pub fn to_json(&self) -> BreathResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| BreathError::ConfigurationError {
            message: format!("Failed to serialize configuration: {}", e),
        })
    }

    /// Import configuration from JSON
    pub fn from_json(json: &str) -> BreathResult<Self> {
        serde_json::from_str(json).map_err(|e| BreathError::ConfigurationError {
            message: format!("Failed to deserialize configuration: {}", e),
        })
    }

    /// Read a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> BreathResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| BreathError::ConfigurationError {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        Self::from_json(&json)
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        let belt = ProcessingConfig::breathing_belt();
        assert!(belt.validate().is_ok());
        assert_eq!(belt.channel_count(), 2);
        assert_eq!(belt.filters.len(), 2);

        let bandpass = ProcessingConfig::bandpass_only();
        assert!(bandpass.validate().is_ok());
        assert_eq!(bandpass.filters, vec![FilterConfig::bandpass(0.1, 1.0, 2)]);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ProcessingConfig::breathing_belt();
        config.device.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = ProcessingConfig::breathing_belt();
        config.device.frame_offsets = vec![5];
        assert!(config.validate().is_err());

        let mut config = ProcessingConfig::breathing_belt();
        config.device.channels = vec![0, 1, 2];
        config.device.frame_offsets = vec![5, 6, 7];
        assert!(config.validate().is_err());

        let mut config = ProcessingConfig::breathing_belt();
        config.artifacts.spike_kernel = 4;
        assert!(config.validate().is_err());

        let mut config = ProcessingConfig::breathing_belt();
        config.normalization.reset_interval_secs = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_history_limit_must_hold_a_batch() {
        let mut config = ProcessingConfig::breathing_belt();
        config.history_limit = Some(5);
        assert!(matches!(
            config.validate(),
            Err(BreathError::ConfigurationError { .. })
        ));

        config.history_limit = Some(0);
        assert!(config.validate().is_err());

        config.history_limit = Some(config.device.batch_size);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_filter_errors_surface_before_streaming() {
        let mut config = ProcessingConfig::breathing_belt();
        config.filters = vec![FilterConfig::bandpass(1.0, 0.1, 2)];
        assert!(matches!(
            config.validate(),
            Err(BreathError::InvalidParameter { .. })
        ));

        config.filters = vec![FilterConfig::highpass(80.0, 2)];
        assert!(matches!(
            config.validate(),
            Err(BreathError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy {
            max_attempts: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            read_timeout_ms: 50,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(800));
        assert_eq!(policy.backoff(5), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(60), Duration::from_millis(1_000));
    }

    #[test]
    fn test_config_serialization() {
        let config = ProcessingConfig::breathing_belt();
        let json = config.to_json().unwrap();
        let restored = ProcessingConfig::from_json(&json).unwrap();
        assert_eq!(config, restored);

        // Missing sections fall back to the reference preset
        let partial = ProcessingConfig::from_json(r#"{"history_limit": 3000}"#).unwrap();
        assert_eq!(partial.history_limit, Some(3000));
        assert_eq!(partial.device, ProcessingConfig::breathing_belt().device);

        assert!(ProcessingConfig::from_json("not json").is_err());
    }
}
