//! Breath-Processing: signal conditioning for breathing-belt streams
//!
//! Zero-transient Butterworth filtering, spike and motion-artifact
//! correction, adaptive normalization, rate estimation and the acquisition
//! loop that ties them to a device.

pub mod artifact;
pub mod buffer;
pub mod config;
pub mod filters;
pub mod normalize;
pub mod pipeline;
pub mod range;
pub mod rate;
pub mod session;

pub use artifact::{
    detect_motion_artifacts, interpolate_artifacts, mask_artifacts, median_filter,
    remove_spikes, ArtifactCorrector, Correction,
};
pub use buffer::SignalBuffer;
pub use config::{
    ArtifactConfig, DeviceConfig, NormalizationConfig, OutletConfig, PlotConfig,
    ProcessingConfig, RateConfig, ReconnectPolicy,
};
pub use filters::{
    apply_batch, apply_sample, design, initial_state, Cutoff, FilterChain, FilterCoefficients,
    FilterConfig, FilterStage, FilterState, FilterType,
};
pub use normalize::{normalize, AdaptiveNormalizer, FLAT_RANGE_VALUE};
pub use pipeline::{BatchOutput, StreamPipeline};
pub use range::{RangeTracker, RangeWindow};
pub use rate::{BreathingRateEstimator, RateEstimate};
pub use session::{AcquisitionSession, SessionSummary};
