//! Per-batch orchestration: filter, buffer, correct, normalize
//!
//! Each configured sensor channel runs in its own lane with its own filter
//! states, buffers and normalization window. Filter coefficients are shared
//! read-only between lanes.

use crate::artifact::ArtifactCorrector;
use crate::buffer::SignalBuffer;
use crate::config::ProcessingConfig;
use crate::filters::{FilterChain, FilterCoefficients};
use crate::normalize::AdaptiveNormalizer;
use crate::range::RangeTracker;
use breath_core::{BreathError, BreathResult, ChannelStats, Clock, Sample, Value};
use std::sync::Arc;
use tracing::{debug, trace};

/// Everything one batch produced
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutput {
    /// Running sample index of each emitted value
    pub indices: Vec<u64>,
    /// Device timestamp of each emitted value
    pub timestamps: Vec<f64>,
    /// Normalized values, one per sample, channels in configured order
    pub values: Vec<Value>,
    /// Spikes replaced by this batch's correction pass, all channels
    pub spikes_replaced: usize,
    /// Samples interpolated by this batch's correction pass, all channels
    pub artifacts_interpolated: usize,
}

impl BatchOutput {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Processing state of one sensor channel
#[derive(Debug)]
struct ChannelLane {
    frame_offset: usize,
    filters: FilterChain,
    raw: SignalBuffer,
    filtered: SignalBuffer,
    corrected: Vec<f64>,
    normalizer: AdaptiveNormalizer,
}

/// Streaming conditioning pipeline
#[derive(Debug)]
pub struct StreamPipeline {
    lanes: Vec<ChannelLane>,
    corrector: ArtifactCorrector,
    coefficients: Vec<Arc<FilterCoefficients>>,
    next_index: u64,
}

impl StreamPipeline {
    /// Build from a configuration; filter design errors surface here
    pub fn new(config: &ProcessingConfig, clock: Arc<dyn Clock>) -> BreathResult<Self> {
        config.validate()?;

        let coefficients = config
            .filters
            .iter()
            .map(|filter| filter.design(config.sampling_rate_hz()).map(Arc::new))
            .collect::<BreathResult<Vec<_>>>()?;

        let lanes = config
            .device
            .frame_offsets
            .iter()
            .map(|&frame_offset| ChannelLane {
                frame_offset,
                filters: FilterChain::new(&coefficients),
                raw: SignalBuffer::with_capacity_limit(config.history_limit),
                filtered: SignalBuffer::with_capacity_limit(config.history_limit),
                corrected: Vec::new(),
                normalizer: AdaptiveNormalizer::new(
                    config.normalization.reset_interval(),
                    clock.clone(),
                ),
            })
            .collect();

        debug!(
            channels = config.channel_count(),
            stages = coefficients.len(),
            "Pipeline ready"
        );

        Ok(Self {
            lanes,
            corrector: ArtifactCorrector::new(config.artifacts.clone())?,
            coefficients,
            next_index: 0,
        })
    }

    /// Process one batch in arrival order.
    ///
    /// Frames are checked up front; a malformed frame rejects the whole
    /// batch without touching any state.
    pub fn process_batch(&mut self, samples: &[Sample]) -> BreathResult<BatchOutput> {
        let offsets: Vec<usize> = self.lanes.iter().map(|lane| lane.frame_offset).collect();
        let frames = samples
            .iter()
            .map(|sample| {
                let channels = sample.channels(&offsets)?;
                if let Some(bad) = channels.iter().find(|v| !v.is_finite()) {
                    return Err(BreathError::InvalidSignalData {
                        reason: format!("non-finite sensor value {} at t={}", bad, sample.timestamp),
                    });
                }
                Ok(channels)
            })
            .collect::<BreathResult<Vec<_>>>()?;

        let indices: Vec<u64> = (self.next_index..self.next_index + frames.len() as u64).collect();
        self.next_index += frames.len() as u64;

        let mut fresh = vec![Vec::with_capacity(frames.len()); self.lanes.len()];
        for (frame, &index) in frames.iter().zip(&indices) {
            for ((lane, &raw), fresh) in self.lanes.iter_mut().zip(frame).zip(&mut fresh) {
                lane.raw.push(index, raw);
                let filtered = lane.filters.process(raw);
                lane.filtered.push(index, filtered);
                fresh.push(filtered);
            }
        }

        let mut spikes_replaced = 0;
        let mut artifacts_interpolated = 0;
        let mut tails = Vec::with_capacity(self.lanes.len());
        for (lane, fresh) in self.lanes.iter_mut().zip(&fresh) {
            let correction = self.corrector.correct(lane.filtered.values())?;
            spikes_replaced += correction.spikes_replaced;
            artifacts_interpolated += correction.artifacts_interpolated;
            lane.corrected = correction.signal;

            // A batch larger than the history cap has samples already evicted;
            // those are emitted uncorrected
            let corrected = frames.len().min(lane.corrected.len());
            let evicted = frames.len() - corrected;
            let skip = lane.corrected.len() - corrected;
            let tail: Vec<f64> = fresh[..evicted]
                .iter()
                .chain(&lane.corrected[skip..])
                .map(|&v| lane.normalizer.push(v))
                .collect();
            tails.push(tail);
        }

        let values = (0..frames.len())
            .map(|j| Value::from_channels(tails.iter().map(|tail| tail[j]).collect()))
            .collect();

        trace!(
            samples = frames.len(),
            spikes_replaced,
            artifacts_interpolated,
            "Batch processed"
        );

        Ok(BatchOutput {
            indices,
            timestamps: samples.iter().map(|s| s.timestamp).collect(),
            values,
            spikes_replaced,
            artifacts_interpolated,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.lanes.len()
    }

    /// Samples processed since construction
    pub fn samples_processed(&self) -> u64 {
        self.next_index
    }

    pub fn coefficients(&self) -> &[Arc<FilterCoefficients>] {
        &self.coefficients
    }

    /// Latest corrected series of a channel with its sample indices
    pub fn corrected_series(&mut self, channel: usize) -> Option<(&[f64], &[u64])> {
        let lane = self.lanes.get_mut(channel)?;
        Some((&lane.corrected[..], lane.filtered.indices()))
    }

    /// Raw sensor history of a channel
    pub fn raw_series(&mut self, channel: usize) -> Option<&[f64]> {
        Some(self.lanes.get_mut(channel)?.raw.values())
    }

    /// Filtered history of a channel, before artifact correction
    pub fn filtered_series(&mut self, channel: usize) -> Option<&[f64]> {
        Some(self.lanes.get_mut(channel)?.filtered.values())
    }

    pub fn range(&self, channel: usize) -> Option<&RangeTracker> {
        self.lanes.get(channel).map(|lane| lane.normalizer.range())
    }

    /// Statistics of a channel's corrected series
    pub fn channel_stats(&self, channel: usize) -> Option<ChannelStats> {
        self.lanes
            .get(channel)
            .map(|lane| ChannelStats::calculate(&lane.corrected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterConfig;
    use breath_core::ManualClock;
    use std::f64::consts::PI;

    fn frame(i: usize, a0: f64, a1: f64) -> Sample {
        Sample::new(
            i as f64 / 100.0,
            vec![(i % 16) as f64, 0.0, 0.0, 0.0, 0.0, a0, a1],
        )
    }

    fn breathing(i: usize) -> f64 {
        512.0 + 40.0 * (2.0 * PI * 0.25 * i as f64 / 100.0).sin()
    }

    fn single_channel(mut config: ProcessingConfig) -> ProcessingConfig {
        config.device.channels = vec![0];
        config.device.frame_offsets = vec![5];
        config
    }

    #[test]
    fn test_two_channel_vectors() {
        let clock = Arc::new(ManualClock::new());
        let mut pipeline = StreamPipeline::new(&ProcessingConfig::breathing_belt(), clock).unwrap();
        assert_eq!(pipeline.channel_count(), 2);

        let mut emitted = 0;
        for batch in 0..30 {
            let samples: Vec<Sample> = (batch * 10..batch * 10 + 10)
                .map(|i| frame(i, breathing(i), 1023.0 - breathing(i)))
                .collect();
            let output = pipeline.process_batch(&samples).unwrap();
            assert_eq!(output.len(), 10);
            assert_eq!(output.indices[0], batch as u64 * 10);
            for value in &output.values {
                let Value::Vector(channels) = value else {
                    panic!("expected two-channel vector");
                };
                assert_eq!(channels.len(), 2);
                assert!(channels.iter().all(|v| (0.0..=1.0).contains(v)));
            }
            emitted += output.len();
        }
        assert_eq!(emitted, 300);
        assert_eq!(pipeline.samples_processed(), 300);

        let (values, indices) = pipeline.corrected_series(1).unwrap();
        assert_eq!(values.len(), 300);
        assert_eq!(indices.last(), Some(&299));
    }

    #[test]
    fn test_single_channel_scalars() {
        let clock = Arc::new(ManualClock::new());
        let config = single_channel(ProcessingConfig::bandpass_only());
        let mut pipeline = StreamPipeline::new(&config, clock).unwrap();

        let samples: Vec<Sample> = (0..20).map(|i| frame(i, 7.0, 0.0)).collect();
        let output = pipeline.process_batch(&samples).unwrap();
        for value in output.values {
            let Value::Scalar(v) = value else {
                panic!("expected scalar");
            };
            assert!(v.is_finite() && (0.0..=1.0).contains(&v));
        }

        // Constant input through the bandpass stays at rest
        let filtered = pipeline.filtered_series(0).unwrap();
        assert!(filtered.iter().all(|y| y.abs() < 1e-9));
    }

    #[test]
    fn test_state_carries_across_batches() {
        let mut config = single_channel(ProcessingConfig::breathing_belt());
        config.artifacts.enabled = false;

        let samples: Vec<Sample> = (0..200).map(|i| frame(i, breathing(i), 0.0)).collect();

        let mut whole = StreamPipeline::new(&config, Arc::new(ManualClock::new())).unwrap();
        let whole_output = whole.process_batch(&samples).unwrap();

        let mut split = StreamPipeline::new(&config, Arc::new(ManualClock::new())).unwrap();
        let mut split_values = Vec::new();
        for chunk in samples.chunks(10) {
            split_values.extend(split.process_batch(chunk).unwrap().values);
        }

        assert_eq!(whole.filtered_series(0), split.filtered_series(0));
        assert_eq!(whole_output.values, split_values);
    }

    #[test]
    fn test_spike_corrected_in_series() {
        let clock = Arc::new(ManualClock::new());
        // A gentle highpass keeps the spike narrow enough to stand out
        let mut config = single_channel(ProcessingConfig::breathing_belt());
        config.filters = vec![FilterConfig::highpass(0.05, 2)];
        let mut pipeline = StreamPipeline::new(&config, clock).unwrap();

        let mut total_spikes = 0;
        for batch in 0..40 {
            let samples: Vec<Sample> = (batch * 10..batch * 10 + 10)
                .map(|i| {
                    let spike = if i == 305 { 400.0 } else { 0.0 };
                    frame(i, breathing(i) + spike, 0.0)
                })
                .collect();
            total_spikes += pipeline.process_batch(&samples).unwrap().spikes_replaced;
        }
        assert!(total_spikes > 0);

        let raw_peak = pipeline
            .filtered_series(0)
            .unwrap()
            .iter()
            .fold(0.0f64, |acc, v| acc.max(v.abs()));
        let (corrected, _) = pipeline.corrected_series(0).unwrap();
        let corrected_peak = corrected.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        assert!(corrected_peak < raw_peak);
    }

    #[test]
    fn test_malformed_frame_rejects_batch() {
        let clock = Arc::new(ManualClock::new());
        let mut pipeline = StreamPipeline::new(&ProcessingConfig::breathing_belt(), clock).unwrap();

        let samples = vec![
            frame(0, 500.0, 500.0),
            Sample::new(0.01, vec![1.0, 0.0, 0.0, 0.0, 0.0, 500.0]),
        ];
        let result = pipeline.process_batch(&samples);
        assert!(matches!(result, Err(BreathError::InvalidSignalData { .. })));
        assert_eq!(pipeline.samples_processed(), 0);
        assert_eq!(pipeline.raw_series(0).map(<[f64]>::len), Some(0));

        let samples = vec![frame(0, f64::NAN, 500.0)];
        assert!(pipeline.process_batch(&samples).is_err());
    }

    #[test]
    fn test_history_limit_bounds_buffers() {
        let clock = Arc::new(ManualClock::new());
        let mut config = single_channel(ProcessingConfig::breathing_belt());
        config.history_limit = Some(50);
        let mut pipeline = StreamPipeline::new(&config, clock).unwrap();

        for batch in 0..20 {
            let samples: Vec<Sample> = (batch * 10..batch * 10 + 10)
                .map(|i| frame(i, breathing(i), 0.0))
                .collect();
            pipeline.process_batch(&samples).unwrap();
        }
        let (values, indices) = pipeline.corrected_series(0).unwrap();
        assert_eq!(values.len(), 50);
        assert_eq!(indices.first(), Some(&150));
    }

    #[test]
    fn test_batch_larger_than_history_limit() {
        let clock = Arc::new(ManualClock::new());
        let mut config = single_channel(ProcessingConfig::breathing_belt());
        config.history_limit = Some(10);
        let mut pipeline = StreamPipeline::new(&config, clock).unwrap();

        // The device handed back more frames than the cap holds
        let samples: Vec<Sample> = (0..25).map(|i| frame(i, breathing(i), 0.0)).collect();
        let output = pipeline.process_batch(&samples).unwrap();
        assert_eq!(output.len(), 25);
        assert_eq!(output.indices.last(), Some(&24));
        for value in &output.values {
            let Value::Scalar(v) = value else {
                panic!("expected scalar");
            };
            assert!((0.0..=1.0).contains(v));
        }

        let (values, indices) = pipeline.corrected_series(0).unwrap();
        assert_eq!(values.len(), 10);
        assert_eq!(indices.first(), Some(&15));
    }

    #[test]
    fn test_invalid_filter_rejected_at_construction() {
        let mut config = ProcessingConfig::breathing_belt();
        config.filters.push(FilterConfig::highpass(75.0, 2));
        let result = StreamPipeline::new(&config, Arc::new(ManualClock::new()));
        assert!(matches!(result, Err(BreathError::InvalidParameter { .. })));
    }
}
