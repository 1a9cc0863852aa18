//! Blocking acquisition loop with reconnect and guaranteed teardown
//!
//! connect, start, then repeat: check the stop flag, read one batch,
//! process it, emit it. Connection drops and read stalls tear the device
//! down and reconnect with exponential backoff; any other fault ends the
//! run. Stop and close run on every exit path. Pipeline state is untouched
//! by a reconnect, so filtering continues where it left off.

use crate::config::ProcessingConfig;
use crate::pipeline::{BatchOutput, StreamPipeline};
use crate::rate::{BreathingRateEstimator, RateEstimate};
use breath_core::{
    AcquisitionDevice, BreathError, BreathResult, Clock, DeviceConnector, PlotSink, PublishSink,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Granularity of backoff sleeps, so a stop request is noticed promptly
const STOP_POLL: Duration = Duration::from_millis(50);

/// What a finished run did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub batches: u64,
    pub samples: u64,
    /// Successful connections after the first
    pub reconnects: u32,
    pub spikes_replaced: u64,
    pub artifacts_interpolated: u64,
    /// Latest rate estimate per channel
    pub rates: Vec<Option<RateEstimate>>,
    /// Whether the stop flag ended the run
    pub stopped: bool,
    pub elapsed_secs: f64,
}

/// Owns the device connector, pipeline and sinks for one run
pub struct AcquisitionSession<C: DeviceConnector> {
    connector: C,
    config: ProcessingConfig,
    pipeline: StreamPipeline,
    publishers: Vec<Box<dyn PublishSink>>,
    plot: Option<Box<dyn PlotSink>>,
    rate: Option<BreathingRateEstimator>,
    batch_limit: Option<u64>,
    device: Option<C::Device>,
}

impl<C: DeviceConnector> AcquisitionSession<C> {
    /// Validate the configuration and build the pipeline
    pub fn new(config: ProcessingConfig, connector: C, clock: Arc<dyn Clock>) -> BreathResult<Self> {
        let pipeline = StreamPipeline::new(&config, clock)?;
        let rate = config
            .rate
            .enabled
            .then(|| BreathingRateEstimator::new(config.sampling_rate_hz(), &config.rate));

        Ok(Self {
            connector,
            config,
            pipeline,
            publishers: Vec::new(),
            plot: None,
            rate,
            batch_limit: None,
            device: None,
        })
    }

    /// Add a publish sink; every sink receives every value
    pub fn with_publisher(mut self, sink: Box<dyn PublishSink>) -> Self {
        self.publishers.push(sink);
        self
    }

    pub fn with_plot(mut self, sink: Box<dyn PlotSink>) -> Self {
        self.plot = Some(sink);
        self
    }

    /// End the run after this many batches
    pub fn with_batch_limit(mut self, batches: u64) -> Self {
        self.batch_limit = Some(batches);
        self
    }

    pub fn pipeline(&self) -> &StreamPipeline {
        &self.pipeline
    }

    /// Run until the stop flag is set, the batch limit is reached or a
    /// fatal fault occurs. The device is stopped and closed either way.
    pub fn run(&mut self, stop: &AtomicBool) -> BreathResult<SessionSummary> {
        let started = Instant::now();
        let mut summary = SessionSummary {
            rates: vec![None; self.pipeline.channel_count()],
            ..SessionSummary::default()
        };

        info!(
            device = %self.config.device.identifier,
            sampling_rate = self.config.device.sampling_rate,
            channels = ?self.config.device.channels,
            batch_size = self.config.device.batch_size,
            "Session starting"
        );

        let result = self.acquire(stop, &mut summary);
        self.teardown();
        summary.elapsed_secs = started.elapsed().as_secs_f64();

        match &result {
            Ok(()) => info!(
                batches = summary.batches,
                samples = summary.samples,
                reconnects = summary.reconnects,
                spikes_replaced = summary.spikes_replaced,
                artifacts_interpolated = summary.artifacts_interpolated,
                stopped = summary.stopped,
                "Session finished"
            ),
            Err(e) => error!(
                error = %e,
                batches = summary.batches,
                samples = summary.samples,
                "Session aborted"
            ),
        }
        for channel in 0..self.pipeline.channel_count() {
            if let Some(stats) = self.pipeline.channel_stats(channel) {
                debug!(channel, mean = stats.mean, std_dev = stats.std_dev, peak_to_peak = stats.peak_to_peak, "Channel summary");
            }
        }

        result.map(|()| summary)
    }

    fn acquire(&mut self, stop: &AtomicBool, summary: &mut SessionSummary) -> BreathResult<()> {
        let mut failures: u32 = 0;
        let mut connections: u32 = 0;

        loop {
            if stop.load(Ordering::SeqCst) {
                info!("Stop requested");
                summary.stopped = true;
                return Ok(());
            }
            if self.batch_limit.is_some_and(|limit| summary.batches >= limit) {
                debug!(batches = summary.batches, "Batch limit reached");
                return Ok(());
            }

            let step = match self.device {
                // A delivered batch proves the link, so the retry budget refills
                Some(_) => self.step(summary).map(|()| failures = 0),
                None => self.open().map(|()| {
                    connections += 1;
                    if connections > 1 {
                        summary.reconnects += 1;
                    }
                }),
            };

            match step {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    self.teardown();
                    failures += 1;
                    if failures > self.config.reconnect.max_attempts {
                        error!(error = %e, attempts = failures - 1, "Reconnect budget exhausted");
                        return Err(BreathError::ConnectionError {
                            reason: format!(
                                "gave up after {} reconnect attempt(s): {}",
                                failures - 1,
                                e
                            ),
                        });
                    }
                    let backoff = self.config.reconnect.backoff(failures);
                    warn!(
                        error = %e,
                        attempt = failures,
                        backoff_ms = backoff.as_millis() as u64,
                        "Source fault, reconnecting"
                    );
                    sleep_unless_stopped(backoff, stop);
                }
                Err(e) => {
                    error!(error = %e, batch = summary.batches, "Fatal fault in acquisition loop");
                    return Err(e);
                }
            }
        }
    }

    /// Connect and start the device
    fn open(&mut self) -> BreathResult<()> {
        let identifier = &self.config.device.identifier;
        info!(device = %identifier, "Connecting");
        let mut device = self.connector.connect(identifier)?;
        device.set_read_timeout(self.config.reconnect.read_timeout());

        // Keep the handle before starting so a failed start is still torn down
        let started = device.start(self.config.device.sampling_rate, &self.config.device.channels);
        info!(device = %device.describe(), ok = started.is_ok(), "Acquisition start");
        self.device = Some(device);
        started
    }

    /// Read, process and emit one batch
    fn step(&mut self, summary: &mut SessionSummary) -> BreathResult<()> {
        let Some(device) = self.device.as_mut() else {
            return Ok(());
        };
        let samples = device.read(self.config.device.batch_size)?;
        let output = self.pipeline.process_batch(&samples)?;
        self.emit(&output)?;

        summary.batches += 1;
        summary.samples += output.len() as u64;
        summary.spikes_replaced += output.spikes_replaced as u64;
        summary.artifacts_interpolated += output.artifacts_interpolated as u64;

        if let Some(estimator) = self.rate.as_mut() {
            if summary.batches % self.config.rate.every_batches as u64 == 0 {
                for channel in 0..self.pipeline.channel_count() {
                    let Some((series, _)) = self.pipeline.corrected_series(channel) else {
                        continue;
                    };
                    if let Some(estimate) = estimator.estimate(series)? {
                        info!(
                            channel,
                            breaths_per_minute = estimate.breaths_per_minute,
                            confidence = estimate.confidence,
                            "Breathing rate"
                        );
                        summary.rates[channel] = Some(estimate);
                    }
                }
            }
        }
        Ok(())
    }

    fn emit(&mut self, output: &BatchOutput) -> BreathResult<()> {
        for value in &output.values {
            for sink in &mut self.publishers {
                sink.publish(value).map_err(|e| match e {
                    BreathError::SinkError { .. } => e,
                    other => BreathError::SinkError {
                        sink: sink.name().to_string(),
                        reason: other.to_string(),
                    },
                })?;
            }
        }

        if let Some(plot) = self.plot.as_mut() {
            if let Some((values, indices)) = self.pipeline.corrected_series(self.config.plot.channel) {
                plot.render(values, indices)?;
            }
        }
        Ok(())
    }

    /// Stop and close the current device, if any; faults are logged, not raised
    fn teardown(&mut self) {
        let Some(mut device) = self.device.take() else {
            return;
        };
        if let Err(e) = device.stop() {
            warn!(error = %e, "Failed to stop device");
        }
        if let Err(e) = device.close() {
            warn!(error = %e, "Failed to close device");
        }
        info!(device = %device.describe(), "Device released");
    }
}

fn sleep_unless_stopped(duration: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + duration;
    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(STOP_POLL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breath_core::{ManualClock, MemoryOutlet, StreamInfo};
    use breath_simulation::{
        BeltConfig, BeltSimulator, FaultPlan, NoiseConfig, SimulatedConnector,
    };

    fn config() -> ProcessingConfig {
        let mut config = ProcessingConfig::breathing_belt();
        config.device.identifier = "sim".to_string();
        config.reconnect.initial_backoff_ms = 1;
        config.reconnect.max_backoff_ms = 4;
        config.reconnect.max_attempts = 3;
        config.rate.every_batches = 50;
        config
    }

    fn connector(faults: FaultPlan) -> SimulatedConnector {
        let simulator = BeltSimulator::new(BeltConfig {
            noise: NoiseConfig::clean(),
            seed: Some(3),
            ..BeltConfig::default()
        })
        .unwrap();
        SimulatedConnector::new(simulator).with_faults(faults)
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(ManualClock::new())
    }

    #[test]
    fn test_runs_to_batch_limit() {
        let connector = connector(FaultPlan::default());
        let log = connector.log();
        let outlet = MemoryOutlet::new(StreamInfo::breathing_belt(2));

        let mut session = AcquisitionSession::new(config(), connector, clock())
            .unwrap()
            .with_publisher(Box::new(outlet.clone()))
            .with_batch_limit(150);
        let summary = session.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(summary.batches, 150);
        assert_eq!(summary.samples, 1500);
        assert_eq!(summary.reconnects, 0);
        assert!(!summary.stopped);

        let published = outlet.published().unwrap();
        assert_eq!(published.len(), 1500);
        assert!(published.iter().all(|v| v.len() == 2));

        // 15 s of regular 15 bpm breathing
        let rate = summary.rates[0].expect("rate estimate after 15 s");
        assert!((rate.breaths_per_minute - 15.0).abs() < 1.5);

        assert_eq!(log.stops(), 1);
        assert_eq!(log.closes(), 1);
    }

    #[test]
    fn test_stop_flag_ends_run() {
        let connector = connector(FaultPlan::default());
        let log = connector.log();
        let mut session = AcquisitionSession::new(config(), connector, clock()).unwrap();

        let summary = session.run(&AtomicBool::new(true)).unwrap();
        assert!(summary.stopped);
        assert_eq!(summary.batches, 0);
        assert_eq!(log.connect_attempts(), 0);
    }

    #[test]
    fn test_reconnects_after_drop() {
        let connector = connector(FaultPlan {
            drop_after_reads: Some(5),
            ..FaultPlan::default()
        });
        let log = connector.log();
        let mut session = AcquisitionSession::new(config(), connector, clock())
            .unwrap()
            .with_batch_limit(20);

        let summary = session.run(&AtomicBool::new(false)).unwrap();
        assert_eq!(summary.batches, 20);
        assert_eq!(summary.reconnects, 1);
        assert_eq!(log.connects(), 2);
        // Samples keep flowing into the same pipeline across the reconnect
        assert_eq!(session.pipeline().samples_processed(), 200);
    }

    #[test]
    fn test_stall_is_recoverable() {
        let connector = connector(FaultPlan {
            stall_after_reads: Some(2),
            ..FaultPlan::default()
        });
        let mut session = AcquisitionSession::new(config(), connector, clock())
            .unwrap()
            .with_batch_limit(6);

        let summary = session.run(&AtomicBool::new(false)).unwrap();
        assert_eq!(summary.batches, 6);
        assert_eq!(summary.reconnects, 1);
    }

    #[test]
    fn test_gives_up_after_budget() {
        let connector = connector(FaultPlan {
            unreachable_connects: u32::MAX,
            ..FaultPlan::default()
        });
        let log = connector.log();
        let mut session = AcquisitionSession::new(config(), connector, clock()).unwrap();

        let result = session.run(&AtomicBool::new(false));
        assert!(matches!(result, Err(BreathError::ConnectionError { .. })));
        // One initial attempt plus max_attempts retries
        assert_eq!(log.connect_attempts(), 4);
    }

    #[test]
    fn test_fatal_fault_still_tears_down() {
        let mut config = config();
        // Frames only carry two analog channels, offset 7 does not exist
        config.device.frame_offsets = vec![5, 7];
        let connector = connector(FaultPlan::default());
        let log = connector.log();
        let mut session = AcquisitionSession::new(config, connector, clock()).unwrap();

        let result = session.run(&AtomicBool::new(false));
        assert!(matches!(result, Err(BreathError::InvalidSignalData { .. })));
        assert_eq!(log.stops(), 1);
        assert_eq!(log.closes(), 1);
    }

    #[test]
    fn test_sink_mismatch_is_fatal() {
        let connector = connector(FaultPlan::default());
        let outlet = MemoryOutlet::new(StreamInfo::breathing_belt(1));
        let mut session = AcquisitionSession::new(config(), connector, clock())
            .unwrap()
            .with_publisher(Box::new(outlet));

        let result = session.run(&AtomicBool::new(false));
        assert!(matches!(result, Err(BreathError::SinkError { .. })));
    }
}
