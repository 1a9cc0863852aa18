//! Simulated acquisition device with fault injection
//!
//! The connector shares one [`BeltSimulator`] across every device it opens,
//! so the signal continues where it left off after a reconnect.

use crate::belt_simulator::BeltSimulator;
use breath_core::{AcquisitionDevice, BreathError, BreathResult, DeviceConnector, Sample};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Sampling rates the belt hardware accepts
pub const SUPPORTED_RATES: [u32; 4] = [1, 10, 100, 1000];

/// Faults to inject into simulated connections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaultPlan {
    /// The first N connect attempts fail as unreachable
    pub unreachable_connects: u32,
    /// The link drops after this many successful reads
    pub drop_after_reads: Option<u64>,
    /// The device stops producing after this many successful reads
    pub stall_after_reads: Option<u64>,
    /// Apply drop/stall to every connection instead of only the first
    pub repeat: bool,
}

/// Counters describing what happened to simulated devices
#[derive(Debug, Default)]
pub struct ConnectionLog {
    connect_attempts: AtomicU64,
    connects: AtomicU64,
    starts: AtomicU64,
    reads: AtomicU64,
    stops: AtomicU64,
    closes: AtomicU64,
}

impl ConnectionLog {
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> u64 {
        self.starts.load(Ordering::SeqCst)
    }

    /// Successful reads across all devices
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Stops that actually ended acquisition
    pub fn stops(&self) -> u64 {
        self.stops.load(Ordering::SeqCst)
    }

    /// Closes that actually released a device
    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Opens simulated belt devices
pub struct SimulatedConnector {
    simulator: Arc<Mutex<BeltSimulator>>,
    faults: FaultPlan,
    realtime: bool,
    log: Arc<ConnectionLog>,
}

impl SimulatedConnector {
    pub fn new(simulator: BeltSimulator) -> Self {
        Self {
            simulator: Arc::new(Mutex::new(simulator)),
            faults: FaultPlan::default(),
            realtime: false,
            log: Arc::new(ConnectionLog::default()),
        }
    }

    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    /// Pace reads to the sampling rate, like real hardware
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Shared handle to the connection counters
    pub fn log(&self) -> Arc<ConnectionLog> {
        self.log.clone()
    }
}

impl DeviceConnector for SimulatedConnector {
    type Device = SimulatedDevice;

    fn connect(&mut self, identifier: &str) -> BreathResult<SimulatedDevice> {
        let attempt = self.log.connect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.faults.unreachable_connects as u64 {
            warn!(identifier, attempt, "Simulated device unreachable");
            return Err(BreathError::ConnectionError {
                reason: format!("device {} unreachable", identifier),
            });
        }

        let first = self.log.connects.fetch_add(1, Ordering::SeqCst) == 0;
        let faulty = first || self.faults.repeat;
        debug!(identifier, faulty, "Simulated device connected");

        Ok(SimulatedDevice {
            identifier: identifier.to_string(),
            simulator: self.simulator.clone(),
            state: DeviceState::Connected,
            drop_after_reads: self.faults.drop_after_reads.filter(|_| faulty),
            stall_after_reads: self.faults.stall_after_reads.filter(|_| faulty),
            reads: 0,
            realtime: self.realtime,
            sampling_rate: 0,
            read_timeout: Duration::from_secs(2),
            next_due: None,
            log: self.log.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceState {
    Connected,
    Acquiring,
    Stopped,
    Closed,
}

/// One simulated belt connection
pub struct SimulatedDevice {
    identifier: String,
    simulator: Arc<Mutex<BeltSimulator>>,
    state: DeviceState,
    drop_after_reads: Option<u64>,
    stall_after_reads: Option<u64>,
    reads: u64,
    realtime: bool,
    sampling_rate: u32,
    read_timeout: Duration,
    next_due: Option<Instant>,
    log: Arc<ConnectionLog>,
}

impl SimulatedDevice {
    fn lock_simulator(&self) -> BreathResult<std::sync::MutexGuard<'_, BeltSimulator>> {
        self.simulator.lock().map_err(|_| BreathError::ProcessingError {
            message: "belt simulator lock poisoned".to_string(),
        })
    }

    /// Block until `count` frames would have been acquired at the sampling rate
    fn pace(&mut self, count: usize) {
        if !self.realtime || self.sampling_rate == 0 {
            return;
        }
        let batch = Duration::from_secs_f64(count as f64 / self.sampling_rate as f64);
        let due = self.next_due.unwrap_or_else(Instant::now) + batch;
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
        self.next_due = Some(due);
    }
}

impl AcquisitionDevice for SimulatedDevice {
    fn start(&mut self, sampling_rate: u32, channels: &[usize]) -> BreathResult<()> {
        if self.state == DeviceState::Closed {
            return Err(BreathError::ConnectionError {
                reason: format!("device {} is closed", self.identifier),
            });
        }
        if !SUPPORTED_RATES.contains(&sampling_rate) {
            return Err(BreathError::ConfigurationError {
                message: format!(
                    "unsupported sampling rate {} Hz, expected one of {:?}",
                    sampling_rate, SUPPORTED_RATES
                ),
            });
        }
        if channels.is_empty() || channels.iter().any(|&c| c > 5) {
            return Err(BreathError::ConfigurationError {
                message: format!("analog channels must be within 0..=5, got {:?}", channels),
            });
        }

        self.lock_simulator()?
            .configure(sampling_rate as f64, channels.len())?;
        self.sampling_rate = sampling_rate;
        self.state = DeviceState::Acquiring;
        self.next_due = None;
        ConnectionLog::bump(&self.log.starts);
        debug!(identifier = %self.identifier, sampling_rate, ?channels, "Simulated acquisition started");
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    fn read(&mut self, count: usize) -> BreathResult<Vec<Sample>> {
        match self.state {
            DeviceState::Acquiring => {}
            DeviceState::Closed => {
                return Err(BreathError::ConnectionError {
                    reason: format!("device {} is closed", self.identifier),
                })
            }
            DeviceState::Connected | DeviceState::Stopped => {
                return Err(BreathError::ProcessingError {
                    message: format!("read from device {} before start", self.identifier),
                })
            }
        }

        if self.drop_after_reads.is_some_and(|limit| self.reads >= limit) {
            self.state = DeviceState::Closed;
            warn!(identifier = %self.identifier, reads = self.reads, "Simulated link dropped");
            return Err(BreathError::ConnectionError {
                reason: format!("link to {} lost", self.identifier),
            });
        }
        if self.stall_after_reads.is_some_and(|limit| self.reads >= limit) {
            if self.realtime {
                thread::sleep(self.read_timeout);
            }
            warn!(identifier = %self.identifier, "Simulated device stalled");
            return Err(BreathError::SourceTimeout {
                waited_ms: self.read_timeout.as_millis() as u64,
            });
        }

        self.pace(count);
        let frames = self.lock_simulator()?.generate(count);
        self.reads += 1;
        ConnectionLog::bump(&self.log.reads);
        Ok(frames)
    }

    fn stop(&mut self) -> BreathResult<()> {
        if self.state == DeviceState::Acquiring {
            self.state = DeviceState::Stopped;
            ConnectionLog::bump(&self.log.stops);
            debug!(identifier = %self.identifier, "Simulated acquisition stopped");
        }
        Ok(())
    }

    fn close(&mut self) -> BreathResult<()> {
        if self.state != DeviceState::Closed {
            self.stop()?;
            self.state = DeviceState::Closed;
            ConnectionLog::bump(&self.log.closes);
            debug!(identifier = %self.identifier, "Simulated device closed");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("simulated belt {}", self.identifier)
    }
}
