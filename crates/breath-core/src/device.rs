//! Acquisition source interface
//!
//! The pipeline consumes a hardware device through two traits: a connector
//! that resolves an identifier (MAC address, serial port, simulator name)
//! into an open device, and the device itself which streams fixed-width
//! frames once started.

use crate::error::BreathResult;
use crate::sample::Sample;
use std::time::Duration;

/// Opens acquisition devices by identifier
pub trait DeviceConnector: Send {
    /// Device handle produced by a successful connect
    type Device: AcquisitionDevice;

    /// Connect to the device; fails with `ConnectionError` if unreachable
    fn connect(&mut self, identifier: &str) -> BreathResult<Self::Device>;
}

/// An open acquisition device
pub trait AcquisitionDevice: Send {
    /// Begin producing samples at `sampling_rate` on the given acquisition channels
    fn start(&mut self, sampling_rate: u32, channels: &[usize]) -> BreathResult<()>;

    /// Bound how long `read` may block before reporting `SourceTimeout`.
    /// Devices without a timeout ignore it.
    fn set_read_timeout(&mut self, _timeout: Duration) {}

    /// Block until exactly `count` samples are available and return them in order.
    ///
    /// A stalled source reports `SourceTimeout`; a dropped link reports
    /// `ConnectionError`.
    fn read(&mut self, count: usize) -> BreathResult<Vec<Sample>>;

    /// Stop acquisition. Calling it again is a no-op.
    fn stop(&mut self) -> BreathResult<()>;

    /// Release the device. Calling it again is a no-op.
    fn close(&mut self) -> BreathResult<()>;

    /// Human readable device description for logs
    fn describe(&self) -> String {
        "acquisition device".to_string()
    }
}
