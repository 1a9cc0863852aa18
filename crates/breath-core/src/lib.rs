//! Breath-Core: Foundation types for breathing-belt acquisition
//!
//! Samples, emitted values, stream metadata, the source and sink
//! interfaces, a time-source abstraction and the shared error type.

pub mod clock;
pub mod device;
pub mod error;
pub mod sample;
pub mod sink;
pub mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use device::{AcquisitionDevice, DeviceConnector};
pub use error::{BreathError, BreathResult};
pub use sample::{Sample, Value};
pub use sink::{MemoryOutlet, PlotSink, PublishSink, StreamInfo};
pub use stats::ChannelStats;
