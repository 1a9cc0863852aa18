//! Output sinks for conditioned values
//!
//! Two sink families consume pipeline output: publish sinks transmit one
//! value per processed sample, tagged with [`StreamInfo`] metadata, and plot
//! sinks redraw the latest corrected series.

use crate::error::{BreathError, BreathResult};
use crate::sample::Value;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Metadata describing a published stream.
///
/// Consumers subscribe by matching `name` and `stream_type`, never by a
/// fixed network address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub name: String,
    pub stream_type: String,
    pub channel_count: usize,
    /// Declared rate in Hz, 0 meaning irregular
    pub nominal_srate: f64,
    pub channel_format: String,
    pub source_id: String,
    /// Unique per outlet instance
    pub uid: Uuid,
}

impl StreamInfo {
    pub fn new(name: &str, stream_type: &str, channel_count: usize, source_id: &str) -> Self {
        Self {
            name: name.to_string(),
            stream_type: stream_type.to_string(),
            channel_count,
            nominal_srate: 0.0,
            channel_format: "float32".to_string(),
            source_id: source_id.to_string(),
            uid: Uuid::new_v4(),
        }
    }

    /// Reference breathing-belt stream metadata
    pub fn breathing_belt(channel_count: usize) -> Self {
        Self::new("BreathingBelt", "Breathing", channel_count, "breathingbelt001")
    }

    /// Whether a consumer query matches this stream
    pub fn matches(&self, name: &str, stream_type: &str) -> bool {
        self.name == name && self.stream_type == stream_type
    }
}

/// Transmits one value per call
pub trait PublishSink: Send {
    /// Send a value immediately
    fn publish(&mut self, value: &Value) -> BreathResult<()>;

    /// Sink name used in error reports
    fn name(&self) -> &str;
}

/// Redraws the processed series
pub trait PlotSink: Send {
    /// Render `values` against sample `indices`
    fn render(&mut self, values: &[f64], indices: &[u64]) -> BreathResult<()>;
}

/// In-memory publish sink.
///
/// Values are recorded as their wire form would carry them. Clones share
/// the same record, so a handle kept outside a session can inspect what
/// the session published.
#[derive(Debug, Clone)]
pub struct MemoryOutlet {
    info: StreamInfo,
    published: Arc<Mutex<Vec<Vec<f32>>>>,
}

impl MemoryOutlet {
    pub fn new(info: StreamInfo) -> Self {
        Self {
            info,
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// Snapshot of everything published so far
    pub fn published(&self) -> BreathResult<Vec<Vec<f32>>> {
        self.published
            .lock()
            .map(|published| published.clone())
            .map_err(|_| BreathError::SinkError {
                sink: self.info.name.clone(),
                reason: "record lock poisoned".to_string(),
            })
    }
}

impl PublishSink for MemoryOutlet {
    fn publish(&mut self, value: &Value) -> BreathResult<()> {
        let wire = value.to_wire(self.info.channel_count)?;
        let mut published = self.published.lock().map_err(|_| BreathError::SinkError {
            sink: self.info.name.clone(),
            reason: "record lock poisoned".to_string(),
        })?;
        published.push(wire);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.info.name
    }
}
