//! Sample frames and emitted values

use crate::error::{BreathError, BreathResult};
use serde::{Deserialize, Serialize};

/// One fixed-width frame read from the acquisition device.
///
/// `values` holds the whole record; sensor channels sit at fixed offsets
/// (the reference belt layout is `[seq, d0, d1, d2, d3, a0, a1]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since acquisition start
    pub timestamp: f64,
    /// Raw frame values
    pub values: Vec<f64>,
}

impl Sample {
    pub fn new(timestamp: f64, values: Vec<f64>) -> Self {
        Self { timestamp, values }
    }

    /// Width of the frame
    pub fn width(&self) -> usize {
        self.values.len()
    }

    /// Value at a frame offset
    pub fn value_at(&self, offset: usize) -> BreathResult<f64> {
        self.values
            .get(offset)
            .copied()
            .ok_or_else(|| BreathError::InvalidSignalData {
                reason: format!(
                    "frame offset {} out of bounds for frame of width {}",
                    offset,
                    self.values.len()
                ),
            })
    }

    /// Extract the sensor channels at the given offsets, in order
    pub fn channels(&self, offsets: &[usize]) -> BreathResult<Vec<f64>> {
        offsets.iter().map(|&offset| self.value_at(offset)).collect()
    }
}

/// Value handed to output sinks: one channel or several
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Value {
    /// Scalar for a single channel, vector otherwise
    pub fn from_channels(mut channels: Vec<f64>) -> Self {
        if channels.len() == 1 {
            Value::Scalar(channels.remove(0))
        } else {
            Value::Vector(channels)
        }
    }

    /// Number of channels carried
    pub fn channel_count(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Vector(values) => values.len(),
        }
    }

    /// Channel values as a slice-friendly vector
    pub fn to_vec(&self) -> Vec<f64> {
        match self {
            Value::Scalar(value) => vec![*value],
            Value::Vector(values) => values.clone(),
        }
    }

    /// Convert to the wire representation of a stream with `channel_count` channels.
    ///
    /// A scalar only fits a one-channel stream; a vector must match the
    /// channel count exactly.
    pub fn to_wire(&self, channel_count: usize) -> BreathResult<Vec<f32>> {
        if self.channel_count() != channel_count {
            return Err(BreathError::InvalidSignalData {
                reason: format!(
                    "value carries {} channel(s) but stream declares {}",
                    self.channel_count(),
                    channel_count
                ),
            });
        }
        Ok(self.to_vec().into_iter().map(|v| v as f32).collect())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Scalar(value)
    }
}

impl From<Vec<f64>> for Value {
    fn from(values: Vec<f64>) -> Self {
        Value::Vector(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_extraction() {
        let sample = Sample::new(0.01, vec![3.0, 0.0, 0.0, 1.0, 1.0, 512.0, 498.0]);
        assert_eq!(sample.width(), 7);
        assert_eq!(sample.channels(&[5, 6]).unwrap(), vec![512.0, 498.0]);
        assert!(sample.channels(&[5, 7]).is_err());
    }

    #[test]
    fn test_value_wire_conversion() {
        let scalar = Value::from(0.25);
        assert_eq!(scalar.to_wire(1).unwrap(), vec![0.25f32]);
        assert!(scalar.to_wire(2).is_err());

        let vector = Value::from_channels(vec![0.1, 0.9]);
        assert_eq!(vector.channel_count(), 2);
        assert_eq!(vector.to_wire(2).unwrap().len(), 2);
        assert!(vector.to_wire(1).is_err());

        assert_eq!(Value::from_channels(vec![0.5]), Value::Scalar(0.5));
    }
}
