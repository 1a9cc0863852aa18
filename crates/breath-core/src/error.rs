//! Error handling for the breathing-belt pipeline
//!
//! One error type for every crate in the workspace. Only connection-level
//! faults are recoverable; everything else ends the run.

use core::fmt;

/// Result type alias for pipeline operations
pub type BreathResult<T> = Result<T, BreathError>;

/// Error type for all pipeline operations
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum BreathError {
    /// Malformed filter design or processing parameter
    InvalidParameter {
        /// Description of the parameter problem
        reason: String,
    },

    /// Acquisition device unreachable or dropped
    ConnectionError {
        /// Description of the connection failure
        reason: String,
    },

    /// A blocking read produced nothing within the configured timeout
    SourceTimeout {
        /// How long the read waited, in milliseconds
        waited_ms: u64,
    },

    /// Invalid or inconsistent configuration
    ConfigurationError {
        /// Description of the configuration error
        message: String,
    },

    /// Sample data does not match the expected layout
    InvalidSignalData {
        /// Description of the data problem
        reason: String,
    },

    /// An output sink rejected or failed to deliver a value
    SinkError {
        /// Sink that failed
        sink: String,
        /// Description of the failure
        reason: String,
    },

    /// Unexpected fault while processing a batch
    ProcessingError {
        /// Description of the fault
        message: String,
    },
}

impl BreathError {
    /// Whether the acquisition loop should tear down and reconnect
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BreathError::ConnectionError { .. } | BreathError::SourceTimeout { .. }
        )
    }
}

impl fmt::Display for BreathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreathError::InvalidParameter { reason } => {
                write!(f, "Invalid parameter: {}", reason)
            }
            BreathError::ConnectionError { reason } => {
                write!(f, "Connection error: {}", reason)
            }
            BreathError::SourceTimeout { waited_ms } => {
                write!(f, "Source timed out after {} ms", waited_ms)
            }
            BreathError::ConfigurationError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            BreathError::InvalidSignalData { reason } => {
                write!(f, "Invalid signal data: {}", reason)
            }
            BreathError::SinkError { sink, reason } => {
                write!(f, "Sink '{}' failed: {}", sink, reason)
            }
            BreathError::ProcessingError { message } => {
                write!(f, "Processing error: {}", message)
            }
        }
    }
}

impl std::error::Error for BreathError {}

/// Convenience macro for creating parameter errors
#[macro_export]
macro_rules! invalid_parameter {
    ($($arg:tt)+) => {
        $crate::error::BreathError::InvalidParameter {
            reason: format!($($arg)+),
        }
    };
}

/// Convenience macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)+) => {
        $crate::error::BreathError::ConfigurationError {
            message: format!($($arg)+),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = BreathError::SourceTimeout { waited_ms: 2000 };
        let display = format!("{}", error);
        assert!(display.contains("timed out"));
        assert!(display.contains("2000"));

        let error = invalid_parameter!("cutoff {} Hz above nyquist {} Hz", 60.0, 50.0);
        let display = error.to_string();
        assert!(display.contains("60"));
        assert!(display.contains("nyquist"));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(BreathError::ConnectionError { reason: "dropped".into() }.is_recoverable());
        assert!(BreathError::SourceTimeout { waited_ms: 10 }.is_recoverable());
        assert!(!config_error!("batch size must be positive").is_recoverable());
        assert!(!BreathError::ProcessingError { message: "boom".into() }.is_recoverable());
    }

    #[test]
    fn test_error_equality() {
        let error1 = BreathError::InvalidSignalData { reason: "short frame".into() };
        let error2 = BreathError::InvalidSignalData { reason: "short frame".into() };
        assert_eq!(error1, error2);
    }
}
