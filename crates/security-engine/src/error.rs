//! Error types for the security engine

use sensor_protocol::ProtocolError;
use thiserror::Error;

/// Errors that can occur in the security engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// PIN did not match
    #[error("Unauthorized")]
    Unauthorized,

    /// Caller supplied an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not allowed while an alarm is active
    #[error("Alarm active: {0}")]
    AlarmActive(String),

    /// Sensor reading could not be interpreted for its device
    #[error("Unexpected value from {code}: {reason}")]
    UnexpectedValue { code: String, reason: String },

    /// Configuration rejected at startup
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Payload decoding failed
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl EngineError {
    pub(crate) fn unexpected(code: &str, reason: impl Into<String>) -> Self {
        Self::UnexpectedValue {
            code: code.to_string(),
            reason: reason.into(),
        }
    }
}
