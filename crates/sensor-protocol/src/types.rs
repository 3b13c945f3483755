//! Shared protocol error type

use thiserror::Error;

/// Protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Unsupported value for {code}: {reason}")]
    UnsupportedValue { code: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),
}
