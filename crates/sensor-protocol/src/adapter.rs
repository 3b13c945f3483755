//! Inbound payload normalization
//!
//! Sensor nodes publish either a single reading object or a batch (JSON
//! array) of them:
//!
//! ```text
//! {"code": "DS1", "measurement": "Door", "device": "Door Sensor",
//!  "value": "open", "pi": "PI1", "timestamp": 1700000000.5, "simulated": true}
//! ```
//!
//! Only `code` and `value` are required.

use crate::event::{SensorEvent, Value};
use crate::types::ProtocolError;

/// Current wall-clock time in fractional seconds since the Unix epoch
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Decode a raw payload into sensor events.
///
/// Malformed entries inside a batch are logged and dropped; the remaining
/// entries are still returned. A payload that is not JSON, or a single
/// object that is malformed, is an error.
#[allow(clippy::missing_errors_doc)]
pub fn decode_payload(text: &str) -> Result<Vec<SensorEvent>, ProtocolError> {
    let json: serde_json::Value = serde_json::from_str(text)?;

    match json {
        serde_json::Value::Array(items) => {
            let total = items.len();
            let events: Vec<SensorEvent> = items
                .iter()
                .filter_map(|item| match decode_reading(item) {
                    Ok(event) => Some(event),
                    Err(e) => {
                        tracing::warn!("Dropping malformed reading: {} ({})", e, item);
                        None
                    }
                })
                .collect();
            tracing::debug!("Decoded {} of {} readings in batch", events.len(), total);
            Ok(events)
        }
        serde_json::Value::Object(_) => Ok(vec![decode_reading(&json)?]),
        other => Err(ProtocolError::MalformedPayload(format!(
            "expected object or array, got {other}"
        ))),
    }
}

/// Decode a single reading object
///
/// # Errors
///
/// Fails when `code` or `value` is missing, or when the value is neither a
/// scalar nor a flat mapping of scalars.
pub fn decode_reading(json: &serde_json::Value) -> Result<SensorEvent, ProtocolError> {
    let obj = json
        .as_object()
        .ok_or_else(|| ProtocolError::MalformedPayload("reading is not an object".to_string()))?;

    let code = obj
        .get("code")
        .and_then(serde_json::Value::as_str)
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty())
        .ok_or(ProtocolError::MissingField("code"))?;

    let raw_value = obj.get("value").ok_or(ProtocolError::MissingField("value"))?;
    let value = Value::from_json(raw_value).ok_or_else(|| ProtocolError::UnsupportedValue {
        code: code.clone(),
        reason: format!("cannot interpret {raw_value}"),
    })?;

    let text_field = |key: &str| {
        obj.get(key)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    };

    let timestamp = match obj.get("timestamp") {
        None | Some(serde_json::Value::Null) => now_seconds(),
        Some(ts) => ts.as_f64().ok_or_else(|| ProtocolError::UnsupportedValue {
            code: code.clone(),
            reason: format!("timestamp {ts} is not numeric"),
        })?,
    };

    Ok(SensorEvent {
        measurement: text_field("measurement").unwrap_or_else(|| "Unknown".to_string()),
        device: text_field("device").unwrap_or_else(|| code.clone()),
        pi: text_field("pi").unwrap_or_else(|| "unknown".to_string()),
        simulated: obj
            .get("simulated")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false),
        code,
        value,
        timestamp,
    })
}
