//! Outbound transports: actuator commands and time-series points

use crate::command::ActuatorCommand;
use crate::event::{Scalar, SensorEvent, Value};
use crate::types::ProtocolError;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::broadcast;

/// Default channel capacity for in-process fan-out
pub const DEFAULT_CAPACITY: usize = 64;

/// Sink for actuator commands.
///
/// Implementations must not block: the engine calls `send` from rule
/// evaluation and treats delivery as fire-and-forget.
pub trait CommandTransport: Send + Sync {
    /// Hand a command to the transport
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::DeliveryFailed`] when the command cannot be
    /// handed over. Callers log it and move on.
    fn send(&self, command: &ActuatorCommand) -> Result<(), ProtocolError>;
}

/// In-process command fan-out backed by a tokio broadcast channel.
///
/// Sending with no subscribers is not an error; the command is dropped.
pub struct BroadcastTransport {
    command_tx: broadcast::Sender<ActuatorCommand>,
}

impl Default for BroadcastTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BroadcastTransport {
    /// Create a transport with the given channel capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (command_tx, _) = broadcast::channel(capacity);
        Self { command_tx }
    }

    /// Subscribe to outbound commands
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ActuatorCommand> {
        self.command_tx.subscribe()
    }
}

impl CommandTransport for BroadcastTransport {
    fn send(&self, command: &ActuatorCommand) -> Result<(), ProtocolError> {
        if self.command_tx.send(command.clone()).is_err() {
            tracing::trace!("No command subscribers, dropped {}", command);
        }
        Ok(())
    }
}

/// A time-series point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    /// Measurement name; the bucket is derived from it
    pub measurement: String,
    /// Indexed tags (`pi`, `device`, `code`, `simulated`)
    pub tags: BTreeMap<String, String>,
    /// Field values
    pub fields: BTreeMap<String, Scalar>,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

impl Point {
    /// Create an empty point for a measurement
    #[must_use]
    pub fn new(measurement: impl Into<String>, timestamp: f64) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    /// Build the point for a sensor reading.
    ///
    /// Mapping values become one field per key, a scalar becomes `value`.
    #[must_use]
    pub fn from_event(event: &SensorEvent) -> Self {
        let mut point = Self::new(event.measurement.clone(), event.timestamp)
            .tag("pi", &event.pi)
            .tag("device", &event.device)
            .tag("code", &event.code)
            .tag("simulated", event.simulated.to_string());
        match &event.value {
            Value::Scalar(s) => {
                point.fields.insert("value".to_string(), s.clone());
            }
            Value::Mapping(map) => {
                point.fields.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        point
    }

    /// Add a tag
    #[must_use]
    pub fn tag(mut self, key: &str, value: impl Into<String>) -> Self {
        self.tags.insert(key.to_string(), value.into());
        self
    }

    /// Add a field
    #[must_use]
    pub fn field(mut self, key: &str, value: Scalar) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    /// Bucket name: the measurement lower-cased
    #[must_use]
    pub fn bucket(&self) -> String {
        self.measurement.to_lowercase()
    }
}

/// Destination for time-series points.
///
/// Like [`CommandTransport`], writes must not block the caller; failures
/// are the sink's to log.
pub trait TimeSeriesSink: Send + Sync {
    /// Queue a point for writing
    fn write(&self, point: Point);
}

/// Sink that discards every point
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TimeSeriesSink for NullSink {
    fn write(&self, point: Point) {
        tracing::trace!("Discarding point for bucket {}", point.bucket());
    }
}
