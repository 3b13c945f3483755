//! Test doubles shared by the engine's unit tests

use crate::config::EngineConfig;
use crate::engine::HomeEngine;
use parking_lot::Mutex;
use sensor_protocol::{
    ActuatorCommand, CommandTransport, Point, ProtocolError, SensorEvent, TimeSeriesSink, Value,
};
use std::sync::Arc;

/// Transport that records every command
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<ActuatorCommand>>,
    fail: bool,
}

impl RecordingTransport {
    /// Transport that rejects every command
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<ActuatorCommand> {
        self.sent.lock().clone()
    }

    /// Sent commands as console lines
    pub fn lines(&self) -> Vec<String> {
        self.sent.lock().iter().map(ActuatorCommand::line).collect()
    }

    /// How many times a console line was sent
    pub fn count(&self, line: &str) -> usize {
        self.sent.lock().iter().filter(|c| c.line() == line).count()
    }
}

impl CommandTransport for RecordingTransport {
    fn send(&self, command: &ActuatorCommand) -> Result<(), ProtocolError> {
        if self.fail {
            return Err(ProtocolError::DeliveryFailed("broker unreachable".to_string()));
        }
        self.sent.lock().push(command.clone());
        Ok(())
    }
}

/// Sink that records every point
#[derive(Default)]
pub struct RecordingSink {
    points: Mutex<Vec<Point>>,
}

impl RecordingSink {
    pub fn points(&self) -> Vec<Point> {
        self.points.lock().clone()
    }

    /// Points written to a bucket
    pub fn bucket(&self, bucket: &str) -> Vec<Point> {
        self.points
            .lock()
            .iter()
            .filter(|p| p.bucket() == bucket)
            .cloned()
            .collect()
    }
}

impl TimeSeriesSink for RecordingSink {
    fn write(&self, point: Point) {
        self.points.lock().push(point);
    }
}

/// Build a sensor event from a JSON value
pub fn event(code: &str, measurement: &str, value: serde_json::Value, timestamp: f64) -> SensorEvent {
    SensorEvent {
        code: code.to_string(),
        measurement: measurement.to_string(),
        device: code.to_string(),
        value: Value::from_json(&value).expect("test value must be a scalar or mapping"),
        pi: "PI1".to_string(),
        timestamp,
        simulated: true,
    }
}

pub struct Harness {
    pub engine: Arc<HomeEngine>,
    pub transport: Arc<RecordingTransport>,
    pub sink: Arc<RecordingSink>,
}

/// Engine with recording doubles and the given config
pub fn harness_with(config: EngineConfig) -> Harness {
    let transport = Arc::new(RecordingTransport::default());
    let sink = Arc::new(RecordingSink::default());
    let engine = HomeEngine::new(config, transport.clone(), sink.clone()).expect("valid config");
    Harness {
        engine,
        transport,
        sink,
    }
}

/// Engine with recording doubles and the default config
pub fn harness() -> Harness {
    harness_with(EngineConfig::default())
}
