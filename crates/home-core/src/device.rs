//! Device representation

use sensor_protocol::{SensorEvent, Value};
use serde::{Deserialize, Serialize};

/// Input pull resistor setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Pull {
    #[default]
    #[serde(alias = "up")]
    Up,
    #[serde(alias = "down")]
    Down,
}

/// Per-device configuration entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Disabled devices are ignored by the engine
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Reading source is a simulator
    #[serde(default = "default_true")]
    pub simulated: bool,
    /// GPIO pin (BCM numbering), if wired
    #[serde(default)]
    pub pin: Option<u8>,
    /// Polling interval in seconds
    #[serde(default = "default_interval")]
    pub interval: f64,
    /// Pull resistor for input pins
    #[serde(default)]
    pub pull: Pull,
}

fn default_true() -> bool {
    true
}

fn default_interval() -> f64 {
    0.5
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            simulated: true,
            pin: None,
            interval: default_interval(),
            pull: Pull::default(),
        }
    }
}

/// Latest known reading for a device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRecord {
    /// Reading payload
    pub value: Value,
    /// Reading time in seconds since the Unix epoch
    pub timestamp: f64,
    /// Measurement kind
    pub measurement: String,
    /// Human-readable device name
    pub device: String,
}

impl From<&SensorEvent> for DeviceRecord {
    fn from(event: &SensorEvent) -> Self {
        Self {
            value: event.value.clone(),
            timestamp: event.timestamp,
            measurement: event.measurement.clone(),
            device: event.device.clone(),
        }
    }
}
