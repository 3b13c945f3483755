//! Engine configuration

use crate::error::EngineError;
use home_core::DeviceConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Rule engine settings.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Node id used for state points and as the default command target
    pub pi: String,
    /// Four-digit security PIN
    pub pin: String,
    /// Keypad key that clears a partially entered PIN
    pub reset_key: char,
    /// Delay between an arm request and the system being armed
    pub arm_delay_secs: u64,
    /// Grace period after a door opens while armed
    pub entry_delay_secs: u64,
    /// A door open longer than this raises an alarm
    pub door_open_limit_secs: f64,
    /// How long the door light stays on after entry motion
    pub light_on_secs: u64,
    /// Accelerometer magnitude² above which the sensor counts as moved
    pub accel_threshold: f64,
    /// Initial countdown increment for the add button
    pub timer_add_seconds: u32,
    /// Countdown tick period
    pub tick_ms: u64,
    /// Flash toggle period once the countdown finished
    pub flash_ms: u64,
    /// LCD rotation period
    pub display_refresh_secs: u64,
    /// Samples kept per range sensor
    pub history_capacity: usize,
    /// Door contact codes
    pub door_codes: Vec<String>,
    /// Entry PIR code -> paired range sensor code
    pub entry_pairs: BTreeMap<String, String>,
    /// PIRs in rooms that should be empty when nobody is home
    pub remote_pir_codes: Vec<String>,
    /// Accelerometer codes guarding movable objects
    pub accelerometer_codes: Vec<String>,
    /// Membrane keypad code
    pub keypad_code: String,
    /// Kitchen button code
    pub button_code: String,
    /// IR remote receiver code
    pub ir_code: String,
    /// Code prefix of temperature/humidity sensors shown on the LCD
    pub climate_prefix: String,
    /// Actuator code -> node id, for actuators not attached to `pi`
    pub actuator_targets: BTreeMap<String, String>,
    /// Per-device settings, keyed by code
    pub devices: BTreeMap<String, DeviceConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let codes = |list: &[&str]| -> Vec<String> { list.iter().map(|c| (*c).to_string()).collect() };
        Self {
            pi: "PI1".to_string(),
            pin: "1234".to_string(),
            reset_key: '*',
            arm_delay_secs: 10,
            entry_delay_secs: 10,
            door_open_limit_secs: 5.0,
            light_on_secs: 10,
            accel_threshold: 4.0,
            timer_add_seconds: 10,
            tick_ms: 1000,
            flash_ms: 500,
            display_refresh_secs: 3,
            history_capacity: home_core::history::DEFAULT_CAPACITY,
            door_codes: codes(&["DS1", "DS2"]),
            entry_pairs: [("DPIR1", "DUS1"), ("DPIR2", "DUS2")]
                .into_iter()
                .map(|(pir, range)| (pir.to_string(), range.to_string()))
                .collect(),
            remote_pir_codes: codes(&["RPIR1", "RPIR2", "RPIR3"]),
            accelerometer_codes: codes(&["GSG", "GYR"]),
            keypad_code: "DMS".to_string(),
            button_code: "BTN".to_string(),
            ir_code: "IR".to_string(),
            climate_prefix: "DHT".to_string(),
            actuator_targets: BTreeMap::new(),
            devices: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Check the settings and normalize device codes to upper case
    pub fn validated(mut self) -> Result<Self, EngineError> {
        if self.pin.len() != 4 || !self.pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(EngineError::InvalidConfig(
                "pin must be exactly 4 digits".to_string(),
            ));
        }
        if self.reset_key.is_ascii_digit() {
            return Err(EngineError::InvalidConfig(format!(
                "reset key '{}' collides with a PIN digit",
                self.reset_key
            )));
        }
        if self.tick_ms == 0 || self.flash_ms == 0 || self.display_refresh_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "loop periods must be non-zero".to_string(),
            ));
        }

        let upper = |codes: &mut Vec<String>| {
            for code in codes.iter_mut() {
                *code = code.to_ascii_uppercase();
            }
        };
        upper(&mut self.door_codes);
        upper(&mut self.remote_pir_codes);
        upper(&mut self.accelerometer_codes);
        self.entry_pairs = self
            .entry_pairs
            .into_iter()
            .map(|(pir, range)| (pir.to_ascii_uppercase(), range.to_ascii_uppercase()))
            .collect();
        self.devices = self
            .devices
            .into_iter()
            .map(|(code, cfg)| (code.to_ascii_uppercase(), cfg))
            .collect();
        self.keypad_code = self.keypad_code.to_ascii_uppercase();
        self.button_code = self.button_code.to_ascii_uppercase();
        self.ir_code = self.ir_code.to_ascii_uppercase();
        self.climate_prefix = self.climate_prefix.to_ascii_uppercase();

        Ok(self)
    }

    /// Whether events from this code should be processed
    #[must_use]
    pub fn is_enabled(&self, code: &str) -> bool {
        self.devices.get(code).map_or(true, |d| d.enabled)
    }

    /// Whether the code is the range sensor of an entry pair
    #[must_use]
    pub fn is_range_sensor(&self, code: &str) -> bool {
        self.entry_pairs.values().any(|range| range == code)
    }

    #[must_use]
    pub fn arm_delay(&self) -> Duration {
        Duration::from_secs(self.arm_delay_secs)
    }

    #[must_use]
    pub fn entry_delay(&self) -> Duration {
        Duration::from_secs(self.entry_delay_secs)
    }

    #[must_use]
    pub fn light_on(&self) -> Duration {
        Duration::from_secs(self.light_on_secs)
    }

    #[must_use]
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    #[must_use]
    pub fn flash_period(&self) -> Duration {
        Duration::from_millis(self.flash_ms)
    }

    #[must_use]
    pub fn display_period(&self) -> Duration {
        Duration::from_secs(self.display_refresh_secs)
    }
}
