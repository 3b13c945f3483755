//! Data models for the security engine

use home_core::DeviceRecord;
use serde::Serialize;
use std::collections::BTreeMap;

/// Reason used when the guarded object is moved
pub const MOVEMENT_REASON: &str = "gsg_significant_movement";

/// Security state shared by the alarm state machine and occupancy counter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityState {
    /// System is armed
    pub armed: bool,
    /// Active alarm reason; `Some` exactly while the alarm is on
    pub alarm_reason: Option<String>,
    /// Token of the pending arm request, if any
    pub pending_arm: Option<u64>,
    /// Bumped on every arm/disarm transition; stale deferred checks compare it
    pub epoch: u64,
    /// Estimated number of people inside
    pub people_count: u32,
}

/// Externally visible alarm state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum AlarmPhase {
    Disarmed,
    ArmPending,
    Armed,
    Alarm(String),
}

impl SecurityState {
    /// Whether an alarm is active
    #[must_use]
    pub fn alarm_active(&self) -> bool {
        self.alarm_reason.is_some()
    }

    /// Current phase; an active alarm takes precedence
    #[must_use]
    pub fn phase(&self) -> AlarmPhase {
        if let Some(reason) = &self.alarm_reason {
            AlarmPhase::Alarm(reason.clone())
        } else if self.pending_arm.is_some() {
            AlarmPhase::ArmPending
        } else if self.armed {
            AlarmPhase::Armed
        } else {
            AlarmPhase::Disarmed
        }
    }
}

/// Countdown timer state
///
/// `running` implies `seconds_left > 0`; `finished` implies
/// `seconds_left == 0` and not running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimerState {
    pub seconds_left: u32,
    pub set_seconds: u32,
    /// Increment applied by the add button
    #[serde(rename = "add_n_seconds")]
    pub add_seconds: u32,
    pub running: bool,
    pub finished: bool,
    /// Current flash phase of the display while finished
    #[serde(skip)]
    pub flash_lit: bool,
}

/// Last commanded RGB strip colour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RgbState {
    pub on: bool,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Read model of the whole engine state
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub armed: bool,
    pub arm_pending: bool,
    pub alarm: bool,
    pub last_alarm_reason: String,
    pub phase: AlarmPhase,
    pub people_count: u32,
    pub timer: TimerState,
    pub rgb: RgbState,
    pub devices: BTreeMap<String, DeviceRecord>,
    pub last_update_ts: f64,
}
