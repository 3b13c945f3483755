//! Mutable engine state guarded by the engine lock

use crate::config::EngineConfig;
use crate::door::DoorTracker;
use crate::error::EngineError;
use crate::model::{RgbState, SecurityState, StateSnapshot, TimerState};
use crate::outbox::Outbox;
use crate::pin::PinBuffer;
use home_core::{DeviceStore, HistoryBuffer};
use sensor_protocol::SensorEvent;
use std::collections::HashMap;

/// Rule handler run for every event
pub(crate) type Handler =
    fn(&mut HomeState, &EngineConfig, &SensorEvent, &mut Outbox) -> Result<(), EngineError>;

/// Everything the rules read and write
#[derive(Debug, Default)]
pub struct HomeState {
    pub security: SecurityState,
    pub timer: TimerState,
    pub rgb: RgbState,
    pub devices: DeviceStore,
    /// Range readings per range-sensor code
    pub histories: HashMap<String, HistoryBuffer<f64>>,
    pub doors: DoorTracker,
    pub pin: PinBuffer,
    /// Rotation position of the LCD climate display
    pub lcd_cursor: usize,
    /// Wall-clock time of the last visible change
    pub last_update: f64,
}

impl HomeState {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            timer: TimerState {
                add_seconds: config.timer_add_seconds,
                ..TimerState::default()
            },
            ..Self::default()
        }
    }

    /// Full disarm: cancel a pending arm, clear any alarm, forget open doors
    pub fn disarm(&mut self, out: &mut Outbox) {
        self.security.disarm(out);
        self.doors.clear();
    }

    /// Consistent read of the whole state
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            armed: self.security.armed,
            arm_pending: self.security.pending_arm.is_some(),
            alarm: self.security.alarm_active(),
            last_alarm_reason: self.security.alarm_reason.clone().unwrap_or_default(),
            phase: self.security.phase(),
            people_count: self.security.people_count,
            timer: self.timer.clone(),
            rgb: self.rgb,
            devices: self.devices.records().clone(),
            last_update_ts: self.last_update,
        }
    }
}
