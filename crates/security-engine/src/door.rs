//! Door contact handling: open-too-long alarm and armed entry delay

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::outbox::{entry_key, Deferred, Outbox};
use crate::state::HomeState;
use sensor_protocol::{Scalar, SensorEvent};
use std::collections::HashMap;

/// Interpreted door contact reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorReading {
    Open,
    Closed,
}

impl DoorReading {
    /// Parse a contact reading; `true`/`1` mean open
    #[must_use]
    pub fn from_scalar(value: &Scalar) -> Option<Self> {
        match value {
            Scalar::Bool(open) => Some(Self::from_flag(*open)),
            Scalar::Int(n) => Some(Self::from_flag(*n != 0)),
            Scalar::Float(_) => None,
            Scalar::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "open" | "opened" | "unlocked" => Some(Self::Open),
                "closed" | "close" | "locked" => Some(Self::Closed),
                _ => None,
            },
        }
    }

    fn from_flag(open: bool) -> Self {
        if open {
            Self::Open
        } else {
            Self::Closed
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenInterval {
    since: f64,
    reported: bool,
}

/// Open intervals per door code
#[derive(Debug, Default)]
pub struct DoorTracker {
    open: HashMap<String, OpenInterval>,
}

impl DoorTracker {
    /// Record an open reading. Returns true the first time the interval
    /// exceeds `limit` seconds.
    pub fn opened(&mut self, code: &str, timestamp: f64, limit: f64) -> bool {
        let interval = self
            .open
            .entry(code.to_string())
            .or_insert(OpenInterval {
                since: timestamp,
                reported: false,
            });
        if !interval.reported && timestamp - interval.since > limit {
            interval.reported = true;
            return true;
        }
        false
    }

    /// Record a closed reading, ending any open interval
    pub fn closed(&mut self, code: &str) -> bool {
        self.open.remove(code).is_some()
    }

    pub fn clear(&mut self) {
        self.open.clear();
    }
}

/// Alarm reason for a door left open
#[must_use]
pub fn too_long_reason(code: &str) -> String {
    format!("door_{code}_open_too_long")
}

pub(crate) fn on_event(
    state: &mut HomeState,
    config: &EngineConfig,
    event: &SensorEvent,
    out: &mut Outbox,
) -> Result<(), EngineError> {
    let code = event.code.as_str();
    if !config.door_codes.iter().any(|c| c == code) {
        return Ok(());
    }

    let reading = event
        .value
        .scalar()
        .or_else(|| {
            ["state", "open", "door"]
                .iter()
                .find_map(|key| event.value.field(key))
        })
        .and_then(DoorReading::from_scalar)
        .ok_or_else(|| EngineError::unexpected(code, "not a door state"))?;

    match reading {
        DoorReading::Open => {
            if state
                .doors
                .opened(code, event.timestamp, config.door_open_limit_secs)
            {
                tracing::warn!("Door {} open longer than {}s", code, config.door_open_limit_secs);
                state.security.trigger(&too_long_reason(code), out);
            }
            if state.security.armed {
                out.schedule_if_idle(
                    entry_key(code),
                    config.entry_delay(),
                    Deferred::EntryCheck {
                        code: code.to_string(),
                        epoch: state.security.epoch,
                    },
                );
            }
        }
        DoorReading::Closed => {
            state.doors.closed(code);
            if state.security.alarm_reason.as_deref() == Some(too_long_reason(code).as_str()) {
                tracing::info!("Door {} closed, clearing its alarm", code);
                state.security.clear_alarm(out);
            }
        }
    }
    Ok(())
}
