//! People counting from entry PIR + range sensor pairs
//!
//! When an entry PIR sees motion, the paired range sensor's last two readings
//! tell which way the person walked: a shrinking distance means someone
//! approached the sensor from outside.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::outbox::Outbox;
use crate::state::HomeState;
use home_core::HistoryBuffer;
use sensor_protocol::SensorEvent;

/// Walking direction inferred from two range readings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Entering,
    Leaving,
}

impl Direction {
    /// Strictly decreasing distance means entering
    #[must_use]
    pub fn from_readings(previous: f64, latest: f64) -> Self {
        if latest < previous {
            Self::Entering
        } else {
            Self::Leaving
        }
    }

    #[must_use]
    pub fn delta(self) -> i64 {
        match self {
            Self::Entering => 1,
            Self::Leaving => -1,
        }
    }
}

pub(crate) fn on_event(
    state: &mut HomeState,
    config: &EngineConfig,
    event: &SensorEvent,
    out: &mut Outbox,
) -> Result<(), EngineError> {
    let code = event.code.as_str();

    if config.is_range_sensor(code) {
        let distance = event
            .value
            .number(&["distance_cm", "distance"])
            .ok_or_else(|| EngineError::unexpected(code, "no distance in reading"))?;
        state
            .histories
            .entry(code.to_string())
            .or_insert_with(|| HistoryBuffer::new(config.history_capacity))
            .push(event.timestamp, distance);
        return Ok(());
    }

    let Some(range_code) = config.entry_pairs.get(code) else {
        return Ok(());
    };
    if !event.value.flag(&["motion", "detected"]).unwrap_or(false) {
        return Ok(());
    }

    let Some((previous, latest)) = state
        .histories
        .get(range_code)
        .and_then(HistoryBuffer::last_two)
    else {
        tracing::debug!("Not enough {} readings to count {} motion", range_code, code);
        return Ok(());
    };

    let direction = Direction::from_readings(*previous, *latest);
    let before = state.security.people_count;
    state.security.adjust_people(direction.delta(), out);
    tracing::debug!(
        "{} motion ({:?}): people {} -> {}",
        code,
        direction,
        before,
        state.security.people_count
    );
    Ok(())
}
