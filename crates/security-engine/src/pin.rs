//! Keypad PIN entry

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::outbox::Outbox;
use crate::state::HomeState;
use sensor_protocol::SensorEvent;

/// Number of digits in a PIN
pub const PIN_LENGTH: usize = 4;

/// Result of one key press
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Digit stored, PIN not complete yet
    Pending,
    /// Reset key cleared the buffer
    Reset,
    /// Key is neither a digit nor the reset key
    Ignored,
    /// Fourth digit entered; the buffer has been cleared
    Complete(String),
}

/// Digits entered so far
#[derive(Debug, Clone, Default)]
pub struct PinBuffer {
    digits: String,
}

impl PinBuffer {
    pub fn push(&mut self, key: char, reset_key: char) -> KeyOutcome {
        if key == reset_key {
            self.digits.clear();
            return KeyOutcome::Reset;
        }
        if !key.is_ascii_digit() {
            return KeyOutcome::Ignored;
        }

        self.digits.push(key);
        if self.digits.len() < PIN_LENGTH {
            return KeyOutcome::Pending;
        }
        KeyOutcome::Complete(std::mem::take(&mut self.digits))
    }

    /// Number of digits entered so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.digits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }
}

/// Valid PIN toggle. Returns the action taken, for logging.
pub(crate) fn toggle(
    state: &mut HomeState,
    config: &EngineConfig,
    out: &mut Outbox,
) -> Result<&'static str, EngineError> {
    if state.security.alarm_active() || state.security.armed {
        state.disarm(out);
        Ok("disarmed")
    } else if state.security.pending_arm.is_some() {
        state.security.cancel_arm(out);
        Ok("arm cancelled")
    } else {
        state.security.request_arm(config.arm_delay(), out)?;
        Ok("arming")
    }
}

pub(crate) fn on_event(
    state: &mut HomeState,
    config: &EngineConfig,
    event: &SensorEvent,
    out: &mut Outbox,
) -> Result<(), EngineError> {
    if event.code != config.keypad_code {
        return Ok(());
    }

    let text = event
        .value
        .text(&["key", "key_pressed"])
        .ok_or_else(|| EngineError::unexpected(&event.code, "no key in reading"))?;
    let mut chars = text.chars();
    let key = match (chars.next(), chars.next()) {
        (Some(key), None) => key,
        _ => return Err(EngineError::unexpected(&event.code, format!("not a single key: {text:?}"))),
    };

    match state.pin.push(key, config.reset_key) {
        KeyOutcome::Complete(entered) if entered == config.pin => {
            let action = toggle(state, config, out)?;
            tracing::info!("Valid PIN entered on keypad: {}", action);
        }
        KeyOutcome::Complete(_) => {
            tracing::warn!("Wrong PIN entered on keypad");
        }
        KeyOutcome::Reset => tracing::debug!("PIN buffer reset"),
        KeyOutcome::Ignored => tracing::debug!("Ignoring keypad key {:?}", key),
        KeyOutcome::Pending => {}
    }
    Ok(())
}
