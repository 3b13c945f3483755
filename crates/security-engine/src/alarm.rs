//! Alarm state machine
//!
//! Transitions live on [`SecurityState`] and record their side effects in an
//! [`Outbox`]:
//!
//! ```text
//! DISARMED --arm--> ARM_PENDING --delay--> ARMED
//!     ^                 |                    |
//!     +----cancel-------+                    | trigger
//!     +----------------- disarm ------- ALARM(reason)
//! ```
//!
//! The alarm flag is independent of arming: some triggers fire while
//! disarmed, and leaving the alarm always disarms.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::{SecurityState, MOVEMENT_REASON};
use crate::outbox::{AlarmTransition, Deferred, Outbox, ARM_PENDING_KEY, ENTRY_DELAY_PREFIX};
use crate::state::HomeState;
use sensor_protocol::command::BUZZER;
use sensor_protocol::SensorEvent;
use std::time::Duration;

impl SecurityState {
    /// Enter the alarm. No-op (keeping the original reason) if one is active.
    pub fn trigger(&mut self, reason: &str, out: &mut Outbox) -> bool {
        if let Some(current) = &self.alarm_reason {
            tracing::debug!(
                "Alarm already active ({}), ignoring trigger {}",
                current,
                reason
            );
            return false;
        }

        tracing::info!("Alarm triggered: {}", reason);
        self.alarm_reason = Some(reason.to_string());
        out.command(BUZZER, "on", Vec::new());
        out.audit(AlarmTransition::Entered, reason);
        out.touch();
        true
    }

    /// Leave the alarm, returning the reason it carried
    pub fn clear_alarm(&mut self, out: &mut Outbox) -> Option<String> {
        let reason = self.alarm_reason.take()?;
        tracing::info!("Alarm cleared: {}", reason);
        out.command(BUZZER, "off", Vec::new());
        out.audit(AlarmTransition::Exited, &reason);
        out.touch();
        Some(reason)
    }

    /// Start the arm delay. Re-requesting while pending restarts the delay.
    pub fn request_arm(&mut self, delay: Duration, out: &mut Outbox) -> Result<(), EngineError> {
        if let Some(reason) = &self.alarm_reason {
            return Err(EngineError::AlarmActive(reason.clone()));
        }
        if self.armed {
            tracing::debug!("Arm requested while already armed");
            return Ok(());
        }

        self.epoch += 1;
        self.pending_arm = Some(self.epoch);
        out.schedule(
            ARM_PENDING_KEY,
            delay,
            Deferred::CompleteArm { epoch: self.epoch },
        );
        out.touch();
        tracing::info!("Arming in {:?}", delay);
        Ok(())
    }

    /// Drop a pending arm request
    pub fn cancel_arm(&mut self, out: &mut Outbox) -> bool {
        if self.pending_arm.take().is_none() {
            return false;
        }
        out.cancel(ARM_PENDING_KEY);
        out.touch();
        tracing::info!("Pending arm cancelled");
        true
    }

    /// Finish the arm request identified by `epoch`; stale requests are ignored
    pub fn complete_arm(&mut self, epoch: u64, out: &mut Outbox) -> bool {
        if self.pending_arm != Some(epoch) {
            tracing::debug!("Ignoring stale arm completion (epoch {})", epoch);
            return false;
        }

        self.pending_arm = None;
        self.armed = true;
        self.epoch += 1;
        out.cancel_prefix(ENTRY_DELAY_PREFIX);
        out.touch();
        tracing::info!("System armed");
        true
    }

    /// Back to DISARMED from any state
    pub fn disarm(&mut self, out: &mut Outbox) {
        self.cancel_arm(out);
        self.clear_alarm(out);
        if self.armed {
            self.armed = false;
            out.touch();
            tracing::info!("System disarmed");
        }
        self.epoch += 1;
        out.cancel_prefix(ENTRY_DELAY_PREFIX);
    }

    /// Apply a signed change to the people count, saturating at zero
    pub fn adjust_people(&mut self, delta: i64, out: &mut Outbox) {
        let current = i64::from(self.people_count);
        let next = u32::try_from((current + delta).max(0)).unwrap_or(u32::MAX);
        if next != self.people_count {
            self.people_count = next;
            out.touch();
        }
    }
}

/// Reason for motion in an empty home
#[must_use]
pub fn empty_motion_reason(code: &str) -> String {
    format!("motion_when_empty_{code}")
}

/// Reason for a door opened while armed without a PIN
#[must_use]
pub fn unauthorized_entry_reason(code: &str) -> String {
    format!("unauthorized_entry_{code}")
}

/// Intrusion triggers: remote PIR motion in an empty home, accelerometer shake
pub(crate) fn on_event(
    state: &mut HomeState,
    config: &EngineConfig,
    event: &SensorEvent,
    out: &mut Outbox,
) -> Result<(), EngineError> {
    let code = event.code.as_str();

    if config.remote_pir_codes.iter().any(|c| c == code) {
        let motion = event
            .value
            .flag(&["motion", "detected"])
            .ok_or_else(|| EngineError::unexpected(code, "no motion flag"))?;
        if motion && state.security.people_count == 0 {
            state.security.trigger(&empty_motion_reason(code), out);
        }
        return Ok(());
    }

    if config.accelerometer_codes.iter().any(|c| c == code) {
        let magnitude = accel_magnitude_sq(event)?;
        if magnitude > config.accel_threshold {
            tracing::debug!("{} moved: |a|² = {:.2}", code, magnitude);
            state.security.trigger(MOVEMENT_REASON, out);
        }
    }

    Ok(())
}

fn accel_magnitude_sq(event: &SensorEvent) -> Result<f64, EngineError> {
    let axis = |keys: &[&str]| {
        event
            .value
            .number(keys)
            .ok_or_else(|| EngineError::unexpected(&event.code, format!("missing {}", keys[0])))
    };
    let x = axis(&["accel_x", "ax"])?;
    let y = axis(&["accel_y", "ay"])?;
    let z = axis(&["accel_z", "az"])?;
    Ok(x * x + y * y + z * z)
}

/// Deferred entry check: alarm if the door opened in this arming epoch and
/// nobody disarmed in time
pub(crate) fn entry_check(state: &mut HomeState, code: &str, epoch: u64, out: &mut Outbox) {
    let security = &mut state.security;
    if !security.armed || security.epoch != epoch || security.alarm_active() {
        tracing::debug!("Entry check for {} is stale, skipping", code);
        return;
    }
    security.trigger(&unauthorized_entry_reason(code), out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::TimerOp;
    use crate::testing::event;
    use serde_json::json;

    #[test]
    fn test_trigger_is_idempotent() {
        let mut security = SecurityState::default();
        let mut out = Outbox::new();

        assert!(security.trigger("first", &mut out));
        assert!(!security.trigger("second", &mut out));

        assert_eq!(security.alarm_reason.as_deref(), Some("first"));
        assert_eq!(out.command_lines(), vec!["db on"]);
        assert_eq!(out.audits().len(), 1);
    }

    #[test]
    fn test_clear_alarm_audits_same_reason() {
        let mut security = SecurityState::default();
        let mut out = Outbox::new();
        security.trigger("gsg_significant_movement", &mut out);
        let reason = security.clear_alarm(&mut out);

        assert_eq!(reason.as_deref(), Some("gsg_significant_movement"));
        assert_eq!(out.command_lines(), vec!["db on", "db off"]);
        assert_eq!(out.audits()[1].transition, AlarmTransition::Exited);
        assert_eq!(out.audits()[1].reason, "gsg_significant_movement");
        assert!(security.clear_alarm(&mut out).is_none());
    }

    #[test]
    fn test_request_arm_while_alarm_is_rejected() {
        let mut security = SecurityState::default();
        let mut out = Outbox::new();
        security.trigger("manual", &mut out);

        let result = security.request_arm(Duration::from_secs(10), &mut out);
        assert!(matches!(result, Err(EngineError::AlarmActive(_))));
        assert!(security.pending_arm.is_none());
    }

    #[test]
    fn test_stale_arm_completion_is_ignored() {
        let mut security = SecurityState::default();
        let mut out = Outbox::new();

        security.request_arm(Duration::from_secs(10), &mut out).unwrap();
        let first = security.pending_arm.unwrap();
        security.request_arm(Duration::from_secs(10), &mut out).unwrap();
        let second = security.pending_arm.unwrap();

        assert!(!security.complete_arm(first, &mut out));
        assert!(!security.armed);
        assert!(security.complete_arm(second, &mut out));
        assert!(security.armed);
        assert!(out.timers().iter().any(|op| matches!(
            op,
            TimerOp::Schedule { key, .. } if key == ARM_PENDING_KEY
        )));
    }

    #[test]
    fn test_people_count_saturates() {
        let mut security = SecurityState::default();
        let mut out = Outbox::new();
        security.adjust_people(-1, &mut out);
        assert_eq!(security.people_count, 0);
        assert!(!out.is_touched());

        security.adjust_people(2, &mut out);
        security.adjust_people(-1, &mut out);
        assert_eq!(security.people_count, 1);
    }

    #[test]
    fn test_remote_motion_only_when_empty() {
        let config = EngineConfig::default();
        let mut state = HomeState::new(&config);
        let mut out = Outbox::new();

        state.security.people_count = 1;
        on_event(&mut state, &config, &event("RPIR1", "Motion", json!(true), 1.0), &mut out)
            .unwrap();
        assert!(!state.security.alarm_active());

        state.security.people_count = 0;
        on_event(&mut state, &config, &event("RPIR2", "Motion", json!(true), 2.0), &mut out)
            .unwrap();
        assert_eq!(
            state.security.alarm_reason.as_deref(),
            Some("motion_when_empty_RPIR2")
        );
    }

    #[test]
    fn test_accelerometer_threshold() {
        let config = EngineConfig::default();
        let mut state = HomeState::new(&config);
        let mut out = Outbox::new();

        let still = event("GSG", "Gyroscope", json!({"accel_x": 0.0, "accel_y": 0.1, "accel_z": 1.0}), 1.0);
        on_event(&mut state, &config, &still, &mut out).unwrap();
        assert!(!state.security.alarm_active());

        let shaken = event("GSG", "Gyroscope", json!({"accel_x": 2, "accel_y": 2, "accel_z": 2}), 2.0);
        on_event(&mut state, &config, &shaken, &mut out).unwrap();
        assert_eq!(state.security.alarm_reason.as_deref(), Some(MOVEMENT_REASON));
    }

    #[test]
    fn test_accelerometer_missing_axis_is_error() {
        let config = EngineConfig::default();
        let mut state = HomeState::new(&config);
        let mut out = Outbox::new();

        let partial = event("GYR", "Gyroscope", json!({"accel_x": 2}), 1.0);
        let result = on_event(&mut state, &config, &partial, &mut out);
        assert!(matches!(result, Err(EngineError::UnexpectedValue { .. })));
    }
}
