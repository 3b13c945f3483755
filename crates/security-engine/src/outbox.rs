//! Side effects collected while the state lock is held
//!
//! Rule logic never talks to transports or the scheduler directly. It
//! records what should happen in an [`Outbox`], which the engine applies
//! after releasing the lock.

use std::time::Duration;

/// Scheduler key of the pending arm transition
pub const ARM_PENDING_KEY: &str = "arm-pending";
/// Scheduler key prefix of per-door entry checks
pub const ENTRY_DELAY_PREFIX: &str = "entry-delay:";
/// Scheduler key of the door light auto-off
pub const LIGHT_OFF_KEY: &str = "dl-auto-off";

/// Command for one actuator, before target resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub actuator: String,
    pub command: String,
    pub args: Vec<String>,
}

/// Alarm audit transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmTransition {
    Entered,
    Exited,
}

impl AlarmTransition {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entered => "entered",
            Self::Exited => "exited",
        }
    }
}

/// Audit record for an alarm transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmAudit {
    pub transition: AlarmTransition,
    pub reason: String,
}

/// One-shot action run after a delay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deferred {
    /// Finish an arm request if it is still the pending one
    CompleteArm { epoch: u64 },
    /// Raise unauthorized entry if still armed in the same epoch
    EntryCheck { code: String, epoch: u64 },
    /// Switch the door light off
    LightOff,
}

/// Scheduler operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerOp {
    /// Schedule, replacing any pending task under the key
    Schedule {
        key: String,
        delay: Duration,
        action: Deferred,
    },
    /// Schedule only if nothing is pending under the key
    ScheduleIfIdle {
        key: String,
        delay: Duration,
        action: Deferred,
    },
    Cancel(String),
    CancelPrefix(String),
}

/// Collected effects of one engine operation
#[derive(Debug, Default)]
pub struct Outbox {
    pub(crate) commands: Vec<Directive>,
    pub(crate) audits: Vec<AlarmAudit>,
    pub(crate) timers: Vec<TimerOp>,
    pub(crate) touched: bool,
}

impl Outbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an actuator command
    pub fn command(&mut self, actuator: &str, command: impl Into<String>, args: Vec<String>) {
        self.commands.push(Directive {
            actuator: actuator.to_string(),
            command: command.into(),
            args,
        });
    }

    /// Mark visible state as changed
    pub fn touch(&mut self) {
        self.touched = true;
    }

    /// Record an alarm transition for the audit trail
    pub fn audit(&mut self, transition: AlarmTransition, reason: &str) {
        self.audits.push(AlarmAudit {
            transition,
            reason: reason.to_string(),
        });
    }

    pub fn schedule(&mut self, key: impl Into<String>, delay: Duration, action: Deferred) {
        self.timers.push(TimerOp::Schedule {
            key: key.into(),
            delay,
            action,
        });
    }

    pub fn schedule_if_idle(&mut self, key: impl Into<String>, delay: Duration, action: Deferred) {
        self.timers.push(TimerOp::ScheduleIfIdle {
            key: key.into(),
            delay,
            action,
        });
    }

    pub fn cancel(&mut self, key: impl Into<String>) {
        self.timers.push(TimerOp::Cancel(key.into()));
    }

    pub fn cancel_prefix(&mut self, prefix: impl Into<String>) {
        self.timers.push(TimerOp::CancelPrefix(prefix.into()));
    }

    #[must_use]
    pub fn is_touched(&self) -> bool {
        self.touched
    }
}

#[cfg(test)]
impl Outbox {
    pub fn commands(&self) -> &[Directive] {
        &self.commands
    }

    pub fn audits(&self) -> &[AlarmAudit] {
        &self.audits
    }

    pub fn timers(&self) -> &[TimerOp] {
        &self.timers
    }

    /// Command lines in console syntax
    pub fn command_lines(&self) -> Vec<String> {
        self.commands
            .iter()
            .map(|d| {
                let mut line = format!("{} {}", d.actuator.to_ascii_lowercase(), d.command);
                for arg in &d.args {
                    line.push(' ');
                    line.push_str(arg);
                }
                line
            })
            .collect()
    }
}

/// Scheduler key of a door's entry check
#[must_use]
pub fn entry_key(code: &str) -> String {
    format!("{ENTRY_DELAY_PREFIX}{code}")
}
