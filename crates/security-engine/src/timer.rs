//! Kitchen countdown timer shown on the 4-digit segment display

use crate::error::EngineError;
use crate::model::TimerState;
use crate::outbox::Outbox;
use sensor_protocol::command::SEGMENT_DISPLAY;

/// Display command that blanks the segment display
pub const BLANK: &str = "blank";
/// Display text of an expired countdown
pub const ZERO: &str = "0000";

/// `MMSS` rendering of a second count; minutes are capped at 99
#[must_use]
pub fn display_text(seconds: u32) -> String {
    let minutes = (seconds / 60).min(99);
    format!("{:02}{:02}", minutes, seconds % 60)
}

/// Parse a non-negative whole number of seconds from an API argument
///
/// # Errors
///
/// Returns [`EngineError::InvalidArgument`] for anything but a whole number
/// (or numeric string) that fits in a `u32`.
pub fn parse_seconds(value: &serde_json::Value) -> Result<u32, EngineError> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| EngineError::InvalidArgument(format!("not a number of seconds: {value}")))
}

impl TimerState {
    fn show(&self, out: &mut Outbox) {
        out.command(SEGMENT_DISPLAY, display_text(self.seconds_left), Vec::new());
    }

    /// Start counting down from `seconds`
    pub fn set(&mut self, seconds: u32, out: &mut Outbox) {
        self.seconds_left = seconds;
        self.set_seconds = seconds;
        self.running = seconds > 0;
        self.finished = false;
        self.flash_lit = false;
        self.show(out);
        out.touch();
        tracing::info!("Countdown set to {}s", seconds);
    }

    /// Add the configured increment, restarting a finished countdown
    pub fn add(&mut self, out: &mut Outbox) {
        self.seconds_left = self.seconds_left.saturating_add(self.add_seconds);
        self.running = self.seconds_left > 0;
        self.finished = false;
        self.flash_lit = false;
        self.show(out);
        out.touch();
        tracing::debug!("Countdown +{}s, {}s left", self.add_seconds, self.seconds_left);
    }

    /// Change the increment used by [`TimerState::add`]
    pub fn set_increment(&mut self, seconds: u32, out: &mut Outbox) {
        self.add_seconds = seconds;
        out.touch();
    }

    /// Pause the countdown, keeping the seconds left
    pub fn stop(&mut self, out: &mut Outbox) {
        self.running = false;
        self.flash_lit = false;
        self.show(out);
        out.touch();
        tracing::info!("Countdown stopped with {}s left", self.seconds_left);
    }

    /// One second elapsed
    pub fn tick(&mut self, out: &mut Outbox) {
        if !self.running {
            return;
        }

        self.seconds_left = self.seconds_left.saturating_sub(1);
        self.show(out);
        if self.seconds_left == 0 {
            self.running = false;
            self.finished = true;
            tracing::info!("Countdown finished");
        }
        out.touch();
    }

    /// Toggle the display while the countdown is finished
    pub fn flash(&mut self, out: &mut Outbox) {
        if !self.finished {
            return;
        }

        self.flash_lit = !self.flash_lit;
        let text = if self.flash_lit { ZERO } else { BLANK };
        out.command(SEGMENT_DISPLAY, text, Vec::new());
    }

    /// Kitchen button: silence a finished countdown, otherwise add time
    pub fn press_button(&mut self, out: &mut Outbox) {
        if self.finished {
            self.finished = false;
            self.flash_lit = false;
            out.command(SEGMENT_DISPLAY, ZERO, Vec::new());
            out.touch();
            tracing::info!("Countdown acknowledged");
        } else {
            self.add(out);
        }
    }
}
