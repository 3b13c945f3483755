//! Outbound actuator commands

use serde::Serialize;
use std::fmt;

/// Buzzer
pub const BUZZER: &str = "DB";
/// Door light
pub const DOOR_LIGHT: &str = "DL";
/// RGB strip
pub const RGB: &str = "BRGB";
/// Character LCD
pub const LCD: &str = "LCD";
/// 4-digit 7-segment display
pub const SEGMENT_DISPLAY: &str = "4SD";

/// A command addressed to one actuator on one node
///
/// The command line uses the actuator console syntax, e.g. `db on`,
/// `brgb 255 0 0` or `4sd 0130`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActuatorCommand {
    /// Target node id (e.g. "PI1")
    pub device: String,
    /// Actuator code (e.g. "DB")
    pub actuator: String,
    /// Command verb
    pub command: String,
    /// Extra arguments
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl ActuatorCommand {
    /// Create a new command
    #[must_use]
    pub fn new(
        device: impl Into<String>,
        actuator: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            device: device.into(),
            actuator: actuator.into(),
            command: command.into(),
            args,
        }
    }

    /// Console line for the actuator (`<code> <command> <args...>`)
    #[must_use]
    pub fn line(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 2);
        parts.push(self.actuator.to_ascii_lowercase());
        parts.push(self.command.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    /// Topic the command is published on
    #[must_use]
    pub fn topic(&self) -> String {
        format!("smart_home/{}/commands/{}", self.device, self.actuator)
    }
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.device, self.line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_format() {
        let cmd = ActuatorCommand::new(
            "PI1",
            RGB,
            "255",
            vec!["0".to_string(), "0".to_string()],
        );
        assert_eq!(cmd.line(), "brgb 255 0 0");
        assert_eq!(cmd.topic(), "smart_home/PI1/commands/BRGB");
        assert_eq!(cmd.to_string(), "PI1 -> brgb 255 0 0");
    }
}
