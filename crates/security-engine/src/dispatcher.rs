//! Command dispatcher: the only writer toward actuators

use crate::outbox::Directive;
use sensor_protocol::{ActuatorCommand, CommandTransport};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Resolves actuator targets and forwards commands to the transport.
///
/// Delivery is at-most-once and fire-and-forget: transport errors are
/// logged and swallowed, never retried.
pub struct CommandDispatcher {
    transport: Arc<dyn CommandTransport>,
    targets: BTreeMap<String, String>,
    default_target: String,
}

impl CommandDispatcher {
    /// Create a new dispatcher
    pub fn new(
        transport: Arc<dyn CommandTransport>,
        targets: BTreeMap<String, String>,
        default_target: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            targets,
            default_target: default_target.into(),
        }
    }

    /// Node id an actuator is attached to
    #[must_use]
    pub fn target_for(&self, actuator: &str) -> &str {
        self.targets
            .get(actuator)
            .map_or(self.default_target.as_str(), String::as_str)
    }

    /// Build and send one command. Returns whether the transport accepted it.
    pub fn dispatch(&self, directive: &Directive) -> bool {
        let command = ActuatorCommand::new(
            self.target_for(&directive.actuator),
            directive.actuator.clone(),
            directive.command.clone(),
            directive.args.clone(),
        );

        match self.transport.send(&command) {
            Ok(()) => {
                tracing::debug!("Dispatched {}", command);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to dispatch {}: {}", command, e);
                false
            }
        }
    }

    /// Send every directive in order
    pub fn dispatch_all(&self, directives: &[Directive]) {
        for directive in directives {
            self.dispatch(directive);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTransport;

    fn directive(actuator: &str, command: &str) -> Directive {
        Directive {
            actuator: actuator.to_string(),
            command: command.to_string(),
            args: Vec::new(),
        }
    }

    #[test]
    fn test_resolves_targets() {
        let transport = Arc::new(RecordingTransport::default());
        let mut targets = BTreeMap::new();
        targets.insert("4SD".to_string(), "PI2".to_string());
        let dispatcher = CommandDispatcher::new(transport.clone(), targets, "PI1");

        dispatcher.dispatch(&directive("DB", "on"));
        dispatcher.dispatch(&directive("4SD", "0010"));

        let sent = transport.sent();
        assert_eq!(sent[0].device, "PI1");
        assert_eq!(sent[1].device, "PI2");
        assert_eq!(sent[1].line(), "4sd 0010");
    }

    #[test]
    fn test_transport_failure_is_swallowed() {
        let transport = Arc::new(RecordingTransport::failing());
        let dispatcher = CommandDispatcher::new(transport.clone(), BTreeMap::new(), "PI1");

        assert!(!dispatcher.dispatch(&directive("DB", "on")));
        dispatcher.dispatch_all(&[directive("DL", "on"), directive("DL", "off")]);
        assert!(transport.sent().is_empty());
    }
}
