//! Static command/event/policy flow metadata.
//!
//! Assembled once from handler event declarations and policy flow
//! declarations, and served to the flow visualizer as JSON. This is
//! documentation of intent only; nothing here is enforced against actual
//! runtime dispatch.

use serde::Serialize;

/// One command and the event types its handler declares it may emit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommandEventFlow {
    /// The command type name.
    pub command: &'static str,
    /// Declared event type names, in declaration order.
    pub events: Vec<&'static str>,
}

/// One declared policy edge: an event the policy listens to and the command
/// it issues in response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PolicyCommandFlow {
    /// The policy type name.
    pub policy: &'static str,
    /// The listened-to event type name.
    pub from_event: &'static str,
    /// The issued command type name.
    pub to_command: &'static str,
}

/// The full static flow map: command → events and event → policy → command.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FlowReport {
    /// Command → declared-events edges, in registration order.
    pub command_events: Vec<CommandEventFlow>,
    /// Event → policy → command edges, in declaration order.
    pub policy_commands: Vec<PolicyCommandFlow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::expect_used)] // Panics: test fails if serialization fails
    fn report_serializes_for_the_visualizer() {
        let report = FlowReport {
            command_events: vec![CommandEventFlow {
                command: "CreateAiProfileCommand",
                events: vec!["AiProfileCreatedEvent"],
            }],
            policy_commands: vec![PolicyCommandFlow {
                policy: "AiProfileDefaultPolicy",
                from_event: "AiProfileCreatedEvent",
                to_command: "SelectDefaultAiProfileCommand",
            }],
        };

        let json = serde_json::to_value(&report).expect("report should serialize");
        assert_eq!(
            json["command_events"][0]["command"],
            "CreateAiProfileCommand"
        );
        assert_eq!(
            json["policy_commands"][0]["to_command"],
            "SelectDefaultAiProfileCommand"
        );
    }
}
