//! Outbound command types and their wire envelope.
//!
//! Every command the UI runtime emits is transmitted as a single-key JSON
//! object keyed by the command kind, e.g. `{"Spawn":{"team":"Red"}}`.
//! Serde's externally-tagged enum representation produces exactly that
//! envelope, so the enum below *is* the wire format.

use serde::{Deserialize, Serialize};

/// A user-initiated command emitted by the UI runtime.
///
/// The team identifier is an opaque JSON value because the UI sends
/// whatever the page put in the control payload (team names as strings,
/// team indices as numbers). The bridge does not validate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UiCommand {
    /// Spawn a new boid for the given team.
    Spawn {
        /// Team identifier, passed through opaquely.
        team: serde_json::Value,
    },
}

impl UiCommand {
    /// Serialize this command into its wire envelope.
    ///
    /// The command shape is fixed at compile time, so serialization cannot
    /// fail at runtime; a failure here is a programmer error.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("command serialization is infallible")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_envelope_with_string_team() {
        let cmd = UiCommand::Spawn {
            team: serde_json::json!("Red"),
        };
        assert_eq!(cmd.encode(), r#"{"Spawn":{"team":"Red"}}"#);
    }

    #[test]
    fn test_spawn_envelope_with_numeric_team() {
        let cmd = UiCommand::Spawn {
            team: serde_json::json!(7),
        };
        assert_eq!(cmd.encode(), r#"{"Spawn":{"team":7}}"#);
    }

    #[test]
    fn test_spawn_envelope_round_trips() {
        let cmd = UiCommand::Spawn {
            team: serde_json::json!("Blue"),
        };
        let parsed: UiCommand = serde_json::from_str(&cmd.encode()).expect("valid envelope");
        assert_eq!(parsed, cmd);
    }
}
