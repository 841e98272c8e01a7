//! Wire protocol between the judge and an out-of-process competitor.
//!
//! One JSON object per line on the child's stdin (host messages) and stdout
//! (agent messages).
//!
//! ```text
//! host  → {"type":"init","entry_point":"rush","rules":{..},"budget_ms":100}
//! agent ← {"type":"unsupported","reason":"no budget constructor"}
//! host  → {"type":"init","entry_point":"rush","rules":{..},"budget_ms":null}
//! agent ← {"type":"ready"}
//! host  → {"type":"decide","player":1,"state":{..}}
//! agent ← {"type":"action","action":{..}}
//! host  → {"type":"shutdown"}
//! ```

use crate::types::Player;
use serde::{Deserialize, Serialize};

/// Messages sent by the judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage<R, S> {
    /// Build the agent; `budget_ms` is absent for the basic constructor
    Init {
        entry_point: String,
        rules: R,
        budget_ms: Option<u64>,
    },

    /// Propose an action for `player`
    Decide { player: Player, state: S },

    /// The match is over
    Shutdown,
}

/// Messages sent by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage<A> {
    /// Initialisation succeeded
    Ready,

    /// The offered constructor is not available
    Unsupported { reason: String },

    /// Answer to `decide`
    Action { action: A },

    /// The agent failed
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_message_wire_shape() {
        let init: HostMessage<u8, u8> = HostMessage::Init {
            entry_point: "rush".to_string(),
            rules: 0,
            budget_ms: None,
        };
        let json = serde_json::to_value(&init).unwrap();
        assert_eq!(json["type"], "init");
        assert!(json["budget_ms"].is_null());

        let decide: HostMessage<u8, u8> = HostMessage::Decide {
            player: Player::Two,
            state: 9,
        };
        let json = serde_json::to_value(&decide).unwrap();
        assert_eq!(json["player"], 2);
    }

    #[test]
    fn test_agent_message_parse() {
        let ready: AgentMessage<u8> = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(ready, AgentMessage::Ready);

        let action: AgentMessage<Vec<u8>> =
            serde_json::from_str(r#"{"type":"action","action":[1,2]}"#).unwrap();
        assert_eq!(action, AgentMessage::Action { action: vec![1, 2] });
    }
}
