//! Inbound and outbound messages of a streaming session.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};

/// A client command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Subscribe { graph_id: String },
    Unsubscribe { graph_id: String },
}

#[derive(Deserialize)]
struct CommandHeader {
    command: String,
}

#[derive(Deserialize)]
struct GraphTarget {
    graph_id: String,
}

impl Command {
    /// Parse `{"command": ..., ...}`.
    ///
    /// The command name is read first; the rest of the object is then
    /// decoded for that command, so an unknown name is reported as such
    /// rather than as a shape mismatch.
    pub fn parse(text: &str) -> Result<Self, SessionError> {
        let header: CommandHeader = serde_json::from_str(text)?;
        match header.command.as_str() {
            "subscribe" => {
                let target: GraphTarget = serde_json::from_str(text)?;
                Ok(Command::Subscribe {
                    graph_id: target.graph_id,
                })
            }
            "unsubscribe" => {
                let target: GraphTarget = serde_json::from_str(text)?;
                Ok(Command::Unsubscribe {
                    graph_id: target.graph_id,
                })
            }
            other => Err(SessionError::UnsupportedCommand(other.to_string())),
        }
    }
}

/// Event frame sent to the client.
#[derive(Debug, Serialize)]
pub struct EventMessage<'a> {
    /// Payload type name, e.g. `model.GraphCreatedEvent`.
    #[serde(rename = "type")]
    pub kind: &'a str,
    /// Subscription the event belongs to: a graph ID or the lifecycle ID.
    pub sub: &'a str,
    pub data: serde_json::Value,
}
