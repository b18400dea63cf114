//! Graph lifecycle and stage events.

use crate::datum::{BlobDatum, Datum};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

/// A new graph was created under a supervisor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphCreatedEvent {
    pub graph_id: String,
    pub function_id: String,
    pub ts: Timestamp,
}

/// The graph's creator finished adding its initial stages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphCommittedEvent {
    pub graph_id: String,
    pub ts: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageAddedEvent {
    pub stage_id: u32,
    /// Completion operation, e.g. `thenApply` or `allOf`.
    pub op: String,
    pub dependencies: Vec<u32>,
    pub closure: Option<BlobDatum>,
    pub ts: Timestamp,
}

/// Outcome of a stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    pub successful: bool,
    pub datum: Datum,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageCompletedEvent {
    pub stage_id: u32,
    pub result: CompletionResult,
    pub ts: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DelayScheduledEvent {
    pub stage_id: u32,
    pub time_ms: u64,
    pub ts: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphTerminatingEvent {
    pub graph_id: String,
    pub function_id: String,
    pub state: String,
    pub ts: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphCompletedEvent {
    pub graph_id: String,
    pub function_id: String,
    pub ts: Timestamp,
}

/// Any event an entity may persist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GraphEvent {
    GraphCreated(GraphCreatedEvent),
    GraphCommitted(GraphCommittedEvent),
    StageAdded(StageAddedEvent),
    StageCompleted(StageCompletedEvent),
    DelayScheduled(DelayScheduledEvent),
    GraphTerminating(GraphTerminatingEvent),
    GraphCompleted(GraphCompletedEvent),
}

impl GraphEvent {
    /// Fully qualified payload type name used on the streaming wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            GraphEvent::GraphCreated(_) => "model.GraphCreatedEvent",
            GraphEvent::GraphCommitted(_) => "model.GraphCommittedEvent",
            GraphEvent::StageAdded(_) => "model.StageAddedEvent",
            GraphEvent::StageCompleted(_) => "model.StageCompletedEvent",
            GraphEvent::DelayScheduled(_) => "model.DelayScheduledEvent",
            GraphEvent::GraphTerminating(_) => "model.GraphTerminatingEvent",
            GraphEvent::GraphCompleted(_) => "model.GraphCompletedEvent",
        }
    }

    /// JSON body of the payload, without the variant wrapper.
    pub fn body_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            GraphEvent::GraphCreated(e) => serde_json::to_value(e),
            GraphEvent::GraphCommitted(e) => serde_json::to_value(e),
            GraphEvent::StageAdded(e) => serde_json::to_value(e),
            GraphEvent::StageCompleted(e) => serde_json::to_value(e),
            GraphEvent::DelayScheduled(e) => serde_json::to_value(e),
            GraphEvent::GraphTerminating(e) => serde_json::to_value(e),
            GraphEvent::GraphCompleted(e) => serde_json::to_value(e),
        }
    }

    /// Graph created or completed.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            GraphEvent::GraphCreated(_) | GraphEvent::GraphCompleted(_)
        )
    }
}

macro_rules! impl_from_event {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for GraphEvent {
                fn from(e: $ty) -> Self {
                    GraphEvent::$variant(e)
                }
            }
        )*
    };
}

impl_from_event! {
    GraphCreated => GraphCreatedEvent,
    GraphCommitted => GraphCommittedEvent,
    StageAdded => StageAddedEvent,
    StageCompleted => StageCompletedEvent,
    DelayScheduled => DelayScheduledEvent,
    GraphTerminating => GraphTerminatingEvent,
    GraphCompleted => GraphCompletedEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_name_and_body() {
        let event = GraphEvent::from(GraphCreatedEvent {
            graph_id: "g1".to_string(),
            function_id: "app/fn".to_string(),
            ts: Timestamp(5),
        });
        assert_eq!(event.type_name(), "model.GraphCreatedEvent");
        assert!(event.is_lifecycle());

        let body = event.body_json().unwrap();
        assert_eq!(body["graph_id"], "g1");
        assert_eq!(body["function_id"], "app/fn");
        assert_eq!(body["ts"], 5);
    }

    #[test]
    fn test_stage_events_are_not_lifecycle() {
        let event = GraphEvent::from(StageCompletedEvent {
            stage_id: 1,
            result: CompletionResult {
                successful: true,
                datum: Datum::blob("text/plain", "ok"),
            },
            ts: Timestamp(1),
        });
        assert!(!event.is_lifecycle());
        assert_eq!(event.type_name(), "model.StageCompletedEvent");
    }

    #[test]
    fn test_msgpack_roundtrip_with_datum() {
        let event = GraphEvent::from(StageCompletedEvent {
            stage_id: 9,
            result: CompletionResult {
                successful: false,
                datum: Datum::Error {
                    kind: crate::datum::ErrorKind::StageTimeout,
                    message: "late".to_string(),
                },
            },
            ts: Timestamp(2),
        });
        let bytes = rmp_serde::to_vec_named(&event).unwrap();
        let decoded: GraphEvent = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, event);
    }
}
