//! Persistent event model for flow graphs.
//!
//! Graph and supervisor entities persist [`GraphEvent`]s through the
//! recovery protocol; the same values are broadcast to live subscribers and
//! forwarded to streaming clients as JSON.

mod events;

pub use events::{
    CompletionResult, DelayScheduledEvent, GraphCommittedEvent, GraphCompletedEvent,
    GraphCreatedEvent, GraphEvent, GraphTerminatingEvent, StageAddedEvent, StageCompletedEvent,
};
