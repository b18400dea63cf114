//! # flowstore
//!
//! Durable state and live event streaming for flow graph execution.
//!
//! ## Core Concepts
//!
//! - **Recovery**: Entities rebuild their state from a snapshot plus the
//!   events persisted after it before accepting new work
//! - **Providers**: Per-entity event logs and snapshots, in memory or on disk
//! - **Event stream**: Predicate-filtered publish/subscribe with race-free
//!   unsubscribe
//! - **Graph manager**: Replayed history spliced with the live tail of a graph
//! - **Streaming sessions**: Graph events forwarded to remote clients as JSON
//! - **Datum codec**: Typed values decoded from multipart parts
//!
//! ## Example
//!
//! ```ignore
//! use flowstore::{FileProvider, GraphManager, ProviderConfig};
//!
//! let provider = FileProvider::open_or_create(ProviderConfig {
//!     path: "./flows".into(),
//!     ..Default::default()
//! })?;
//! let manager = GraphManager::new(&provider);
//!
//! // Entities persist through the manager so observers see their events.
//! let mut graph = Graph::new("graph-1", manager.provider_state());
//! graph.recover()?;
//!
//! let sub = manager.subscribe_graph_events("graph-1", 0, |e| {
//!     println!("#{} {}", e.index, e.event.type_name());
//! })?;
//! manager.unsubscribe_stream(&sub);
//! ```

pub mod datum;
pub mod error;
pub mod graph;
pub mod model;
pub mod persistence;
pub mod query;
pub mod stream;
pub mod types;

// Re-exports
pub use datum::{decode_part, decode_parts, Datum, ErrorKind, Part};
pub use error::{DatumError, Result, SessionError, StoreError};
pub use graph::GraphManager;
pub use model::GraphEvent;
pub use persistence::{
    FileProvider, InMemoryProvider, PersistenceMessage, Persistent, Provider, ProviderConfig,
    ProviderState, PublishingProvider, Recovery,
};
pub use query::{Command, Connection, Frame, StreamWorker, WorkerConfig};
pub use stream::{
    DropReason, EventStream, StreamConfig, StreamEvent, Subscription, SubscriptionId,
};
pub use types::{RecoveryState, Timestamp};
