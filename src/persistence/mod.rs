//! Event-sourced persistence.
//!
//! | Piece                  | Role                                               |
//! |------------------------|----------------------------------------------------|
//! | [`ProviderState`]      | per-entity event log + latest snapshot contract    |
//! | [`InMemoryProvider`]   | process-local provider for tests and embedding     |
//! | [`FileProvider`]       | durable single-directory provider                  |
//! | [`PublishingProvider`] | decorator broadcasting persisted events            |
//! | [`Persistent`]         | recovery protocol implemented by entities          |

mod file;
mod log;
mod memory;
mod provider;
mod publishing;
mod recovery;

pub use file::{FileProvider, ProviderConfig};
pub use memory::{InMemoryProvider, DEFAULT_SNAPSHOT_INTERVAL};
pub use provider::{EventSink, Provider, ProviderState};
pub use publishing::{PublishingProvider, PublishingProviderState};
pub use recovery::{PersistenceMessage, Persistent, Recovery};
