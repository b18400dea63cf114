//! Storage contract consumed by the recovery protocol.

use crate::error::Result;
use crate::model::GraphEvent;
use std::sync::Arc;

/// Callback receiving `(index, event)` pairs during replay.
pub type EventSink<'a> = dyn FnMut(u64, GraphEvent) -> Result<()> + 'a;

/// Durable per-entity event log and snapshot store.
///
/// Implementations must be strongly consistent per entity name. No ordering
/// across names is required.
pub trait ProviderState: Send + Sync {
    /// Reset any read cursor so the following reads observe every write.
    fn restart(&self) -> Result<()>;

    /// Latest snapshot for `name` and the event index it was taken at.
    fn get_snapshot(&self, name: &str) -> Result<Option<(Vec<u8>, u64)>>;

    /// Call `deliver` once per stored event of `name` with index >=
    /// `from_index`, in strictly increasing index order, before returning.
    ///
    /// An error from `deliver` stops the replay and is returned as is.
    fn get_events(&self, name: &str, from_index: u64, deliver: &mut EventSink<'_>) -> Result<()>;

    /// Append `event` at `index` to the log of `name`.
    fn persist_event(&self, name: &str, index: u64, event: &GraphEvent) -> Result<()>;

    /// Store `snapshot` as the latest snapshot of `name`, replacing any older one.
    fn persist_snapshot(&self, name: &str, index: u64, snapshot: &[u8]) -> Result<()>;

    /// Number of events between snapshot requests. Always positive.
    fn snapshot_interval(&self) -> u64;
}

/// Source of [`ProviderState`] handles for entities.
pub trait Provider: Send + Sync {
    fn state(&self) -> Arc<dyn ProviderState>;
}

impl<P: Provider + ?Sized> Provider for Arc<P> {
    fn state(&self) -> Arc<dyn ProviderState> {
        (**self).state()
    }
}
