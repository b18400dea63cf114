//! In-memory provider.

use super::provider::{EventSink, Provider, ProviderState};
use crate::error::{Result, StoreError};
use crate::model::GraphEvent;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Default number of events between snapshot requests.
pub const DEFAULT_SNAPSHOT_INTERVAL: u64 = 1000;

/// Provider keeping events and snapshots in process memory.
///
/// Cloning shares the underlying store, so a "restarted" entity built from
/// a clone sees everything persisted before.
#[derive(Clone)]
pub struct InMemoryProvider {
    state: Arc<InMemoryState>,
}

impl InMemoryProvider {
    pub fn new(snapshot_interval: u64) -> Self {
        Self {
            state: Arc::new(InMemoryState {
                events: RwLock::new(HashMap::new()),
                snapshots: RwLock::new(HashMap::new()),
                snapshot_interval: snapshot_interval.max(1),
            }),
        }
    }

    /// Number of events stored for `name`.
    pub fn event_count(&self, name: &str) -> u64 {
        self.state
            .events
            .read()
            .get(name)
            .map_or(0, |events| events.len() as u64)
    }

    /// Index of the stored snapshot for `name`, if any.
    pub fn snapshot_index(&self, name: &str) -> Option<u64> {
        self.state.snapshots.read().get(name).map(|(_, index)| *index)
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_INTERVAL)
    }
}

impl Provider for InMemoryProvider {
    fn state(&self) -> Arc<dyn ProviderState> {
        self.state.clone()
    }
}

struct InMemoryState {
    /// Events per entity; position is the event index.
    events: RwLock<HashMap<String, Vec<GraphEvent>>>,
    snapshots: RwLock<HashMap<String, (Vec<u8>, u64)>>,
    snapshot_interval: u64,
}

impl ProviderState for InMemoryState {
    fn restart(&self) -> Result<()> {
        // Reads go straight to the maps; there is no cursor to reset.
        Ok(())
    }

    fn get_snapshot(&self, name: &str) -> Result<Option<(Vec<u8>, u64)>> {
        Ok(self.snapshots.read().get(name).cloned())
    }

    fn get_events(&self, name: &str, from_index: u64, deliver: &mut EventSink<'_>) -> Result<()> {
        // Copy out so `deliver` runs without the lock held.
        let pending: Vec<GraphEvent> = {
            let events = self.events.read();
            match events.get(name) {
                Some(log) => log.iter().skip(from_index as usize).cloned().collect(),
                None => Vec::new(),
            }
        };

        for (offset, event) in pending.into_iter().enumerate() {
            deliver(from_index + offset as u64, event)?;
        }
        Ok(())
    }

    fn persist_event(&self, name: &str, index: u64, event: &GraphEvent) -> Result<()> {
        let mut events = self.events.write();
        let log = events.entry(name.to_string()).or_default();
        let expected = log.len() as u64;
        if index != expected {
            return Err(StoreError::EventOutOfOrder {
                entity: name.to_string(),
                expected,
                got: index,
            });
        }
        log.push(event.clone());
        Ok(())
    }

    fn persist_snapshot(&self, name: &str, index: u64, snapshot: &[u8]) -> Result<()> {
        debug!(entity = name, index, bytes = snapshot.len(), "storing snapshot");
        self.snapshots
            .write()
            .insert(name.to_string(), (snapshot.to_vec(), index));
        Ok(())
    }

    fn snapshot_interval(&self) -> u64 {
        self.snapshot_interval
    }
}
