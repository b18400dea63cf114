//! Event-sourced recovery for stateful entities.
//!
//! An entity embeds a [`Recovery`] and implements [`Persistent`]. On start it
//! calls [`Persistent::recover`], which rebuilds its state from the latest
//! snapshot plus the events persisted after it; afterwards new events go
//! through [`Persistent::persist_event`].
//!
//! ```text
//!  Uninitialized ──recover()──▶ Recovering ──replay done──▶ Ready
//! ```
//!
//! The entity runtime delivers one message at a time to an entity, so none
//! of this is locked.

use super::provider::{Provider, ProviderState};
use crate::error::{Result, StoreError};
use crate::model::GraphEvent;
use crate::types::RecoveryState;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Messages the recovery protocol delivers to an entity.
#[derive(Clone, Debug, PartialEq)]
pub enum PersistenceMessage<S> {
    /// Baseline state; always delivered before any replayed event.
    Snapshot(S),
    /// A persisted event, either replayed or just written.
    Event(GraphEvent),
    /// Replay finished; the entity is now ready.
    ReplayComplete,
    /// The log crossed a snapshot interval boundary.
    RequestSnapshot,
}

/// Per-entity recovery state: name, next event index and lifecycle.
pub struct Recovery {
    name: String,
    provider_state: Arc<dyn ProviderState>,
    event_index: u64,
    state: RecoveryState,
}

impl Recovery {
    pub fn new(name: impl Into<String>, provider: &dyn Provider) -> Self {
        Self::with_state(name, provider.state())
    }

    pub fn with_state(name: impl Into<String>, provider_state: Arc<dyn ProviderState>) -> Self {
        Self {
            name: name.into(),
            provider_state,
            event_index: 0,
            state: RecoveryState::Uninitialized,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index the next persisted event will get.
    pub fn event_index(&self) -> u64 {
        self.event_index
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    pub fn recovering(&self) -> bool {
        self.state == RecoveryState::Recovering
    }

    fn begin(&mut self) -> Result<()> {
        if self.state != RecoveryState::Uninitialized {
            return Err(StoreError::AlreadyRecovered {
                entity: self.name.clone(),
            });
        }
        self.state = RecoveryState::Recovering;
        self.event_index = 0;
        self.provider_state.restart()
    }

    fn load_snapshot(&mut self) -> Result<Option<Vec<u8>>> {
        match self.provider_state.get_snapshot(&self.name)? {
            Some((data, index)) => {
                self.event_index = index;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    fn advance_replayed(&mut self, index: u64) -> Result<()> {
        if index < self.event_index {
            return Err(StoreError::EventOutOfOrder {
                entity: self.name.clone(),
                expected: self.event_index,
                got: index,
            });
        }
        self.event_index = index + 1;
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state != RecoveryState::Ready {
            return Err(StoreError::NotReady {
                entity: self.name.clone(),
                state: self.state.to_string(),
            });
        }
        Ok(())
    }

    /// Append at the current index. Returns true when a snapshot is due.
    fn append(&mut self, event: &GraphEvent) -> Result<bool> {
        self.ensure_ready()?;
        self.provider_state
            .persist_event(&self.name, self.event_index, event)?;
        self.event_index += 1;
        Ok(self.event_index % self.provider_state.snapshot_interval() == 0)
    }

    fn store_snapshot(&self, data: &[u8]) -> Result<()> {
        self.ensure_ready()?;
        self.provider_state
            .persist_snapshot(&self.name, self.event_index, data)
    }
}

/// Capability an event-sourced entity provides to the recovery protocol.
///
/// Implementors supply access to their embedded [`Recovery`] and a
/// `receive` handler; the persistence operations are provided.
pub trait Persistent {
    type Snapshot: Serialize + DeserializeOwned;

    fn recovery(&self) -> &Recovery;

    fn recovery_mut(&mut self) -> &mut Recovery;

    /// Handle a snapshot, event or lifecycle signal. An error during replay
    /// aborts recovery.
    fn receive(&mut self, message: PersistenceMessage<Self::Snapshot>) -> Result<()>;

    /// Rebuild state from the store.
    ///
    /// Delivers the latest snapshot (if any), then every later event in
    /// index order, then [`PersistenceMessage::ReplayComplete`]. Any failure
    /// leaves the entity stuck in `Recovering`; it must be discarded.
    fn recover(&mut self) -> Result<()> {
        self.recovery_mut().begin()?;
        let provider_state = Arc::clone(&self.recovery().provider_state);
        let name = self.recovery().name.clone();

        if let Some(data) = self.recovery_mut().load_snapshot()? {
            let snapshot: Self::Snapshot = rmp_serde::from_slice(&data)?;
            debug!(entity = %name, index = self.recovery().event_index, "applying snapshot");
            self.receive(PersistenceMessage::Snapshot(snapshot))?;
        }

        let from_index = self.recovery().event_index;
        let mut replayed = 0u64;
        provider_state.get_events(&name, from_index, &mut |index, event| {
            self.receive(PersistenceMessage::Event(event))?;
            self.recovery_mut().advance_replayed(index)?;
            replayed += 1;
            Ok(())
        })?;

        self.recovery_mut().state = RecoveryState::Ready;
        info!(
            entity = %name,
            from_index,
            replayed,
            event_index = self.recovery().event_index,
            "recovery complete"
        );
        self.receive(PersistenceMessage::ReplayComplete)
    }

    /// Persist `event` at the next index.
    ///
    /// Sends [`PersistenceMessage::RequestSnapshot`] to the entity when the
    /// new index is a multiple of the provider's snapshot interval.
    fn persist_event(&mut self, event: &GraphEvent) -> Result<()> {
        if self.recovery_mut().append(event)? {
            debug!(
                entity = %self.recovery().name,
                index = self.recovery().event_index,
                "snapshot requested"
            );
            self.receive(PersistenceMessage::RequestSnapshot)?;
        }
        Ok(())
    }

    /// Store `snapshot` as of the current event index.
    fn persist_snapshot(&mut self, snapshot: &Self::Snapshot) -> Result<()> {
        let data = rmp_serde::to_vec_named(snapshot)?;
        self.recovery().store_snapshot(&data)
    }

    fn recovering(&self) -> bool {
        self.recovery().recovering()
    }

    fn name(&self) -> &str {
        self.recovery().name()
    }
}
