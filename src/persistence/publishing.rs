//! Provider decorator that broadcasts persisted events.

use super::provider::{EventSink, Provider, ProviderState};
use crate::error::Result;
use crate::model::GraphEvent;
use crate::stream::{EventStream, StreamEvent};
use std::sync::Arc;

/// Wraps a provider so every successfully persisted event is also published
/// on an [`EventStream`].
///
/// Publication happens after the write returns, so live subscribers never
/// see an event that is not durable.
pub struct PublishingProvider {
    state: Arc<PublishingProviderState>,
}

impl PublishingProvider {
    pub fn new(inner: &dyn Provider, stream: Arc<EventStream>) -> Self {
        Self {
            state: Arc::new(PublishingProviderState {
                inner: inner.state(),
                stream,
            }),
        }
    }
}

impl Provider for PublishingProvider {
    fn state(&self) -> Arc<dyn ProviderState> {
        self.state.clone()
    }
}

pub struct PublishingProviderState {
    inner: Arc<dyn ProviderState>,
    stream: Arc<EventStream>,
}

impl ProviderState for PublishingProviderState {
    fn restart(&self) -> Result<()> {
        self.inner.restart()
    }

    fn get_snapshot(&self, name: &str) -> Result<Option<(Vec<u8>, u64)>> {
        self.inner.get_snapshot(name)
    }

    fn get_events(&self, name: &str, from_index: u64, deliver: &mut EventSink<'_>) -> Result<()> {
        self.inner.get_events(name, from_index, deliver)
    }

    fn persist_event(&self, name: &str, index: u64, event: &GraphEvent) -> Result<()> {
        self.inner.persist_event(name, index, event)?;
        self.stream.publish(StreamEvent::new(name, index, event.clone()));
        Ok(())
    }

    fn persist_snapshot(&self, name: &str, index: u64, snapshot: &[u8]) -> Result<()> {
        self.inner.persist_snapshot(name, index, snapshot)
    }

    fn snapshot_interval(&self) -> u64 {
        self.inner.snapshot_interval()
    }
}
