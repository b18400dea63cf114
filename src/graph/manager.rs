//! Facade joining persisted graph history with the live event stream.

use crate::error::Result;
use crate::persistence::{Provider, ProviderState, PublishingProvider};
use crate::stream::{EventStream, StreamEvent, Subscription};
use std::sync::Arc;
use tracing::debug;

/// Entry point for observers of graph events.
///
/// Entities persist through [`GraphManager::provider_state`], which
/// publishes every stored event; observers attach through the subscribe
/// methods.
pub struct GraphManager {
    stream: Arc<EventStream>,
    provider_state: Arc<dyn ProviderState>,
}

impl GraphManager {
    /// Wrap `provider` with a fresh event stream.
    pub fn new(provider: &dyn Provider) -> Self {
        Self::with_stream(provider, Arc::new(EventStream::new()))
    }

    /// Wrap `provider`, publishing on an existing stream.
    pub fn with_stream(provider: &dyn Provider, stream: Arc<EventStream>) -> Self {
        let publishing = PublishingProvider::new(provider, Arc::clone(&stream));
        Self {
            provider_state: publishing.state(),
            stream,
        }
    }

    /// Provider state for entities; persisted events reach subscribers.
    pub fn provider_state(&self) -> Arc<dyn ProviderState> {
        Arc::clone(&self.provider_state)
    }

    pub fn stream(&self) -> &Arc<EventStream> {
        &self.stream
    }

    /// Replay the stored events of `graph_id` from `from_index`, then follow
    /// its live events.
    ///
    /// Replay runs on the calling thread before this returns. Live delivery
    /// continues on the subscription's own thread, starting exactly after
    /// the last replayed index, so no event is missed or seen twice.
    pub fn subscribe_graph_events<F>(
        &self,
        graph_id: &str,
        from_index: u64,
        mut callback: F,
    ) -> Result<Subscription>
    where
        F: FnMut(&StreamEvent) + Send + 'static,
    {
        let name = graph_id.to_string();
        let pending = self
            .stream
            .subscribe_paused(move |event| event.entity_name == name);

        let mut replay_end = from_index;
        let replayed = self
            .provider_state
            .get_events(graph_id, from_index, &mut |index, event| {
                callback(&StreamEvent::new(graph_id, index, event));
                replay_end = index + 1;
                Ok(())
            });

        if let Err(e) = replayed {
            self.stream.unsubscribe(pending.subscription());
            return Err(e);
        }

        debug!(graph_id, from_index, replay_end, "graph replay delivered");
        Ok(pending.start(move |event| {
            if event.index >= replay_end {
                callback(event);
            }
        }))
    }

    /// Follow live events matching `predicate`. No history is replayed.
    pub fn stream_new_events<P, F>(&self, predicate: P, callback: F) -> Subscription
    where
        P: Fn(&StreamEvent) -> bool + Send + Sync + 'static,
        F: FnMut(&StreamEvent) + Send + 'static,
    {
        self.stream.subscribe(predicate, callback)
    }

    pub fn unsubscribe_stream(&self, subscription: &Subscription) {
        self.stream.unsubscribe(subscription);
    }
}
