//! Subscription registry broadcasting stream events.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

use super::types::{
    DeliveryGate, DropReason, StreamConfig, StreamEvent, Subscription, SubscriptionId,
};

/// Predicate deciding which events a subscription receives.
pub type Predicate = Box<dyn Fn(&StreamEvent) -> bool + Send + Sync>;

/// Registered subscriber state held by the stream.
struct Subscriber {
    predicate: Predicate,
    sender: Sender<Arc<StreamEvent>>,
    gate: Arc<DeliveryGate>,
}

impl Subscriber {
    /// Queue an event. Returns false if the subscriber must be dropped.
    fn try_send(&self, event: &Arc<StreamEvent>) -> bool {
        match self.sender.try_send(Arc::clone(event)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// A registered subscription whose delivery has not started yet.
///
/// Events matching the predicate queue up from the moment of registration
/// and are handed to the callback once [`PendingSubscription::start`] runs.
pub struct PendingSubscription {
    subscription: Subscription,
    receiver: Receiver<Arc<StreamEvent>>,
}

impl PendingSubscription {
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Spawn the delivery thread and return the handle.
    pub fn start<F>(self, mut callback: F) -> Subscription
    where
        F: FnMut(&StreamEvent) + Send + 'static,
    {
        let PendingSubscription {
            subscription,
            receiver,
        } = self;
        let gate = Arc::clone(&subscription.gate);
        let id = subscription.id;

        let spawned = thread::Builder::new()
            .name(format!("flowstore-sub-{}", id))
            .spawn(move || {
                gate.bind_current_thread();
                for event in receiver.iter() {
                    if !gate.deliver(|| callback(&*event)) {
                        break;
                    }
                }
                debug!(subscription = %id, "delivery finished");
            });

        if let Err(e) = spawned {
            warn!(subscription = %id, error = %e, "failed to spawn delivery thread");
            subscription.gate.deactivate(DropReason::Unsubscribed);
        }

        subscription
    }
}

/// In-process broadcaster of [`StreamEvent`]s.
///
/// Every subscription owns a queue and a delivery thread, so a slow callback
/// never blocks the publisher or other subscribers. Delivery order to one
/// subscriber is publication order.
pub struct EventStream {
    /// Active subscribers by ID.
    subscribers: RwLock<HashMap<SubscriptionId, Subscriber>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
    config: StreamConfig,
}

impl EventStream {
    pub fn new() -> Self {
        Self::with_config(StreamConfig::default())
    }

    pub fn with_config(config: StreamConfig) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// Register `predicate` and deliver matching events to `callback`.
    pub fn subscribe<P, F>(&self, predicate: P, callback: F) -> Subscription
    where
        P: Fn(&StreamEvent) -> bool + Send + Sync + 'static,
        F: FnMut(&StreamEvent) + Send + 'static,
    {
        self.subscribe_paused(predicate).start(callback)
    }

    /// Register `predicate` without starting delivery.
    ///
    /// Used to attach a live tail before replaying history so nothing
    /// published in between is lost.
    pub fn subscribe_paused<P>(&self, predicate: P) -> PendingSubscription
    where
        P: Fn(&StreamEvent) -> bool + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = match self.config.buffer_size {
            Some(size) => bounded(size),
            None => unbounded(),
        };
        let gate = Arc::new(DeliveryGate::new());

        self.subscribers.write().insert(
            id,
            Subscriber {
                predicate: Box::new(predicate),
                sender,
                gate: Arc::clone(&gate),
            },
        );
        debug!(subscription = %id, "subscribed");

        PendingSubscription {
            subscription: Subscription { id, gate },
            receiver,
        }
    }

    /// Cancel a subscription. Idempotent.
    ///
    /// Once this returns the callback will not be invoked again. A callback
    /// already running on another thread is waited for; calling this from
    /// inside the subscription's own callback is allowed.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        // Dropping the sender ends the delivery thread after the gate closes.
        let removed = self.subscribers.write().remove(&subscription.id);
        subscription.gate.deactivate(DropReason::Unsubscribed);
        if removed.is_some() {
            debug!(subscription = %subscription.id, "unsubscribed");
        }
    }

    /// Get subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Broadcast an event to every subscriber whose predicate matches.
    pub fn publish(&self, event: StreamEvent) {
        let event = Arc::new(event);
        let mut to_remove = Vec::new();

        {
            let subs = self.subscribers.read();
            for (id, sub) in subs.iter() {
                if (sub.predicate)(&event) && !sub.try_send(&event) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscribers.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    sub.gate.mark_dropped(DropReason::BufferOverflow);
                    warn!(subscription = %id, "dropping slow subscriber");
                }
            }
        }
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new()
    }
}
