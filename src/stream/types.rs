//! Event stream types.

use crate::model::GraphEvent;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

/// A persisted event together with the entity that produced it.
///
/// Built once at publication and shared by every subscriber that receives it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub entity_name: String,
    /// Index of the event in the entity's log.
    pub index: u64,
    pub event: GraphEvent,
}

impl StreamEvent {
    pub fn new(entity_name: impl Into<String>, index: u64, event: GraphEvent) -> Self {
        Self {
            entity_name: entity_name.into(),
            index,
            event,
        }
    }
}

/// Configuration for an event stream.
#[derive(Clone, Debug, Default)]
pub struct StreamConfig {
    /// Max queued events per subscriber before it is dropped.
    /// Default: None (unbounded)
    pub buffer_size: Option<usize>,
}

/// Why a subscription stopped receiving events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Queue overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Guards callback invocation for one subscription.
///
/// A callback only starts while holding `lock` with `active` set, so once
/// `deactivate` returns no new invocation can begin.
pub(crate) struct DeliveryGate {
    active: AtomicBool,
    lock: Mutex<()>,
    delivery_thread: OnceLock<ThreadId>,
    drop_reason: Mutex<Option<DropReason>>,
}

impl DeliveryGate {
    pub(crate) fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            lock: Mutex::new(()),
            delivery_thread: OnceLock::new(),
            drop_reason: Mutex::new(None),
        }
    }

    pub(crate) fn bind_current_thread(&self) {
        let _ = self.delivery_thread.set(thread::current().id());
    }

    /// Run `f` unless the subscription has been deactivated.
    /// Returns false once deactivated.
    pub(crate) fn deliver<F: FnOnce()>(&self, f: F) -> bool {
        let _guard = self.lock.lock();
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        f();
        true
    }

    pub(crate) fn deactivate(&self, reason: DropReason) {
        self.drop_reason.lock().get_or_insert(reason);

        // Called from inside our own callback: the lock is already held by
        // this thread, and the loop re-checks the flag before the next event.
        if self.delivery_thread.get() == Some(&thread::current().id()) {
            self.active.store(false, Ordering::Release);
            return;
        }

        let _guard = self.lock.lock();
        self.active.store(false, Ordering::Release);
    }

    /// Stop delivery without taking the gate lock. A callback already
    /// running finishes; no further one starts.
    pub(crate) fn mark_dropped(&self, reason: DropReason) {
        self.drop_reason.lock().get_or_insert(reason);
        self.active.store(false, Ordering::Release);
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn drop_reason(&self) -> Option<DropReason> {
        self.drop_reason.lock().clone()
    }
}

/// Handle to a live subscription, used to cancel it.
#[derive(Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub(crate) gate: Arc<DeliveryGate>,
}

impl Subscription {
    /// False once unsubscribed or dropped.
    pub fn is_active(&self) -> bool {
        self.gate.is_active()
    }

    /// Why the subscription stopped, if it has.
    pub fn drop_reason(&self) -> Option<DropReason> {
        self.gate.drop_reason()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Subscription {}
