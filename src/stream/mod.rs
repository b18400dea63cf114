//! Live event stream for persisted entity events.
//!
//! This module provides in-process publish/subscribe over [`StreamEvent`]s:
//! - Predicate filtering evaluated at publication
//! - One queue and delivery thread per subscription
//! - Race-free cancellation: no callback starts after `unsubscribe` returns
//! - Paused registration for splicing replayed history with the live tail
//!
//! # Example
//!
//! ```ignore
//! let stream = EventStream::new();
//!
//! let sub = stream.subscribe(
//!     |e| e.entity_name == "graph-1",
//!     |e| println!("{} #{}: {}", e.entity_name, e.index, e.event.type_name()),
//! );
//!
//! stream.publish(StreamEvent::new("graph-1", 0, event));
//! stream.unsubscribe(&sub);
//! ```

mod manager;
mod types;

pub use manager::{EventStream, PendingSubscription, Predicate};
pub use types::{DropReason, StreamConfig, StreamEvent, Subscription, SubscriptionId};
