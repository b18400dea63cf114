//! Graph-level view over persisted and live events.

mod manager;

pub use manager::GraphManager;
