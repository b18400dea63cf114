//! Core types shared across the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Name prefix of graph supervisor entities.
pub const SUPERVISOR_PREFIX: &str = "supervisor/";

/// Lifecycle of an entity's recovery.
///
/// Entities read this while handling messages to decide whether side
/// effects (outbound calls, timers) should run: during `Recovering` they are
/// being replayed history and must only rebuild state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RecoveryState {
    #[default]
    Uninitialized,
    Recovering,
    Ready,
}

impl fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryState::Uninitialized => f.write_str("uninitialized"),
            RecoveryState::Recovering => f.write_str("recovering"),
            RecoveryState::Ready => f.write_str("ready"),
        }
    }
}
