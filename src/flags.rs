//! Persisted boolean flags ("phone linked", "PIN set up", ...).
//!
//! The store is an injected port with an explicit lifecycle: opened when the
//! session is constructed, cleared in full on logout. The engine never
//! reaches for a hidden process-wide store.

use dashmap::DashMap;
use tracing::debug;

/// Key-value port for persisted boolean flags
pub trait FlagStore: Send + Sync {
    /// Read a flag; absent keys read as false
    fn get(&self, key: &str) -> bool;
    /// Set a flag
    fn set(&self, key: &str, value: bool);
    /// Drop every flag; called on logout
    fn clear_all(&self);
}

/// In-memory flag store
#[derive(Default)]
pub struct MemoryFlagStore {
    flags: DashMap<String, bool>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlagStore for MemoryFlagStore {
    fn get(&self, key: &str) -> bool {
        self.flags.get(key).map(|v| *v).unwrap_or(false)
    }

    fn set(&self, key: &str, value: bool) {
        debug!(key = %key, value, "Setting flag");
        self.flags.insert(key.to_string(), value);
    }

    fn clear_all(&self) {
        let count = self.flags.len();
        self.flags.clear();
        debug!(count, "Cleared all flags");
    }
}
