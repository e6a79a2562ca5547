//! Live values with synchronous subscriber notification.
//!
//! Every piece of on-screen state in the engine (session state, cache
//! entries, derived totals) is held in an [`ObservableValue`]: a mutable
//! holder plus a map from subscription id to callback. Writes notify all
//! subscribers synchronously with the new value, in mutation order, so an
//! observer never sees a stale value after a newer one.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Identifier handed back by [`ObservableValue::subscribe`]
pub type SubscriptionId = Uuid;

type SubscriberFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A mutable holder whose writes are pushed synchronously to subscribers.
pub struct ObservableValue<T> {
    /// Current value; also serializes mutation+notification so
    /// notification order matches mutation order
    value: Mutex<T>,
    /// Registered subscribers
    subscribers: DashMap<SubscriptionId, SubscriberFn<T>>,
    /// Debug name used in logging
    name: String,
}

impl<T: Clone> ObservableValue<T> {
    /// Create a new observable with an initial value
    pub fn new(initial: T) -> Self {
        Self::with_name(initial, "unnamed")
    }

    /// Create a new observable with a debug name
    pub fn with_name(initial: T, name: impl Into<String>) -> Self {
        let name = name.into();
        trace!(name = %name, "Creating observable value");
        Self {
            value: Mutex::new(initial),
            subscribers: DashMap::new(),
            name,
        }
    }

    /// Non-blocking snapshot of the current value
    pub fn get(&self) -> T {
        self.value.lock().expect("observable poisoned").clone()
    }

    /// Replace the value and synchronously notify every subscriber
    pub fn set(&self, new_value: T) {
        self.update(|slot| *slot = new_value);
    }

    /// Mutate the value in place and synchronously notify every subscriber.
    ///
    /// The value lock is held across notification; callbacks must not call
    /// back into the same observable.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        let mut guard = self.value.lock().expect("observable poisoned");
        f(&mut guard);
        let snapshot = guard.clone();
        self.notify(&snapshot);
    }

    /// Register a callback invoked with every subsequent value
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.subscribers.insert(id, Arc::new(callback));
        debug!(name = %self.name, subscription_id = %id, "Registered subscriber");
        id
    }

    /// Remove a subscriber; returns whether it existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            debug!(name = %self.name, subscription_id = %id, "Unregistered subscriber");
        } else {
            warn!(
                name = %self.name,
                subscription_id = %id,
                "Attempted to unregister unknown subscriber"
            );
        }
        removed
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn notify(&self, snapshot: &T) {
        let callbacks: Vec<SubscriberFn<T>> = self
            .subscribers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        trace!(
            name = %self.name,
            subscribers = callbacks.len(),
            "Notifying subscribers"
        );

        for callback in callbacks {
            callback(snapshot);
        }
    }
}

impl<T: Clone + std::fmt::Debug> std::fmt::Debug for ObservableValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableValue")
            .field("name", &self.name)
            .field("value", &self.get())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
