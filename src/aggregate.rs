//! Derived values recomputed from cache updates.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::cache::{CacheEntry, Resource};
use crate::model::Account;
use crate::observable::{ObservableValue, SubscriptionId};

/// Sum of balances over an account list
pub fn total_balance(accounts: &[Account]) -> f64 {
    accounts.iter().map(|account| account.balance).sum()
}

/// Republishes the total balance whenever the accounts cache produces a new
/// Success.
///
/// On `Loading`/`Error` the last computed value stays put, so a failed
/// refresh does not blank the figure on screen; logout resets it to the
/// default.
pub struct BalanceAggregator {
    total: Arc<ObservableValue<f64>>,
    /// `fetched_at` of the last Success seen, so flag-only mutations of the
    /// same entry (e.g. `is_refreshing` flips) do not republish the total
    last_seen: Mutex<Option<DateTime<Utc>>>,
}

impl BalanceAggregator {
    pub fn new() -> Self {
        Self {
            total: Arc::new(ObservableValue::with_name(0.0, "total_balance")),
            last_seen: Mutex::new(None),
        }
    }

    /// Latest computed total
    pub fn current(&self) -> f64 {
        self.total.get()
    }

    /// Subscribe to recomputed totals
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&f64) + Send + Sync + 'static,
    {
        self.total.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.total.unsubscribe(id)
    }

    /// Fed with every accounts cache entry; recomputes only when the
    /// resource becomes a new Success
    pub fn observe(&self, entry: &CacheEntry<Vec<Account>>) {
        if let Resource::Success { data, fetched_at } = &entry.resource {
            let mut last_seen = self.last_seen.lock().expect("aggregator poisoned");
            if *last_seen == Some(*fetched_at) {
                return;
            }
            *last_seen = Some(*fetched_at);

            let total = total_balance(data);
            debug!(total, accounts = data.len(), "Recomputed total balance");
            self.total.set(total);
        }
    }

    /// Back to the default; called on logout
    pub fn reset(&self) {
        debug!("Resetting total balance");
        *self.last_seen.lock().expect("aggregator poisoned") = None;
        self.total.set(0.0);
    }
}

impl Default for BalanceAggregator {
    fn default() -> Self {
        Self::new()
    }
}
