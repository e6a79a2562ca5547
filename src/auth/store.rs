use std::sync::Arc;

use tracing::debug;

use crate::auth::token::TokenPair;
use crate::observable::{ObservableValue, SubscriptionId};

/// Holds the current token pair.
///
/// Pure data with atomic mutation and no I/O. The session is the sole
/// writer; `write`/`clear` notify subscribers synchronously with the new
/// value.
pub struct TokenStore {
    pair: Arc<ObservableValue<Option<TokenPair>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self {
            pair: Arc::new(ObservableValue::with_name(None, "token_store")),
        }
    }

    /// Non-blocking read of the latest pair
    pub fn read(&self) -> Option<TokenPair> {
        self.pair.get()
    }

    /// Atomically replace the pair
    pub fn write(&self, pair: TokenPair) {
        debug!("Storing new token pair");
        self.pair.set(Some(pair));
    }

    /// Atomically reset to empty
    pub fn clear(&self) {
        debug!("Clearing token pair");
        self.pair.set(None);
    }

    /// Subscribe to pair changes
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Option<TokenPair>) + Send + Sync + 'static,
    {
        self.pair.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.pair.unsubscribe(id)
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}
