//! Locale selection, a subsystem parallel to the session.
//!
//! Locale interacts with the core only through shared wiring in the client;
//! it is deliberately not reset on logout.

use std::sync::Arc;

use tracing::info;

use crate::observable::{ObservableValue, SubscriptionId};

/// BCP 47 style locale tag, e.g. "en-GB"
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LocaleCode(pub String);

impl LocaleCode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Holds the active locale as a live value
pub struct LocaleStore {
    current: Arc<ObservableValue<LocaleCode>>,
}

impl LocaleStore {
    pub fn new(initial: LocaleCode) -> Self {
        Self {
            current: Arc::new(ObservableValue::with_name(initial, "locale")),
        }
    }

    /// Snapshot of the active locale
    pub fn current_locale(&self) -> LocaleCode {
        self.current.get()
    }

    /// Switch locale and notify subscribers
    pub fn set_locale(&self, code: LocaleCode) {
        info!(locale = %code.as_str(), "Switching locale");
        self.current.set(code);
    }

    /// Subscribe to locale changes
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&LocaleCode) + Send + Sync + 'static,
    {
        self.current.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.current.unsubscribe(id)
    }
}

impl Default for LocaleStore {
    fn default() -> Self {
        Self::new(LocaleCode::new("en-GB"))
    }
}
