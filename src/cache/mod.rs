//! Reactive caches for remote-backed collections.
//!
//! Each cache holds the latest known value of one collection as a
//! [`Resource`] plus a refreshing flag, mediates between concurrent fetches
//! (at most one in flight per cache), and pushes every state change to
//! subscribers synchronously and in order.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::error::{TellerError, TellerResult};
use crate::observable::{ObservableValue, SubscriptionId};

/// Tagged state of a remote-backed value
#[derive(Debug, Clone, PartialEq)]
pub enum Resource<T> {
    /// No data yet; a fetch is the only way forward
    Loading,
    /// Data fetched successfully; replaced wholesale on each fetch
    Success { data: T, fetched_at: DateTime<Utc> },
    /// A fetch failed before any Success existed
    Error { error: TellerError },
}

impl<T> Resource<T> {
    /// The Success payload, if present
    pub fn data(&self) -> Option<&T> {
        match self {
            Resource::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Resource::Loading)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Resource::Success { .. })
    }
}

/// Snapshot handed to observers on every cache mutation.
///
/// `is_refreshing` may be true while `resource` still holds a stale Success,
/// so a refresh never flashes a spinner over data already on screen.
/// `last_error` carries the non-blocking error indicator shown next to
/// retained stale data; it is cleared by the next successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub resource: Resource<T>,
    pub is_refreshing: bool,
    pub last_error: Option<TellerError>,
}

impl<T> Default for CacheEntry<T> {
    fn default() -> Self {
        Self {
            resource: Resource::Loading,
            is_refreshing: false,
            last_error: None,
        }
    }
}

/// Produces a fresh value for a cache; implemented over the session-gated
/// request in production and by scripted fetchers in tests.
#[async_trait]
pub trait ResourceFetcher<T>: Send + Sync {
    async fn fetch(&self) -> TellerResult<T>;
}

/// Reactive cache for one remote-backed collection
pub struct ResourceCache<T: Clone + Send + Sync + 'static> {
    name: String,
    entry: ObservableValue<CacheEntry<T>>,
    fetcher: Arc<dyn ResourceFetcher<T>>,
    /// In-flight fetch slot; concurrent loads join instead of duplicating
    in_flight: Mutex<Option<broadcast::Sender<CacheEntry<T>>>>,
    /// False once the owning scope is torn down; late results are discarded
    live: AtomicBool,
    /// Bumped on every clear so results fetched for a previous session
    /// cannot repopulate the cache
    epoch: AtomicU64,
    /// How long a Success stays fresh; `None` means always fresh unless forced
    staleness: Option<Duration>,
    /// Fired when a fetch settles on `NotAuthenticated`, so the session can
    /// force a logout even though the cache just stores the error
    auth_failure_hook: StdMutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl<T: Clone + Send + Sync + 'static> ResourceCache<T> {
    /// Create a new cache starting at `Loading`
    pub fn new(
        name: impl Into<String>,
        fetcher: Arc<dyn ResourceFetcher<T>>,
        staleness: Option<Duration>,
    ) -> Self {
        let name = name.into();
        debug!(cache = %name, staleness = ?staleness, "Creating resource cache");
        Self {
            entry: ObservableValue::with_name(CacheEntry::default(), &name),
            name,
            fetcher,
            in_flight: Mutex::new(None),
            live: AtomicBool::new(true),
            epoch: AtomicU64::new(0),
            staleness,
            auth_failure_hook: StdMutex::new(None),
        }
    }

    /// Register the hook fired when a fetch settles on `NotAuthenticated`.
    /// The hook may clear this cache; it runs outside the entry lock.
    pub fn on_auth_failure<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.auth_failure_hook.lock().expect("hook poisoned") = Some(Box::new(hook));
    }

    /// Non-blocking snapshot of the current entry
    pub fn value(&self) -> CacheEntry<T> {
        self.entry.get()
    }

    /// Subscribe to every entry mutation
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&CacheEntry<T>) + Send + Sync + 'static,
    {
        self.entry.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.entry.unsubscribe(id)
    }

    /// Load the collection, coalescing into an already-running fetch.
    ///
    /// Returns the settled entry; callers that only observe may ignore it.
    /// A fresh Success short-circuits unless `force_refresh` is set. Errors
    /// are stored in the entry, never raised.
    pub async fn load(&self, force_refresh: bool) -> CacheEntry<T> {
        if !self.live.load(Ordering::SeqCst) {
            warn!(cache = %self.name, "Load requested on dead cache");
            return self.entry.get();
        }

        enum LoadRole<T: Clone> {
            Fresh(CacheEntry<T>),
            Join(broadcast::Receiver<CacheEntry<T>>),
            Own,
        }

        let role = {
            let mut flight = self.in_flight.lock().await;
            match flight.as_ref() {
                Some(tx) => LoadRole::Join(tx.subscribe()),
                None => {
                    let current = self.entry.get();
                    if !force_refresh && self.is_fresh(&current) {
                        LoadRole::Fresh(current)
                    } else {
                        let (tx, _) = broadcast::channel(8);
                        *flight = Some(tx);
                        LoadRole::Own
                    }
                }
            }
        };

        match role {
            LoadRole::Fresh(entry) => {
                debug!(cache = %self.name, "Serving fresh cached value");
                entry
            }
            LoadRole::Join(mut rx) => {
                debug!(cache = %self.name, "Joining in-flight fetch");
                match rx.recv().await {
                    Ok(entry) => entry,
                    Err(_) => self.entry.get(),
                }
            }
            LoadRole::Own => self.run_fetch().await,
        }
    }

    /// Reset to `Loading`/empty; fired by the logout signal.
    /// Any fetch still in flight is disowned: its result will be discarded.
    pub fn clear(&self) {
        info!(cache = %self.name, "Clearing cache");
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.entry.set(CacheEntry::default());
    }

    /// Mark the cache dead; late fetch results will be discarded and new
    /// loads answered from the last snapshot
    pub fn shutdown(&self) {
        debug!(cache = %self.name, "Shutting down cache");
        self.live.store(false, Ordering::SeqCst);
    }

    async fn run_fetch(&self) -> CacheEntry<T> {
        let epoch = self.epoch.load(Ordering::SeqCst);

        // Keep prior Success visible while the refresh runs
        self.entry.update(|entry| entry.is_refreshing = true);

        debug!(cache = %self.name, "Starting fetch");
        let outcome = self.fetcher.fetch().await;
        let auth_failed = matches!(&outcome, Err(e) if e.is_not_authenticated());

        let still_live = self.live.load(Ordering::SeqCst);
        let same_epoch = self.epoch.load(Ordering::SeqCst) == epoch;
        let settled = if still_live && same_epoch {
            let settled = self.apply(outcome);
            if auth_failed {
                self.fire_auth_failure();
            }
            settled
        } else {
            warn!(
                cache = %self.name,
                still_live,
                "Discarding fetch result for a torn-down scope"
            );
            if self.entry.get().is_refreshing {
                self.entry.update(|entry| entry.is_refreshing = false);
            }
            self.entry.get()
        };

        // Deliver to joiners before releasing the slot
        let mut flight = self.in_flight.lock().await;
        if let Some(tx) = flight.as_ref() {
            let _ = tx.send(settled.clone());
        }
        *flight = None;

        settled
    }

    /// Runs after the error has been stored; the hook typically logs the
    /// session out, which clears this cache again through the logout signal
    fn fire_auth_failure(&self) {
        warn!(cache = %self.name, "Fetch rejected as unauthenticated, signalling session logout");
        let hook = self.auth_failure_hook.lock().expect("hook poisoned");
        if let Some(hook) = hook.as_ref() {
            hook();
        }
    }

    fn apply(&self, outcome: TellerResult<T>) -> CacheEntry<T> {
        self.entry.update(|entry| {
            entry.is_refreshing = false;
            match outcome {
                Ok(data) => {
                    entry.resource = Resource::Success {
                        data,
                        fetched_at: Utc::now(),
                    };
                    entry.last_error = None;
                }
                Err(error) => {
                    // A failed refresh never discards previously good data
                    if entry.resource.is_success() {
                        entry.last_error = Some(error);
                    } else {
                        entry.resource = Resource::Error { error };
                        entry.last_error = None;
                    }
                }
            }
        });
        self.entry.get()
    }

    fn is_fresh(&self, entry: &CacheEntry<T>) -> bool {
        match &entry.resource {
            Resource::Success { fetched_at, .. } => match self.staleness {
                None => true,
                Some(window) => {
                    let age = Utc::now() - *fetched_at;
                    age.to_std().map_or(true, |age| age < window)
                }
            },
            _ => false,
        }
    }
}
