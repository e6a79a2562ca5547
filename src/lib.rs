//! Client-side session and reactive resource cache engine for a mobile
//! banking app.
//!
//! The engine authenticates a user, caches remote account and transaction
//! collections, and keeps observable state consistent as network calls
//! complete, fail, or are retried. The visual layer, wire transport, and
//! persisted flag storage live behind narrow trait seams
//! ([`gateway::RemoteGateway`], [`flags::FlagStore`]), so the whole engine
//! is testable against scripted collaborators.

pub mod aggregate;
pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod flags;
pub mod gateway;
pub mod locale;
pub mod model;
pub mod observable;
pub mod request;

pub use aggregate::{total_balance, BalanceAggregator};
pub use auth::{AuthSession, SessionState, TokenPair, TokenStore};
pub use cache::{CacheEntry, Resource, ResourceCache, ResourceFetcher};
pub use client::TellerClient;
pub use config::ClientConfig;
pub use error::{TellerError, TellerResult};
pub use flags::{FlagStore, MemoryFlagStore};
pub use gateway::{GatewayError, HttpGateway, HttpMethod, RemoteGateway};
pub use locale::{LocaleCode, LocaleStore};
pub use model::{Account, Transaction};
pub use request::SessionGatedRequest;

pub mod telemetry {
    //! Structured logging setup.

    use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    /// Initialize the tracing subscriber for structured logging.
    ///
    /// Honors `RUST_LOG`; without it, engine modules log at debug in debug
    /// builds and info in release builds. Safe to call once per process.
    pub fn init() {
        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                if cfg!(debug_assertions) {
                    "teller=debug,warn".into()
                } else {
                    "teller=info,warn".into()
                }
            }))
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}
