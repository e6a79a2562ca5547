//! The authentication session state machine.
//!
//! Single source of truth for "is the user authenticated". Drives login,
//! logout, and token refresh; owns the [`TokenStore`]; guarantees that at
//! most one login and one refresh are in flight at any time (joiners attach
//! to the existing operation instead of issuing duplicate network calls).

use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::auth::store::TokenStore;
use crate::auth::token::TokenPair;
use crate::error::{invalid_credentials, malformed_response, TellerError, TellerResult};
use crate::flags::FlagStore;
use crate::gateway::{GatewayError, HttpMethod, RemoteGateway};
use crate::observable::{ObservableValue, SubscriptionId};

const LOGIN_ENDPOINT: &str = "/auth/login";
const REFRESH_ENDPOINT: &str = "/auth/refresh";

/// Session state; exactly one holds at any instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionState {
    /// No session
    LoggedOut,

    /// A login call is in flight
    Authenticating,

    /// Valid session with a token pair
    Authenticated { pair: TokenPair },

    /// A refresh call is in flight; the previous pair is still readable
    Refreshing { previous: TokenPair },

    /// Transient marker signalling a forced logout; collapses immediately
    /// to `LoggedOut`
    Expired,
}

impl SessionState {
    /// Whether the session currently holds a usable token
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }
}

type LoginOutcome = TellerResult<TokenPair>;
type RefreshOutcome = TellerResult<String>;

/// The session state machine
pub struct AuthSession {
    gateway: Arc<dyn RemoteGateway>,
    token_store: TokenStore,
    flags: Arc<dyn FlagStore>,
    state: Arc<ObservableValue<SessionState>>,
    /// In-flight login slot; joiners subscribe instead of starting a second call
    login_flight: Mutex<Option<broadcast::Sender<LoginOutcome>>>,
    /// In-flight refresh slot
    refresh_flight: Mutex<Option<broadcast::Sender<RefreshOutcome>>>,
    /// Hooks fired after every logout (cache clears, aggregator resets)
    logout_hooks: StdMutex<Vec<Box<dyn Fn() + Send + Sync>>>,
}

impl AuthSession {
    /// Create a new session owning a fresh token store
    pub fn new(gateway: Arc<dyn RemoteGateway>, flags: Arc<dyn FlagStore>) -> Self {
        Self {
            gateway,
            token_store: TokenStore::new(),
            flags,
            state: Arc::new(ObservableValue::with_name(
                SessionState::LoggedOut,
                "session_state",
            )),
            login_flight: Mutex::new(None),
            refresh_flight: Mutex::new(None),
            logout_hooks: StdMutex::new(Vec::new()),
        }
    }

    /// Snapshot of the current state
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Subscribe to state changes
    pub fn subscribe_state<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        self.state.subscribe(callback)
    }

    /// Remove a state subscriber
    pub fn unsubscribe_state(&self, id: SubscriptionId) -> bool {
        self.state.unsubscribe(id)
    }

    /// Register a hook fired synchronously after every logout
    pub fn on_logout<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.logout_hooks.lock().expect("hooks poisoned").push(Box::new(hook));
    }

    /// Read-only view of the token store
    pub fn token_store(&self) -> &TokenStore {
        &self.token_store
    }

    /// Snapshot of the current access token; never blocks
    pub fn current_token(&self) -> Option<String> {
        self.token_store.read().map(|pair| pair.access_token)
    }

    /// Exchange credentials for a token pair.
    ///
    /// Single-flight: a second call while `Authenticating` joins the
    /// in-flight outcome instead of issuing another network call. A login
    /// while already `Authenticated` returns the existing pair; a login
    /// while `Refreshing` awaits the refresh instead of racing it.
    pub async fn login(&self, email: &str, password: &str) -> LoginOutcome {
        enum LoginRole {
            Join(broadcast::Receiver<LoginOutcome>),
            AwaitRefresh,
            Own,
        }

        let role = {
            let mut flight = self.login_flight.lock().await;
            match flight.as_ref() {
                Some(tx) => LoginRole::Join(tx.subscribe()),
                None => match self.state.get() {
                    SessionState::Authenticated { pair } => {
                        debug!("Login requested while already authenticated");
                        return Ok(pair);
                    }
                    SessionState::Refreshing { .. } => LoginRole::AwaitRefresh,
                    _ => {
                        let (tx, _) = broadcast::channel(8);
                        *flight = Some(tx);
                        self.state.set(SessionState::Authenticating);
                        LoginRole::Own
                    }
                },
            }
        };

        match role {
            LoginRole::Join(mut rx) => {
                debug!("Joining in-flight login");
                return match rx.recv().await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(TellerError::NotAuthenticated),
                };
            }
            LoginRole::AwaitRefresh => {
                debug!("Login requested while a refresh is in flight");
                self.join_refresh().await?;
                return match self.state.get() {
                    SessionState::Authenticated { pair } => Ok(pair),
                    _ => Err(TellerError::NotAuthenticated),
                };
            }
            LoginRole::Own => {}
        }

        info!("Starting login");
        let outcome = self.exchange_credentials(email, password).await;

        match &outcome {
            Ok(pair) => {
                // Apply only if the session was not torn down mid-flight
                if matches!(self.state.get(), SessionState::Authenticating) {
                    self.token_store.write(pair.clone());
                    self.state
                        .set(SessionState::Authenticated { pair: pair.clone() });
                    info!("Login succeeded");
                } else {
                    warn!("Discarding login result: session no longer authenticating");
                }
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                if matches!(self.state.get(), SessionState::Authenticating) {
                    self.state.set(SessionState::LoggedOut);
                }
            }
        }

        // Deliver to joiners before releasing the slot
        let mut flight = self.login_flight.lock().await;
        if let Some(tx) = flight.as_ref() {
            let _ = tx.send(outcome.clone());
        }
        *flight = None;

        outcome
    }

    /// Return a token usable right now.
    ///
    /// `Authenticated` answers immediately; `Refreshing`/`Authenticating`
    /// await the in-flight operation; `LoggedOut`/`Expired` fail with
    /// `NotAuthenticated`.
    pub async fn ensure_valid_token(&self) -> TellerResult<String> {
        match self.state.get() {
            SessionState::Authenticated { pair } => Ok(pair.access_token),
            SessionState::Refreshing { .. } => self.join_refresh().await,
            SessionState::Authenticating => self.join_login().await,
            SessionState::LoggedOut | SessionState::Expired => {
                Err(TellerError::NotAuthenticated)
            }
        }
    }

    /// Trigger `Authenticated -> Refreshing` and exchange the refresh token.
    ///
    /// Single-flight: concurrent callers join the in-flight refresh. On
    /// failure the session collapses through `Expired` to `LoggedOut` and
    /// the token store is cleared.
    pub async fn force_refresh(&self) -> RefreshOutcome {
        enum RefreshRole {
            Join(broadcast::Receiver<RefreshOutcome>),
            Own(TokenPair),
        }

        let role = {
            let mut flight = self.refresh_flight.lock().await;
            match flight.as_ref() {
                Some(tx) => RefreshRole::Join(tx.subscribe()),
                None => {
                    let previous = match self.state.get() {
                        SessionState::Authenticated { pair } => pair,
                        _ => return Err(TellerError::NotAuthenticated),
                    };
                    let (tx, _) = broadcast::channel(8);
                    *flight = Some(tx);
                    self.state.set(SessionState::Refreshing {
                        previous: previous.clone(),
                    });
                    RefreshRole::Own(previous)
                }
            }
        };

        let owned_previous = match role {
            RefreshRole::Join(mut rx) => {
                debug!("Joining in-flight token refresh");
                return match rx.recv().await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(TellerError::NotAuthenticated),
                };
            }
            RefreshRole::Own(previous) => previous,
        };

        info!("Refreshing access token");
        let outcome = match self.exchange_refresh_token(&owned_previous).await {
            Ok(pair) => {
                if matches!(self.state.get(), SessionState::Refreshing { .. }) {
                    self.token_store.write(pair.clone());
                    self.state
                        .set(SessionState::Authenticated { pair: pair.clone() });
                    info!("Token refresh succeeded");
                    Ok(pair.access_token)
                } else {
                    warn!("Discarding refresh result: session no longer refreshing");
                    Err(TellerError::NotAuthenticated)
                }
            }
            Err(e) => {
                error!(error = %e, "Token refresh failed, forcing logout");
                if matches!(self.state.get(), SessionState::Refreshing { .. }) {
                    // Expired is a transient marker; it collapses to LoggedOut
                    self.state.set(SessionState::Expired);
                    self.perform_logout();
                }
                Err(TellerError::NotAuthenticated)
            }
        };

        let mut flight = self.refresh_flight.lock().await;
        if let Some(tx) = flight.as_ref() {
            let _ = tx.send(outcome.clone());
        }
        *flight = None;

        outcome
    }

    /// Log out. Synchronous, always succeeds, idempotent: when already
    /// `LoggedOut` nothing is cleared and no signal fires.
    pub fn logout(&self) {
        if matches!(self.state.get(), SessionState::LoggedOut) {
            debug!("Logout requested while already logged out");
            return;
        }
        info!("Logging out");
        self.perform_logout();
    }

    fn perform_logout(&self) {
        self.token_store.clear();
        self.flags.clear_all();
        self.state.set(SessionState::LoggedOut);

        let hooks = self.logout_hooks.lock().expect("hooks poisoned");
        debug!(hooks = hooks.len(), "Firing logout hooks");
        for hook in hooks.iter() {
            hook();
        }
    }

    async fn join_login(&self) -> TellerResult<String> {
        let rx = {
            let flight = self.login_flight.lock().await;
            flight.as_ref().map(|tx| tx.subscribe())
        };
        match rx {
            Some(mut rx) => match rx.recv().await {
                Ok(Ok(pair)) => Ok(pair.access_token),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(TellerError::NotAuthenticated),
            },
            // The login settled between the state read and the slot lock
            None => match self.state.get() {
                SessionState::Authenticated { pair } => Ok(pair.access_token),
                _ => Err(TellerError::NotAuthenticated),
            },
        }
    }

    async fn join_refresh(&self) -> TellerResult<String> {
        let rx = {
            let flight = self.refresh_flight.lock().await;
            flight.as_ref().map(|tx| tx.subscribe())
        };
        match rx {
            Some(mut rx) => match rx.recv().await {
                Ok(outcome) => outcome,
                Err(_) => Err(TellerError::NotAuthenticated),
            },
            None => match self.state.get() {
                SessionState::Authenticated { pair } => Ok(pair.access_token),
                _ => Err(TellerError::NotAuthenticated),
            },
        }
    }

    async fn exchange_credentials(&self, email: &str, password: &str) -> LoginOutcome {
        let body = json!({ "email": email, "password": password });
        let payload = self
            .gateway
            .call(LOGIN_ENDPOINT, HttpMethod::Post, None, Some(body))
            .await
            .map_err(map_login_error)?;
        decode_token_payload(&payload)
    }

    async fn exchange_refresh_token(&self, previous: &TokenPair) -> LoginOutcome {
        let body = json!({ "refresh_token": previous.refresh_token });
        let payload = self
            .gateway
            .call(REFRESH_ENDPOINT, HttpMethod::Post, None, Some(body))
            .await
            .map_err(TellerError::from)?;
        decode_token_payload(&payload)
    }
}

/// A 401-class failure on the credential exchange means the credentials
/// were rejected, not that a token expired.
fn map_login_error(err: GatewayError) -> TellerError {
    match err {
        GatewayError::AuthExpired => invalid_credentials("email or password rejected"),
        GatewayError::InvalidCredentials { reason } => invalid_credentials(reason),
        other => other.into(),
    }
}

/// Decode a token pair from an auth endpoint payload
fn decode_token_payload(payload: &Value) -> LoginOutcome {
    let access_token = payload
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed_response("missing `access_token`"))?;
    let refresh_token = payload
        .get("refresh_token")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed_response("missing `refresh_token`"))?;
    let expires_at = payload
        .get("expires_in")
        .and_then(Value::as_i64)
        .map(|secs| Utc::now() + chrono::Duration::seconds(secs));

    Ok(TokenPair::new(access_token, refresh_token, expires_at))
}
