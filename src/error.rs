use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type used throughout the engine
pub type TellerResult<T> = Result<T, TellerError>;

/// Structured error type for everything the engine surfaces to observers.
///
/// Errors are stored inside cache entries and broadcast to joiners of
/// in-flight operations, so the type is `Clone` and serializable.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TellerError {
    /// No valid session; the UI should redirect to login
    #[error("not authenticated")]
    NotAuthenticated,

    /// The login credentials were rejected; user-correctable
    #[error("invalid credentials: {reason}")]
    InvalidCredentials { reason: String },

    /// Transient network failure; retryable by user action, never automatically
    #[error("network error: {reason}")]
    Network { reason: String },

    /// Backend failure, surfaced verbatim
    #[error("server error{}: {reason}", fmt_status(.status))]
    Server { status: Option<u16>, reason: String },

    /// Response payload violated the expected shape.
    /// Displayed to users as a server failure but logged distinctly.
    #[error("malformed response: {reason}")]
    MalformedResponse { reason: String },
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" ({code})"),
        None => String::new(),
    }
}

impl TellerError {
    /// Whether this error should force the session out (redirect to login)
    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, TellerError::NotAuthenticated)
    }

    /// Whether this error is transient from the user's point of view
    pub fn is_transient(&self) -> bool {
        matches!(self, TellerError::Network { .. })
    }

    /// The message a screen should show for this error.
    /// Malformed payloads read as a server problem to the user.
    pub fn user_message(&self) -> String {
        match self {
            TellerError::MalformedResponse { .. } => "server error: unexpected response".to_string(),
            other => other.to_string(),
        }
    }
}

/// Create a new invalid credentials error
pub fn invalid_credentials(reason: impl fmt::Display) -> TellerError {
    TellerError::InvalidCredentials {
        reason: reason.to_string(),
    }
}

/// Create a new network error
pub fn network_error(reason: impl fmt::Display) -> TellerError {
    TellerError::Network {
        reason: reason.to_string(),
    }
}

/// Create a new server error
pub fn server_error(status: Option<u16>, reason: impl fmt::Display) -> TellerError {
    TellerError::Server {
        status,
        reason: reason.to_string(),
    }
}

/// Create a new malformed response error
pub fn malformed_response(reason: impl fmt::Display) -> TellerError {
    TellerError::MalformedResponse {
        reason: reason.to_string(),
    }
}
