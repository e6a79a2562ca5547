use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The access/refresh token pair for the current session.
///
/// Tokens are opaque strings; the engine never inspects their contents.
/// The pair is owned exclusively by [`TokenStore`](crate::auth::TokenStore)
/// and every consumer reads it through the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    /// The access token used for API requests
    pub access_token: String,
    /// The refresh token used to obtain new access tokens
    pub refresh_token: String,
    /// When the access token expires (if known)
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenPair {
    /// Create a new token pair
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Check if the access token is expired.
    /// With no known expiry the token is assumed still valid.
    pub fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |exp| exp <= Utc::now())
    }

    /// Check if the access token expires within the given threshold
    pub fn expires_soon(&self, threshold_secs: i64) -> bool {
        self.expires_at
            .map_or(false, |exp| (exp - Utc::now()).num_seconds() < threshold_secs)
    }
}
