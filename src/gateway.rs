//! Remote gateway seam.
//!
//! The engine never parses transport details; everything it needs to know
//! about a failed call is captured in [`GatewayError`], and everything it
//! needs from a successful one is the decoded JSON value.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ClientConfig;

/// HTTP method for gateway calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Typed failures reported by the gateway
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// The access token was rejected; a refresh may recover
    #[error("access token expired or rejected")]
    AuthExpired,

    /// Credentials were rejected during a credential exchange
    #[error("credentials rejected: {reason}")]
    InvalidCredentials { reason: String },

    /// The remote host was unreachable or the request timed out
    #[error("network failure: {reason}")]
    Network { reason: String },

    /// The backend reported a failure
    #[error("server failure ({status:?}): {reason}")]
    Server { status: Option<u16>, reason: String },

    /// The response body could not be decoded as JSON
    #[error("malformed response body: {reason}")]
    Malformed { reason: String },
}

impl From<GatewayError> for crate::error::TellerError {
    fn from(err: GatewayError) -> Self {
        use crate::error::TellerError;
        match err {
            // An expired token that survived the one refresh-and-retry
            // cycle means the session is gone
            GatewayError::AuthExpired => TellerError::NotAuthenticated,
            GatewayError::InvalidCredentials { reason } => {
                TellerError::InvalidCredentials { reason }
            }
            GatewayError::Network { reason } => TellerError::Network { reason },
            GatewayError::Server { status, reason } => TellerError::Server { status, reason },
            GatewayError::Malformed { reason } => TellerError::MalformedResponse { reason },
        }
    }
}

/// Performs network calls given a token.
///
/// Implemented over reqwest in production and by scripted mocks in tests.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Issue a call and return the decoded JSON payload
    async fn call(
        &self,
        endpoint: &str,
        method: HttpMethod,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<Value, GatewayError>;
}

/// Production gateway backed by reqwest
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    /// Create a gateway from the client configuration
    pub fn new(config: &ClientConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a gateway with a preconfigured reqwest client
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn map_transport_error(err: reqwest::Error) -> GatewayError {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            GatewayError::Network {
                reason: err.to_string(),
            }
        } else {
            GatewayError::Server {
                status: err.status().map(|s| s.as_u16()),
                reason: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn call(
        &self,
        endpoint: &str,
        method: HttpMethod,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<Value, GatewayError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(url = %url, method = ?method, authorized = token.is_some(), "Issuing gateway call");

        let mut request = match method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
        };

        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(Self::map_transport_error)?;
        let status = response.status();

        if status.as_u16() == 401 {
            warn!(url = %url, "Gateway call rejected: token expired");
            return Err(GatewayError::AuthExpired);
        }
        if status.as_u16() == 403 {
            let reason = response.text().await.unwrap_or_default();
            warn!(url = %url, "Gateway call rejected: credentials refused");
            return Err(GatewayError::InvalidCredentials { reason });
        }
        if status.is_server_error() || status.is_client_error() {
            let reason = response.text().await.unwrap_or_default();
            warn!(url = %url, status = status.as_u16(), "Gateway call failed");
            return Err(GatewayError::Server {
                status: Some(status.as_u16()),
                reason,
            });
        }

        let text = response.text().await.map_err(Self::map_transport_error)?;
        serde_json::from_str(&text).map_err(|e| GatewayError::Malformed {
            reason: e.to_string(),
        })
    }
}
