//! Session-gated gateway calls.
//!
//! Every authorized API call flows through here: the current token is taken
//! from the session, and an `AuthExpired` answer triggers one transparent
//! refresh followed by exactly one retry. A second rejection means the
//! session is gone, which bounds the engine to a single refresh-and-retry
//! cycle per logical request even with a permanently invalid refresh token.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::AuthSession;
use crate::error::{TellerError, TellerResult};
use crate::gateway::{GatewayError, HttpMethod, RemoteGateway};

/// Wraps gateway calls with the session's token lifecycle
pub struct SessionGatedRequest {
    session: Arc<AuthSession>,
    gateway: Arc<dyn RemoteGateway>,
}

impl SessionGatedRequest {
    pub fn new(session: Arc<AuthSession>, gateway: Arc<dyn RemoteGateway>) -> Self {
        Self { session, gateway }
    }

    /// Issue an authorized call, refreshing and retrying at most once
    pub async fn call(
        &self,
        endpoint: &str,
        method: HttpMethod,
        body: Option<Value>,
    ) -> TellerResult<Value> {
        let token = self.session.ensure_valid_token().await?;

        match self
            .gateway
            .call(endpoint, method, Some(&token), body.clone())
            .await
        {
            Ok(payload) => Ok(payload),
            Err(GatewayError::AuthExpired) => {
                debug!(endpoint = %endpoint, "Token rejected, refreshing once and retrying");
                let token = self
                    .session
                    .force_refresh()
                    .await
                    .map_err(|_| TellerError::NotAuthenticated)?;

                self.gateway
                    .call(endpoint, method, Some(&token), body)
                    .await
                    .map_err(|err| {
                        warn!(endpoint = %endpoint, error = %err, "Retry after refresh failed");
                        TellerError::from(err)
                    })
            }
            Err(other) => Err(other.into()),
        }
    }
}
