//! Session lifecycle scenarios: login, transparent refresh, forced logout.

use crate::harness::{
    accounts_payload, token_payload, StubGateway, TestEnvironment, ACCOUNTS_ENDPOINT,
    LOGIN_ENDPOINT, REFRESH_ENDPOINT,
};
use anyhow::Result;
use teller::{FlagStore, GatewayError, SessionState, TellerError};

#[tokio::test]
async fn test_login_populates_session_and_token_store() -> Result<()> {
    let env = TestEnvironment::with_login();

    let pair = env.client.session().login("user@bank.test", "hunter2").await?;
    assert_eq!(pair.access_token, "access-1");

    assert!(matches!(
        env.client.session().state(),
        SessionState::Authenticated { .. }
    ));
    assert_eq!(
        env.client.session().current_token().as_deref(),
        Some("access-1")
    );
    Ok(())
}

#[tokio::test]
async fn test_rejected_credentials_return_to_logged_out() {
    let gateway = StubGateway::new();
    gateway.script(
        LOGIN_ENDPOINT,
        Err(GatewayError::InvalidCredentials {
            reason: "bad password".into(),
        }),
    );
    let env = TestEnvironment::new(gateway);

    let err = env
        .client
        .session()
        .login("user@bank.test", "wrong")
        .await
        .unwrap_err();

    assert!(matches!(err, TellerError::InvalidCredentials { .. }));
    assert_eq!(env.client.session().state(), SessionState::LoggedOut);
    assert_eq!(env.client.session().current_token(), None);
}

#[tokio::test]
async fn test_expired_token_is_refreshed_transparently() {
    let env = TestEnvironment::with_login();
    env.gateway
        .script(ACCOUNTS_ENDPOINT, Err(GatewayError::AuthExpired));
    env.gateway.script(
        ACCOUNTS_ENDPOINT,
        Ok(accounts_payload(&[("a-1", 100.0), ("a-2", -30.5)])),
    );
    env.gateway
        .script(REFRESH_ENDPOINT, Ok(token_payload("access-2")));
    env.login().await;

    let entry = env.client.accounts().load(false).await;

    assert!(entry.resource.is_success());
    assert_eq!(env.client.balance().current(), 69.5);
    assert_eq!(env.gateway.call_count(REFRESH_ENDPOINT), 1);
    assert_eq!(env.gateway.call_count(ACCOUNTS_ENDPOINT), 2);
    assert_eq!(
        env.client.session().current_token().as_deref(),
        Some("access-2")
    );
}

#[tokio::test]
async fn test_failed_refresh_collapses_the_session() {
    let env = TestEnvironment::with_login();
    env.gateway
        .script(ACCOUNTS_ENDPOINT, Err(GatewayError::AuthExpired));
    env.gateway.script(
        REFRESH_ENDPOINT,
        Err(GatewayError::Server {
            status: Some(500),
            reason: "refresh token revoked".into(),
        }),
    );
    env.login().await;
    env.flags.set("onboarding_complete", true);

    let entry = env.client.accounts().load(false).await;

    // The session is gone; logout cleared tokens, flags, and caches
    assert_eq!(env.client.session().state(), SessionState::LoggedOut);
    assert_eq!(env.client.session().current_token(), None);
    assert!(!env.flags.get("onboarding_complete"));
    assert!(entry.resource.is_loading());
    assert_eq!(env.client.balance().current(), 0.0);
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let env = TestEnvironment::with_login();
    env.login().await;

    env.client.session().logout();
    assert_eq!(env.client.session().state(), SessionState::LoggedOut);

    // A second logout is a no-op
    env.client.session().logout();
    assert_eq!(env.client.session().state(), SessionState::LoggedOut);
}
