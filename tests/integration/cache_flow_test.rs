//! Resource cache scenarios: staleness, stale-data-on-error, coalescing.

use std::sync::Arc;
use std::time::Duration;

use crate::harness::{
    accounts_payload, token_payload, transactions_payload, StubGateway, TestEnvironment,
    ACCOUNTS_ENDPOINT, REFRESH_ENDPOINT, TRANSACTIONS_ENDPOINT,
};
use teller::{GatewayError, Resource, SessionState, TellerError};

#[tokio::test]
async fn test_fresh_success_is_served_from_cache() {
    let env = TestEnvironment::with_login();
    env.gateway.script(
        ACCOUNTS_ENDPOINT,
        Ok(accounts_payload(&[("a-1", 100.0), ("a-2", -30.5)])),
    );
    env.login().await;

    env.client.accounts().load(false).await;
    env.client.accounts().load(false).await;
    assert_eq!(env.gateway.call_count(ACCOUNTS_ENDPOINT), 1);
    assert_eq!(env.client.balance().current(), 69.5);

    // A forced load goes back to the gateway even inside the window
    env.client.accounts().load(true).await;
    assert_eq!(env.gateway.call_count(ACCOUNTS_ENDPOINT), 2);
}

#[tokio::test]
async fn test_failed_refresh_keeps_stale_data_visible() {
    let env = TestEnvironment::with_login();
    env.gateway
        .script(ACCOUNTS_ENDPOINT, Ok(accounts_payload(&[("a-1", 42.0)])));
    env.gateway.script(
        ACCOUNTS_ENDPOINT,
        Err(GatewayError::Network {
            reason: "airplane mode".into(),
        }),
    );
    env.login().await;

    env.client.accounts().load(false).await;
    let entry = env.client.accounts().load(true).await;

    // Stale accounts stay on screen, flagged with the error
    assert_eq!(entry.resource.data().unwrap().len(), 1);
    assert!(matches!(
        entry.last_error,
        Some(TellerError::Network { .. })
    ));
    assert!(!entry.is_refreshing);

    // The derived total holds its last computed value
    assert_eq!(env.client.balance().current(), 42.0);
}

#[tokio::test]
async fn test_error_flag_clears_on_next_success() {
    let env = TestEnvironment::with_login();
    env.gateway
        .script(ACCOUNTS_ENDPOINT, Ok(accounts_payload(&[("a-1", 42.0)])));
    env.gateway.script(
        ACCOUNTS_ENDPOINT,
        Err(GatewayError::Server {
            status: Some(502),
            reason: "bad gateway".into(),
        }),
    );
    env.gateway
        .script(ACCOUNTS_ENDPOINT, Ok(accounts_payload(&[("a-1", 50.0)])));
    env.login().await;

    env.client.accounts().load(false).await;
    let failed = env.client.accounts().load(true).await;
    assert!(failed.last_error.is_some());

    let recovered = env.client.accounts().load(true).await;
    assert!(recovered.last_error.is_none());
    assert_eq!(env.client.balance().current(), 50.0);
}

#[tokio::test]
async fn test_unauthenticated_fetch_redirects_to_login() {
    let env = TestEnvironment::with_login();
    // The server rejects every data call even after a successful refresh
    env.gateway
        .script(ACCOUNTS_ENDPOINT, Err(GatewayError::AuthExpired));
    env.gateway
        .script(REFRESH_ENDPOINT, Ok(token_payload("access-2")));
    env.login().await;

    let entry = env.client.accounts().load(false).await;

    // The settled entry carries the error, and the session collapsed:
    // the user lands on the login screen, not an inline error
    assert!(matches!(
        entry.resource,
        Resource::Error {
            error: TellerError::NotAuthenticated
        }
    ));
    assert_eq!(env.client.session().state(), SessionState::LoggedOut);
    assert_eq!(env.client.session().current_token(), None);
    assert!(env.client.accounts().value().resource.is_loading());
}

#[tokio::test]
async fn test_concurrent_loads_share_one_fetch() {
    let gateway = StubGateway::with_latency(Duration::from_millis(50));
    gateway.script(
        crate::harness::LOGIN_ENDPOINT,
        Ok(crate::harness::token_payload("access-1")),
    );
    gateway.script(ACCOUNTS_ENDPOINT, Ok(accounts_payload(&[("a-1", 10.0)])));
    let env = TestEnvironment::new(gateway);
    env.login().await;

    let cache = Arc::clone(env.client.accounts());
    let first = tokio::spawn({
        let cache = Arc::clone(&cache);
        async move { cache.load(false).await }
    });
    let second = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.load(false).await
    });

    let (first, second) = (first.await.unwrap(), second.await.unwrap());
    assert!(first.resource.is_success());
    assert!(second.resource.is_success());
    assert_eq!(env.gateway.call_count(ACCOUNTS_ENDPOINT), 1);
}

#[tokio::test]
async fn test_shutdown_discards_in_flight_results() {
    let gateway = StubGateway::with_latency(Duration::from_millis(50));
    gateway.script(
        crate::harness::LOGIN_ENDPOINT,
        Ok(crate::harness::token_payload("access-1")),
    );
    gateway.script(ACCOUNTS_ENDPOINT, Ok(accounts_payload(&[("a-1", 10.0)])));
    let env = TestEnvironment::new(gateway);
    env.login().await;

    let cache = Arc::clone(env.client.accounts());
    let load = tokio::spawn({
        let cache = Arc::clone(&cache);
        async move { cache.load(false).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    env.client.shutdown();

    load.await.unwrap();
    assert!(env.client.accounts().value().resource.is_loading());
}

#[tokio::test]
async fn test_transactions_load_alongside_accounts() {
    let env = TestEnvironment::with_login();
    env.gateway
        .script(ACCOUNTS_ENDPOINT, Ok(accounts_payload(&[("a-1", 10.0)])));
    env.gateway.script(
        TRANSACTIONS_ENDPOINT,
        Ok(transactions_payload(&[
            ("t-1", "a-1", -4.2),
            ("t-2", "a-1", 100.0),
        ])),
    );
    env.login().await;

    env.client.refresh_all(false).await;

    let transactions = env.client.transactions().value();
    let data = transactions.resource.data().unwrap().clone();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0].account_id, "a-1");
    assert!(env.client.accounts().value().resource.is_success());
}
