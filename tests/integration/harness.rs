//! Integration test harness for the teller engine
//! Provides a scripted gateway and a fully wired client for scenario tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::sleep;

use teller::{
    ClientConfig, FlagStore, GatewayError, HttpMethod, MemoryFlagStore, RemoteGateway,
    TellerClient,
};

pub const LOGIN_ENDPOINT: &str = "/auth/login";
pub const REFRESH_ENDPOINT: &str = "/auth/refresh";
pub const ACCOUNTS_ENDPOINT: &str = "/accounts";
pub const TRANSACTIONS_ENDPOINT: &str = "/transactions";

/// Record of one observed gateway call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub endpoint: String,
    pub method: HttpMethod,
    pub token: Option<String>,
}

/// Gateway that plays back scripted responses per endpoint.
///
/// Each endpoint holds a queue of outcomes; the last outcome is repeated
/// once the queue runs dry, so steady-state behavior needs one script line.
pub struct StubGateway {
    scripts: Mutex<HashMap<String, VecDeque<Result<Value, GatewayError>>>>,
    calls: Mutex<Vec<RecordedCall>>,
    latency: Option<Duration>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            latency: None,
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::new()
        }
    }

    /// Queue an outcome for an endpoint
    pub fn script(&self, endpoint: &str, outcome: Result<Value, GatewayError>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .count()
    }

    fn next_outcome(&self, endpoint: &str) -> Result<Value, GatewayError> {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(endpoint) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Err(
                GatewayError::Network {
                    reason: "script exhausted".into(),
                },
            )),
            Some(queue) => queue.front().cloned().unwrap_or(Err(GatewayError::Network {
                reason: "script exhausted".into(),
            })),
            None => Err(GatewayError::Server {
                status: Some(404),
                reason: format!("no script for endpoint: {endpoint}"),
            }),
        }
    }
}

#[async_trait]
impl RemoteGateway for StubGateway {
    async fn call(
        &self,
        endpoint: &str,
        method: HttpMethod,
        token: Option<&str>,
        _body: Option<Value>,
    ) -> Result<Value, GatewayError> {
        self.calls.lock().unwrap().push(RecordedCall {
            endpoint: endpoint.to_string(),
            method,
            token: token.map(|t| t.to_string()),
        });

        if let Some(latency) = self.latency {
            sleep(latency).await;
        }

        self.next_outcome(endpoint)
    }
}

/// A wired engine plus handles on its scripted collaborators
pub struct TestEnvironment {
    pub client: TellerClient,
    pub gateway: Arc<StubGateway>,
    pub flags: Arc<MemoryFlagStore>,
}

impl TestEnvironment {
    pub fn new(gateway: StubGateway) -> Self {
        let gateway = Arc::new(gateway);
        let flags = Arc::new(MemoryFlagStore::new());
        let config = ClientConfig {
            api_base_url: "http://localhost".into(),
            request_timeout_secs: 5,
            staleness_secs: Some(300),
        };
        let client = TellerClient::new(
            Arc::clone(&gateway) as Arc<dyn RemoteGateway>,
            Arc::clone(&flags) as Arc<dyn FlagStore>,
            &config,
        );
        Self {
            client,
            gateway,
            flags,
        }
    }

    /// Environment with a login already scripted
    pub fn with_login() -> Self {
        let gateway = StubGateway::new();
        gateway.script(LOGIN_ENDPOINT, Ok(token_payload("access-1")));
        Self::new(gateway)
    }

    pub async fn login(&self) {
        self.client
            .session()
            .login("user@bank.test", "hunter2")
            .await
            .expect("scripted login should succeed");
    }
}

pub fn token_payload(access: &str) -> Value {
    json!({
        "access_token": access,
        "refresh_token": format!("refresh-for-{access}"),
        "expires_in": 3600,
    })
}

pub fn accounts_payload(balances: &[(&str, f64)]) -> Value {
    let accounts: Vec<Value> = balances
        .iter()
        .map(|(id, balance)| {
            json!({
                "id": id,
                "name": format!("Account {id}"),
                "currency": "EUR",
                "balance": balance,
            })
        })
        .collect();
    json!({ "accounts": accounts })
}

pub fn transactions_payload(entries: &[(&str, &str, f64)]) -> Value {
    let transactions: Vec<Value> = entries
        .iter()
        .map(|(id, account_id, amount)| {
            json!({
                "id": id,
                "account_id": account_id,
                "amount": amount,
                "description": format!("Transaction {id}"),
                "booked_at": "2026-08-28T09:00:00Z",
            })
        })
        .collect();
    json!({ "transactions": transactions })
}
