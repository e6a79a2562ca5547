//! Engine composition root.
//!
//! `TellerClient` owns the session, the resource caches, the balance
//! aggregator, and the locale store, and wires the logout signal so a
//! collapsing session leaves no user data behind.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::aggregate::BalanceAggregator;
use crate::auth::AuthSession;
use crate::cache::{ResourceCache, ResourceFetcher};
use crate::config::ClientConfig;
use crate::error::TellerResult;
use crate::flags::FlagStore;
use crate::gateway::{HttpGateway, HttpMethod, RemoteGateway};
use crate::locale::LocaleStore;
use crate::model::{decode_accounts, decode_transactions, Account, Transaction};
use crate::request::SessionGatedRequest;

const ACCOUNTS_ENDPOINT: &str = "/accounts";
const TRANSACTIONS_ENDPOINT: &str = "/transactions";

struct AccountsFetcher {
    request: Arc<SessionGatedRequest>,
}

#[async_trait]
impl ResourceFetcher<Vec<Account>> for AccountsFetcher {
    async fn fetch(&self) -> TellerResult<Vec<Account>> {
        let payload = self
            .request
            .call(ACCOUNTS_ENDPOINT, HttpMethod::Get, None)
            .await?;
        decode_accounts(payload)
    }
}

struct TransactionsFetcher {
    request: Arc<SessionGatedRequest>,
}

#[async_trait]
impl ResourceFetcher<Vec<Transaction>> for TransactionsFetcher {
    async fn fetch(&self) -> TellerResult<Vec<Transaction>> {
        let payload = self
            .request
            .call(TRANSACTIONS_ENDPOINT, HttpMethod::Get, None)
            .await?;
        decode_transactions(payload)
    }
}

/// The assembled engine
pub struct TellerClient {
    session: Arc<AuthSession>,
    accounts: Arc<ResourceCache<Vec<Account>>>,
    transactions: Arc<ResourceCache<Vec<Transaction>>>,
    balance: Arc<BalanceAggregator>,
    locale: LocaleStore,
}

impl TellerClient {
    /// Assemble the engine over an injected gateway and flag store
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        flags: Arc<dyn FlagStore>,
        config: &ClientConfig,
    ) -> Self {
        let session = Arc::new(AuthSession::new(Arc::clone(&gateway), flags));
        let request = Arc::new(SessionGatedRequest::new(Arc::clone(&session), gateway));

        let accounts = Arc::new(ResourceCache::new(
            "accounts",
            Arc::new(AccountsFetcher {
                request: Arc::clone(&request),
            }) as Arc<dyn ResourceFetcher<Vec<Account>>>,
            config.staleness(),
        ));
        let transactions = Arc::new(ResourceCache::new(
            "transactions",
            Arc::new(TransactionsFetcher { request }) as Arc<dyn ResourceFetcher<Vec<Transaction>>>,
            config.staleness(),
        ));
        let balance = Arc::new(BalanceAggregator::new());

        // Every accounts publication feeds the derived total
        {
            let balance = Arc::clone(&balance);
            accounts.subscribe(move |entry| balance.observe(entry));
        }

        // A fetch settling on NotAuthenticated means the server rejects a
        // token the session still considers valid; force the logout so the
        // user is redirected to login instead of seeing an inline error
        {
            let session = Arc::clone(&session);
            accounts.on_auth_failure(move || session.logout());
        }
        {
            let session = Arc::clone(&session);
            transactions.on_auth_failure(move || session.logout());
        }

        // Logout tears user data down; the locale survives it
        {
            let accounts = Arc::clone(&accounts);
            let transactions = Arc::clone(&transactions);
            let balance = Arc::clone(&balance);
            session.on_logout(move || {
                info!("Clearing cached resources after logout");
                accounts.clear();
                transactions.clear();
                balance.reset();
            });
        }

        Self {
            session,
            accounts,
            transactions,
            balance,
            locale: LocaleStore::default(),
        }
    }

    /// Assemble the engine over the production HTTP gateway
    pub fn with_http_gateway(flags: Arc<dyn FlagStore>, config: &ClientConfig) -> Self {
        Self::new(Arc::new(HttpGateway::new(config)), flags, config)
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    pub fn accounts(&self) -> &Arc<ResourceCache<Vec<Account>>> {
        &self.accounts
    }

    pub fn transactions(&self) -> &Arc<ResourceCache<Vec<Transaction>>> {
        &self.transactions
    }

    pub fn balance(&self) -> &Arc<BalanceAggregator> {
        &self.balance
    }

    pub fn locale(&self) -> &LocaleStore {
        &self.locale
    }

    /// Load both collections concurrently
    pub async fn refresh_all(&self, force: bool) {
        futures::join!(self.accounts.load(force), self.transactions.load(force));
    }

    /// Mark the caches dead so in-flight fetch results are discarded
    pub fn shutdown(&self) {
        info!("Shutting down engine");
        self.accounts.shutdown();
        self.transactions.shutdown();
    }
}
