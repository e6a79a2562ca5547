//! Value records fetched from the banking API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{malformed_response, TellerResult};

/// A bank account as reported by the remote API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account id
    pub id: String,
    /// Display name
    pub name: String,
    /// ISO 4217 currency code
    pub currency: String,
    /// Current balance in major units
    pub balance: f64,
}

/// A booked transaction.
///
/// `account_id` is a weak reference: the relation is resolved by lookup,
/// never by ownership, so removing an account does not cascade here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction id
    pub id: String,
    /// Id of the owning account
    pub account_id: String,
    /// Signed amount in major units
    pub amount: f64,
    /// Free-form description
    pub description: String,
    /// When the transaction was booked
    pub booked_at: DateTime<Utc>,
}

/// Decode the accounts collection from a gateway payload
pub fn decode_accounts(payload: Value) -> TellerResult<Vec<Account>> {
    let items = payload
        .get("accounts")
        .cloned()
        .ok_or_else(|| malformed_response("missing `accounts` field"))?;
    serde_json::from_value(items).map_err(malformed_response)
}

/// Decode the transactions collection from a gateway payload
pub fn decode_transactions(payload: Value) -> TellerResult<Vec<Transaction>> {
    let items = payload
        .get("transactions")
        .cloned()
        .ok_or_else(|| malformed_response("missing `transactions` field"))?;
    serde_json::from_value(items).map_err(malformed_response)
}
