//! API request/response types for the daemon JSON-RPC interface.

use serde::{Deserialize, Serialize};
use tokenwarden_core::{AccountId, AccountRecord, LoginRequest};

/// Non-secret view of a stored account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    /// Account name the record is keyed by
    pub account: String,
    /// Human-readable user name
    pub username: String,
    /// Login (authorization) server
    pub login_server_uri: String,
    /// Instance the account was last served from
    pub instance_server_uri: String,
    /// Whether an access token has been stored by a previous refresh
    pub has_access_token: bool,
}

impl AccountSummary {
    pub fn from_record(account: &AccountId, record: &AccountRecord) -> Self {
        Self {
            account: account.to_string(),
            username: record.username.clone(),
            login_server_uri: record.login_server_uri.clone(),
            instance_server_uri: record.instance_server_uri.clone(),
            has_access_token: record.access_token.is_some(),
        }
    }
}

/// Response containing a list of accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListAccountsResponse {
    /// Stored accounts, ordered by name
    pub accounts: Vec<AccountSummary>,
}

/// Login requests raised since the last poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingLoginsResponse {
    pub requests: Vec<LoginRequest>,
}
