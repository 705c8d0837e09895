//! Domain model types for Tokenwarden.
//!
//! This module defines the core types used throughout Tokenwarden:
//! - [`AccountId`] - Identifier for a stored account
//! - [`AccountRecord`] - Persisted metadata and encrypted secrets for one identity

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a stored account.
///
/// This is the account name the host registered the identity under,
/// usually the username.
///
/// # Examples
///
/// ```
/// use tokenwarden_core::AccountId;
///
/// let account = AccountId::new("jane@example.com");
/// assert_eq!(account.as_str(), "jane@example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create a new account ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the account ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Persisted metadata for one authenticated identity.
///
/// Both secret fields hold [`codec`](crate::codec) output, never plaintext.
/// The refresh coordinator only ever writes `instance_server_uri` and
/// `access_token`; everything else is replaced wholesale when a new login
/// completes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Authenticator type the account was registered under.
    pub account_type: String,

    /// Login name of the user.
    pub username: String,

    /// Provider-assigned user identifier.
    pub user_id: String,

    /// Provider-assigned organization identifier.
    pub org_id: String,

    /// OAuth client the refresh secret was issued to.
    pub client_id: String,

    /// Authorization server used for token exchanges.
    pub login_server_uri: String,

    /// Instance the account's API calls go to. Can move independently of
    /// the login server, e.g. after an org migration.
    pub instance_server_uri: String,

    /// Encrypted long-lived refresh secret.
    pub encrypted_refresh_secret: String,

    /// Encrypted access token from the most recent refresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl fmt::Debug for AccountRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountRecord")
            .field("account_type", &self.account_type)
            .field("username", &self.username)
            .field("user_id", &self.user_id)
            .field("org_id", &self.org_id)
            .field("client_id", &self.client_id)
            .field("login_server_uri", &self.login_server_uri)
            .field("instance_server_uri", &self.instance_server_uri)
            .field("encrypted_refresh_secret", &"[ENCRYPTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[ENCRYPTED]"),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> AccountRecord {
        AccountRecord {
            account_type: "com.example.auth".to_string(),
            username: "jane@example.com".to_string(),
            user_id: "005xx".to_string(),
            org_id: "00Dxx".to_string(),
            client_id: "client-123".to_string(),
            login_server_uri: "https://login.example.com".to_string(),
            instance_server_uri: "https://na1.example.com".to_string(),
            encrypted_refresh_secret: "c2VjcmV0LWNpcGhlcnRleHQ=".to_string(),
            access_token: Some("dG9rZW4tY2lwaGVydGV4dA==".to_string()),
        }
    }

    #[test]
    fn test_account_id_display() {
        let id = AccountId::from("jane@example.com");
        assert_eq!(id.to_string(), "jane@example.com");
    }

    #[test]
    fn test_record_debug_hides_ciphertexts() {
        let debug = format!("{:?}", sample_record());
        assert!(!debug.contains("c2VjcmV0LWNpcGhlcnRleHQ="));
        assert!(!debug.contains("dG9rZW4tY2lwaGVydGV4dA=="));
        assert!(debug.contains("https://na1.example.com"));
    }

    #[test]
    fn test_record_without_access_token_deserializes() {
        let mut record = sample_record();
        record.access_token = None;

        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("access_token"));

        let parsed: AccountRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
