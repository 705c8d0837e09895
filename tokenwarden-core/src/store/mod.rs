//! Account metadata storage abstraction.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`AccountMetadataStore`] - Trait for account metadata backends
//! - [`MemoryAccountStore`] - In-memory implementation for testing and embedding
//! - [`FileAccountStore`] - JSON file implementation under the platform data directory
//!
//! # Write Semantics
//!
//! The two writes the refresh path performs (`set_instance_server_uri` and
//! `set_access_token`) are independent and last-writer-wins. No transaction
//! spans both.
//!
//! # Example
//!
//! ```rust,ignore
//! use tokenwarden_core::store::{AccountMetadataStore, MemoryAccountStore};
//! use tokenwarden_core::AccountId;
//!
//! let store = MemoryAccountStore::new();
//! store.put(&AccountId::new("jane"), record).await?;
//! store.set_instance_server_uri(&AccountId::new("jane"), "https://na2.example.com").await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::model::{AccountId, AccountRecord};

mod file;
mod memory;

pub use file::FileAccountStore;
pub use memory::MemoryAccountStore;

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the buffer is wiped when the secret is dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Consume the secret and return the inner value.
    pub fn into_inner(mut self) -> String {
        std::mem::take(&mut self.0)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Error type for account store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists for the account.
    #[error("account {account} not found")]
    NotFound { account: String },

    /// I/O error reading or writing the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Platform data directory not available.
    #[error("data directory not available")]
    DataDirUnavailable,

    /// Internal lock poisoning error.
    #[error("internal lock error: {message}")]
    LockError { message: String },
}

impl StoreError {
    pub(crate) fn not_found(account: &AccountId) -> Self {
        Self::NotFound {
            account: account.to_string(),
        }
    }
}

/// Persisted account metadata keyed by account.
///
/// Implementations include:
/// - [`MemoryAccountStore`] - In-memory storage for testing
/// - [`FileAccountStore`] - JSON file with write-through persistence
#[async_trait]
pub trait AccountMetadataStore: Send + Sync {
    /// Load the full record for an account.
    ///
    /// Returns [`StoreError::NotFound`] if the account is unknown.
    async fn get(&self, account: &AccountId) -> Result<AccountRecord, StoreError>;

    /// Replace the stored instance URI.
    async fn set_instance_server_uri(
        &self,
        account: &AccountId,
        uri: &str,
    ) -> Result<(), StoreError>;

    /// Replace the stored (already encrypted) access token.
    async fn set_access_token(
        &self,
        account: &AccountId,
        encrypted_token: &str,
    ) -> Result<(), StoreError>;

    /// Insert or replace the whole record.
    ///
    /// Used by enrollment and by a completed interactive login.
    async fn put(&self, account: &AccountId, record: AccountRecord) -> Result<(), StoreError>;

    /// Remove an account.
    ///
    /// Returns `Ok(())` even if the account didn't exist.
    async fn remove(&self, account: &AccountId) -> Result<(), StoreError>;

    /// List all stored accounts in name order.
    async fn list(&self) -> Result<Vec<AccountId>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_redacted() {
        let secret = Secret::new("super-secret");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_secret_display_redacted() {
        let secret = Secret::new("super-secret");
        let display = format!("{}", secret);
        assert!(!display.contains("super-secret"));
        assert!(display.contains("REDACTED"));
    }

    #[test]
    fn test_secret_serializes_as_plain_string() {
        let secret = Secret::new("token-value");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"token-value\"");
        assert_eq!(secret.into_inner(), "token-value");
    }
}
