//! In-memory account metadata storage.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{AccountMetadataStore, StoreError};
use crate::model::{AccountId, AccountRecord};

/// In-memory account store for testing and embedding.
///
/// This store is not persistent; data is lost when the process exits.
///
/// # Thread Safety
///
/// This implementation uses interior mutability via `RwLock` and is
/// safe to share across threads.
pub struct MemoryAccountStore {
    data: RwLock<BTreeMap<AccountId, AccountRecord>>,
}

impl MemoryAccountStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a memory store with initial records.
    pub fn with_records(records: impl IntoIterator<Item = (AccountId, AccountRecord)>) -> Self {
        Self {
            data: RwLock::new(records.into_iter().collect()),
        }
    }

    fn update(
        &self,
        account: &AccountId,
        apply: impl FnOnce(&mut AccountRecord),
    ) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(|e| StoreError::LockError {
            message: format!("lock poisoned: {}", e),
        })?;
        let record = data
            .get_mut(account)
            .ok_or_else(|| StoreError::not_found(account))?;
        apply(record);
        Ok(())
    }
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryAccountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.data.read().map(|d| d.len()).unwrap_or(0);
        f.debug_struct("MemoryAccountStore")
            .field("accounts_count", &count)
            .finish()
    }
}

#[async_trait]
impl AccountMetadataStore for MemoryAccountStore {
    async fn get(&self, account: &AccountId) -> Result<AccountRecord, StoreError> {
        let data = self.data.read().map_err(|e| StoreError::LockError {
            message: format!("lock poisoned: {}", e),
        })?;
        data.get(account)
            .cloned()
            .ok_or_else(|| StoreError::not_found(account))
    }

    async fn set_instance_server_uri(
        &self,
        account: &AccountId,
        uri: &str,
    ) -> Result<(), StoreError> {
        self.update(account, |record| {
            record.instance_server_uri = uri.to_string();
        })
    }

    async fn set_access_token(
        &self,
        account: &AccountId,
        encrypted_token: &str,
    ) -> Result<(), StoreError> {
        self.update(account, |record| {
            record.access_token = Some(encrypted_token.to_string());
        })
    }

    async fn put(&self, account: &AccountId, record: AccountRecord) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(|e| StoreError::LockError {
            message: format!("lock poisoned: {}", e),
        })?;
        data.insert(account.clone(), record);
        Ok(())
    }

    async fn remove(&self, account: &AccountId) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(|e| StoreError::LockError {
            message: format!("lock poisoned: {}", e),
        })?;
        data.remove(account);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AccountId>, StoreError> {
        let data = self.data.read().map_err(|e| StoreError::LockError {
            message: format!("lock poisoned: {}", e),
        })?;
        Ok(data.keys().cloned().collect())
    }
}
