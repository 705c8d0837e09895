//! JSON file-backed account metadata storage.
//!
//! Records are kept at `accounts.json` in the platform data directory
//! (`~/.local/share/tokenwarden` on Linux) unless a path is given.
//! Every mutation is written through to disk before the call returns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use super::{AccountMetadataStore, StoreError};
use crate::model::{AccountId, AccountRecord};

const STORE_FORMAT_VERSION: u32 = 1;

/// On-disk layout of the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountStoreData {
    /// Version of the store format (for future migrations).
    version: u32,

    /// All stored records, keyed by account name.
    accounts: BTreeMap<AccountId, AccountRecord>,
}

impl Default for AccountStoreData {
    fn default() -> Self {
        Self {
            version: STORE_FORMAT_VERSION,
            accounts: BTreeMap::new(),
        }
    }
}

/// Disk-backed account metadata store.
///
/// # Thread Safety
///
/// This implementation uses interior mutability via `RwLock` and is safe to
/// share across threads via `Arc`.
pub struct FileAccountStore {
    path: PathBuf,
    data: RwLock<AccountStoreData>,
}

impl FileAccountStore {
    /// Get the default storage path for account records.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let dirs = directories::ProjectDirs::from("com", "raibid-labs", "tokenwarden")
            .ok_or(StoreError::DataDirUnavailable)?;

        Ok(dirs.data_dir().join("accounts.json"))
    }

    /// Load the store from the default location.
    pub fn load() -> Result<Self, StoreError> {
        Self::load_from_path(Self::default_path()?)
    }

    /// Load the store from a specific path.
    ///
    /// Creates parent directories if they don't exist. A missing file is an
    /// empty store; it is created on the first write.
    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            AccountStoreData::default()
        };

        tracing::debug!(path = ?path, "loaded account store");

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Get the storage path for this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply a mutation and persist the result.
    ///
    /// The mutation runs on a copy that replaces the in-memory state only
    /// once it is on disk, so a failed write leaves both sides unchanged.
    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut AccountStoreData) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut data = self.data.write().map_err(|e| StoreError::LockError {
            message: format!("write lock poisoned: {}", e),
        })?;

        let mut next = data.clone();
        let value = apply(&mut next)?;
        self.persist(&next)?;
        *data = next;

        Ok(value)
    }

    /// Write `data` beside the store file, then rename it into place.
    fn persist(&self, data: &AccountStoreData) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(data)?;
        let staging = self.path.with_extension("json.tmp");

        let written = fs::write(&staging, contents).and_then(|()| fs::rename(&staging, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&staging);
            tracing::warn!(path = ?self.path, error = %e, "failed to persist account store");
            return Err(e.into());
        }

        Ok(())
    }

    fn update_record(
        &self,
        account: &AccountId,
        apply: impl FnOnce(&mut AccountRecord),
    ) -> Result<(), StoreError> {
        self.mutate(|data| {
            let record = data
                .accounts
                .get_mut(account)
                .ok_or_else(|| StoreError::not_found(account))?;
            apply(record);
            Ok(())
        })
    }
}

impl std::fmt::Debug for FileAccountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAccountStore")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl AccountMetadataStore for FileAccountStore {
    async fn get(&self, account: &AccountId) -> Result<AccountRecord, StoreError> {
        let data = self.data.read().map_err(|e| StoreError::LockError {
            message: format!("read lock poisoned: {}", e),
        })?;

        data.accounts
            .get(account)
            .cloned()
            .ok_or_else(|| StoreError::not_found(account))
    }

    async fn set_instance_server_uri(
        &self,
        account: &AccountId,
        uri: &str,
    ) -> Result<(), StoreError> {
        self.update_record(account, |record| {
            record.instance_server_uri = uri.to_string();
        })
    }

    async fn set_access_token(
        &self,
        account: &AccountId,
        encrypted_token: &str,
    ) -> Result<(), StoreError> {
        self.update_record(account, |record| {
            record.access_token = Some(encrypted_token.to_string());
        })
    }

    async fn put(&self, account: &AccountId, record: AccountRecord) -> Result<(), StoreError> {
        self.mutate(|data| {
            data.accounts.insert(account.clone(), record);
            Ok(())
        })
    }

    async fn remove(&self, account: &AccountId) -> Result<(), StoreError> {
        self.mutate(|data| {
            data.accounts.remove(account);
            Ok(())
        })
    }

    async fn list(&self) -> Result<Vec<AccountId>, StoreError> {
        let data = self.data.read().map_err(|e| StoreError::LockError {
            message: format!("read lock poisoned: {}", e),
        })?;

        Ok(data.accounts.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_record() -> AccountRecord {
        AccountRecord {
            account_type: "com.example.auth".to_string(),
            username: "jane@example.com".to_string(),
            user_id: "005xx".to_string(),
            org_id: "00Dxx".to_string(),
            client_id: "client-123".to_string(),
            login_server_uri: "https://login.example.com".to_string(),
            instance_server_uri: "https://na1.example.com".to_string(),
            encrypted_refresh_secret: "ciphertext".to_string(),
            access_token: None,
        }
    }

    fn test_store() -> (FileAccountStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("accounts.json");
        let store = FileAccountStore::load_from_path(path).unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_put_and_get_record() {
        let (store, _temp) = test_store();
        let account = AccountId::new("jane");

        store.put(&account, test_record()).await.unwrap();

        let retrieved = store.get(&account).await.unwrap();
        assert_eq!(retrieved, test_record());
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_store() {
        let (store, _temp) = test_store();
        assert!(!store.path().exists());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_across_loads() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("accounts.json");
        let account = AccountId::new("jane");

        {
            let store = FileAccountStore::load_from_path(path.clone()).unwrap();
            store.put(&account, test_record()).await.unwrap();
            store
                .set_instance_server_uri(&account, "https://na2.example.com")
                .await
                .unwrap();
            store
                .set_access_token(&account, "encrypted-token")
                .await
                .unwrap();
        }

        {
            let store = FileAccountStore::load_from_path(path).unwrap();
            let record = store.get(&account).await.unwrap();
            assert_eq!(record.instance_server_uri, "https://na2.example.com");
            assert_eq!(record.access_token.as_deref(), Some("encrypted-token"));
        }
    }

    #[tokio::test]
    async fn test_update_unknown_account() {
        let (store, _temp) = test_store();

        let result = store
            .set_instance_server_uri(&AccountId::new("nobody"), "https://na2.example.com")
            .await;

        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_remove_record() {
        let (store, _temp) = test_store();
        let account = AccountId::new("jane");

        store.put(&account, test_record()).await.unwrap();
        store.remove(&account).await.unwrap();

        assert!(matches!(
            store.get(&account).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_store_unchanged() {
        let (store, _temp) = test_store();
        let account = AccountId::new("jane");
        store.put(&account, test_record()).await.unwrap();

        // A directory in place of the file makes the rename fail.
        fs::remove_file(store.path()).unwrap();
        fs::create_dir(store.path()).unwrap();

        let result = store
            .set_instance_server_uri(&account, "https://na2.example.com")
            .await;
        assert!(matches!(result, Err(StoreError::Io(_))));

        let record = store.get(&account).await.unwrap();
        assert_eq!(record.instance_server_uri, "https://na1.example.com");
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_write_leaves_no_staging_file() {
        let (store, _temp) = test_store();
        store
            .put(&AccountId::new("jane"), test_record())
            .await
            .unwrap();

        assert!(store.path().is_file());
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("accounts.json");
        fs::write(&path, "{ not json").unwrap();

        let result = FileAccountStore::load_from_path(path);
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
