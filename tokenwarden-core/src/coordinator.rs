//! Refresh coordination.
//!
//! [`RefreshCoordinator`] ties the codec, the token endpoint, the metadata
//! store and the login trigger together and turns every failure into one of
//! the four [`RefreshOutcome`] variants. Nothing in here panics or retries.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokenwarden_core::{
//!     AccountId, FileAccountStore, OAuthTokenEndpoint, PasscodeKey,
//!     QueuedLoginTrigger, RefreshCoordinator, RefreshOutcome,
//! };
//!
//! let coordinator = RefreshCoordinator::new(
//!     Arc::new(FileAccountStore::load()?),
//!     Arc::new(OAuthTokenEndpoint::new()),
//!     Arc::new(QueuedLoginTrigger::new()),
//! );
//!
//! match coordinator.refresh_token(&AccountId::new("jane"), &key).await {
//!     RefreshOutcome::Refreshed { access_token, .. } => use_token(access_token),
//!     RefreshOutcome::InteractiveLoginRequired => show_login(),
//!     RefreshOutcome::Failed { .. } | RefreshOutcome::Unavailable => retry_later(),
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::codec::{self, PasscodeKey};
use crate::endpoint::{EndpointError, TokenEndpoint, TokenExchangeRequest, TokenExchangeResult};
use crate::login::{LoginFlowTrigger, LoginOptions};
use crate::model::{AccountId, AccountRecord};
use crate::store::{AccountMetadataStore, Secret, StoreError};

/// `Failed` code when the stored refresh secret cannot be decrypted.
pub const DECRYPTION_FAILURE: &str = "decryption_failure";

/// `Failed` code when a fresh access token cannot be sealed for storage.
pub const ENCRYPTION_FAILURE: &str = "encryption_failure";

/// `Failed` code when the account has no stored record.
pub const ACCOUNT_NOT_FOUND: &str = "account_not_found";

/// `Failed` code when the metadata store cannot be read or written.
pub const STORE_FAILURE: &str = "store_failure";

/// Result of one refresh request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// A new access token was issued and stored.
    Refreshed {
        account_name: String,
        account_type: String,
        /// Plaintext token for immediate use.
        access_token: Secret,
        login_server_uri: String,
        /// Server-confirmed instance URI.
        instance_server_uri: String,
        client_id: String,
        username: String,
        user_id: String,
        org_id: String,
    },

    /// The refresh secret was rejected; a new interactive login must complete.
    InteractiveLoginRequired,

    /// Non-retryable failure, with the provider's code and description when
    /// the provider was the one refusing.
    Failed {
        error_code: String,
        error_description: String,
    },

    /// Network trouble; try again later.
    Unavailable,
}

impl RefreshOutcome {
    fn failed(error_code: &str, error_description: impl Into<String>) -> Self {
        Self::Failed {
            error_code: error_code.to_string(),
            error_description: error_description.into(),
        }
    }

    /// Whether a usable access token came back.
    pub fn is_refreshed(&self) -> bool {
        matches!(self, Self::Refreshed { .. })
    }
}

/// Orchestrates a refresh for one account at a time.
///
/// Stateless apart from its collaborators, so one instance can be shared
/// across tasks. Concurrent refreshes of the same account are not
/// serialized here; the store's last write wins.
pub struct RefreshCoordinator {
    store: Arc<dyn AccountMetadataStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    login: Arc<dyn LoginFlowTrigger>,
}

impl RefreshCoordinator {
    /// Create a coordinator over the given collaborators.
    pub fn new(
        store: Arc<dyn AccountMetadataStore>,
        endpoint: Arc<dyn TokenEndpoint>,
        login: Arc<dyn LoginFlowTrigger>,
    ) -> Self {
        Self {
            store,
            endpoint,
            login,
        }
    }

    /// Refresh the access token of `account`.
    ///
    /// Equivalent to [`refresh_token_with_options`](Self::refresh_token_with_options)
    /// with an empty options payload.
    pub async fn refresh_token(&self, account: &AccountId, key: &PasscodeKey) -> RefreshOutcome {
        self.refresh_token_with_options(account, key, &LoginOptions::new())
            .await
    }

    /// Refresh the access token of `account`, forwarding `options` to the
    /// login trigger if an interactive login turns out to be necessary.
    ///
    /// Only a successful exchange writes to the store: the instance URI (when
    /// the server reports a different one) and the encrypted access token.
    pub async fn refresh_token_with_options(
        &self,
        account: &AccountId,
        key: &PasscodeKey,
        options: &LoginOptions,
    ) -> RefreshOutcome {
        tracing::info!(account = %account, "refreshing access token");

        let record = match self.store.get(account).await {
            Ok(record) => record,
            Err(StoreError::NotFound { .. }) => {
                tracing::warn!(account = %account, "no stored record for account");
                return RefreshOutcome::failed(
                    ACCOUNT_NOT_FOUND,
                    format!("account {} not found", account),
                );
            }
            Err(e) => {
                tracing::error!(account = %account, error = %e, "failed to read account record");
                return RefreshOutcome::failed(STORE_FAILURE, e.to_string());
            }
        };

        let refresh_secret = match codec::decrypt(&record.encrypted_refresh_secret, key) {
            Ok(secret) => secret,
            Err(e) => {
                tracing::warn!(account = %account, error = %e, "cannot decrypt refresh secret");
                return RefreshOutcome::failed(DECRYPTION_FAILURE, e.to_string());
            }
        };

        let request = TokenExchangeRequest {
            endpoint_uri: record.login_server_uri.clone(),
            client_id: record.client_id.clone(),
            refresh_secret,
        };

        match self.endpoint.refresh(&request).await {
            TokenExchangeResult::Success {
                access_token,
                instance_server_uri,
            } => {
                self.apply_refresh(account, record, key, access_token, instance_server_uri)
                    .await
            }
            TokenExchangeResult::ProviderError {
                refresh_secret_invalid: true,
                error_code,
                ..
            } => {
                tracing::info!(
                    account = %account,
                    error_code = %error_code,
                    "refresh secret rejected, interactive login required"
                );
                self.login.request_login(account, options).await;
                RefreshOutcome::InteractiveLoginRequired
            }
            TokenExchangeResult::ProviderError {
                error_code,
                error_description,
                ..
            } => {
                tracing::warn!(
                    account = %account,
                    error_code = %error_code,
                    error_description = %error_description,
                    "provider refused refresh"
                );
                RefreshOutcome::Failed {
                    error_code,
                    error_description,
                }
            }
            TokenExchangeResult::TransportError { cause } => {
                match &cause {
                    EndpointError::MalformedEndpoint { .. } => {
                        tracing::error!(account = %account, error = %cause, "bad login server configuration");
                    }
                    _ => {
                        tracing::warn!(account = %account, error = %cause, "token endpoint unavailable");
                    }
                }
                RefreshOutcome::Unavailable
            }
        }
    }

    /// Persist a successful exchange and build the outcome.
    async fn apply_refresh(
        &self,
        account: &AccountId,
        mut record: AccountRecord,
        key: &PasscodeKey,
        access_token: Secret,
        instance_server_uri: String,
    ) -> RefreshOutcome {
        // Org migrations and custom domains move the instance under us.
        if !same_instance(&record.instance_server_uri, &instance_server_uri) {
            tracing::info!(
                account = %account,
                old = %record.instance_server_uri,
                new = %instance_server_uri,
                "instance server changed"
            );
            if let Err(e) = self
                .store
                .set_instance_server_uri(account, &instance_server_uri)
                .await
            {
                tracing::error!(account = %account, error = %e, "failed to store instance server");
                return RefreshOutcome::failed(STORE_FAILURE, e.to_string());
            }
            record.instance_server_uri = instance_server_uri;
        }

        let sealed = match codec::encrypt(access_token.expose(), key) {
            Ok(sealed) => sealed,
            Err(e) => {
                tracing::error!(account = %account, error = %e, "failed to encrypt access token");
                return RefreshOutcome::failed(ENCRYPTION_FAILURE, e.to_string());
            }
        };

        if let Err(e) = self.store.set_access_token(account, &sealed).await {
            tracing::error!(account = %account, error = %e, "failed to store access token");
            return RefreshOutcome::failed(STORE_FAILURE, e.to_string());
        }

        tracing::info!(account = %account, "access token refreshed");

        RefreshOutcome::Refreshed {
            account_name: account.to_string(),
            account_type: record.account_type,
            access_token,
            login_server_uri: record.login_server_uri,
            instance_server_uri: record.instance_server_uri,
            client_id: record.client_id,
            username: record.username,
            user_id: record.user_id,
            org_id: record.org_id,
        }
    }
}

/// Case-insensitive URI comparison. Unicode-aware, since custom domains
/// may come back as IRIs rather than punycode.
fn same_instance(stored: &str, reported: &str) -> bool {
    stored == reported
        || stored
            .chars()
            .flat_map(char::to_lowercase)
            .eq(reported.chars().flat_map(char::to_lowercase))
}
