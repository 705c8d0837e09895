//! JSON-RPC API handlers for the daemon.

use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::{ErrorCode, ErrorObject};
use std::sync::Arc;
use tokenwarden_core::{
    AccountId, AccountMetadataStore, FileAccountStore, LoginOptions, OAuthTokenEndpoint,
    PasscodeKey, QueuedLoginTrigger, RefreshCoordinator, RefreshOutcome, StoreError,
    TokenEndpoint, TokenwardenError,
};
use tracing::{debug, info};

use super::types::{AccountSummary, ListAccountsResponse, PendingLoginsResponse};
use crate::config::DaemonConfig;

/// State shared across RPC handlers.
pub struct ApiState {
    /// Refresh orchestration over the store, endpoint and login queue below
    pub coordinator: RefreshCoordinator,
    /// Account metadata store
    pub store: Arc<dyn AccountMetadataStore>,
    /// Login requests waiting for a login UI
    pub logins: Arc<QueuedLoginTrigger>,
}

impl ApiState {
    /// Build the daemon's state from its configuration.
    pub fn from_config(config: &DaemonConfig) -> Result<Self, TokenwardenError> {
        if !config.token_path.starts_with('/') {
            return Err(TokenwardenError::Config {
                message: format!(
                    "token_path must be an absolute path, got '{}'",
                    config.token_path
                ),
            });
        }

        let store = FileAccountStore::load_from_path(config.accounts_path())?;
        info!("Loaded account store from {:?}", store.path());

        let mut endpoint = OAuthTokenEndpoint::new().with_token_path(config.token_path.clone());
        if let Some(timeout) = config.request_timeout() {
            endpoint = endpoint.with_timeout(timeout);
        }

        Ok(Self::with_components(Arc::new(store), Arc::new(endpoint)))
    }

    /// Create API state over the given store and endpoint (useful for tests).
    pub fn with_components(
        store: Arc<dyn AccountMetadataStore>,
        endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        let logins = Arc::new(QueuedLoginTrigger::new());
        let coordinator = RefreshCoordinator::new(store.clone(), endpoint, logins.clone());

        Self {
            coordinator,
            store,
            logins,
        }
    }
}

/// JSON-RPC API trait definition.
#[rpc(server)]
pub trait TokenwardenApi {
    /// Refresh the access token of an account.
    ///
    /// # Parameters
    ///
    /// - `account`: Account name
    /// - `key`: Base64-encoded passcode key
    /// - `options`: Payload handed to the login UI if a new login is needed
    ///
    /// # Returns
    ///
    /// The refresh outcome, tagged by `status`.
    #[method(name = "refresh_token")]
    async fn refresh_token(
        &self,
        account: String,
        key: String,
        options: Option<LoginOptions>,
    ) -> RpcResult<RefreshOutcome>;

    /// List stored accounts without their secrets.
    #[method(name = "list_accounts")]
    async fn list_accounts(&self) -> RpcResult<ListAccountsResponse>;

    /// Take the login requests raised since the last call.
    #[method(name = "pending_logins")]
    async fn pending_logins(&self) -> RpcResult<PendingLoginsResponse>;
}

/// Implementation of the Tokenwarden API.
pub struct TokenwardenApiImpl {
    state: ApiState,
}

impl TokenwardenApiImpl {
    /// Create a new API implementation with the given state.
    pub fn new(state: ApiState) -> Self {
        Self { state }
    }
}

#[async_trait::async_trait]
impl TokenwardenApiServer for TokenwardenApiImpl {
    async fn refresh_token(
        &self,
        account: String,
        key: String,
        options: Option<LoginOptions>,
    ) -> RpcResult<RefreshOutcome> {
        info!("RPC: refresh_token({})", account);

        let key = PasscodeKey::from_base64(&key).map_err(|e| {
            ErrorObject::owned(
                ErrorCode::InvalidParams.code(),
                format!("Invalid key: {}", e),
                None::<()>,
            )
        })?;

        let outcome = self
            .state
            .coordinator
            .refresh_token_with_options(
                &AccountId::new(account),
                &key,
                &options.unwrap_or_default(),
            )
            .await;

        Ok(outcome)
    }

    async fn list_accounts(&self) -> RpcResult<ListAccountsResponse> {
        debug!("RPC: list_accounts");

        let ids = self.state.store.list().await.map_err(internal_error)?;

        let mut accounts = Vec::with_capacity(ids.len());
        for id in ids {
            match self.state.store.get(&id).await {
                Ok(record) => accounts.push(AccountSummary::from_record(&id, &record)),
                // Removed between list and get.
                Err(StoreError::NotFound { .. }) => continue,
                Err(e) => return Err(internal_error(e)),
            }
        }

        Ok(ListAccountsResponse { accounts })
    }

    async fn pending_logins(&self) -> RpcResult<PendingLoginsResponse> {
        debug!("RPC: pending_logins");

        Ok(PendingLoginsResponse {
            requests: self.state.logins.drain(),
        })
    }
}

pub(crate) fn internal_error<E: std::fmt::Display>(err: E) -> ErrorObject<'static> {
    ErrorObject::owned(
        ErrorCode::InternalError.code(),
        format!("{}", err),
        None::<()>,
    )
}
