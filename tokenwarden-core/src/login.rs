//! Interactive login hand-off.
//!
//! When the provider rejects a refresh secret outright, the only way forward
//! is a fresh interactive login. The coordinator signals that through a
//! [`LoginFlowTrigger`]; the host decides what a login flow looks like.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::model::AccountId;

/// Caller-supplied payload forwarded untouched to the login flow.
///
/// Lets the eventual new credential be correlated back to the request
/// that needed it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoginOptions(Map<String, Value>);

impl LoginOptions {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up an entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for LoginOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Starts an interactive login for an account.
#[async_trait]
pub trait LoginFlowTrigger: Send + Sync {
    /// Signal that `account` needs a brand-new refresh secret.
    async fn request_login(&self, account: &AccountId, options: &LoginOptions);
}

/// A login request waiting for a login UI to pick it up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Unique id for correlating the completed login.
    pub id: Uuid,

    /// Account whose refresh secret was rejected.
    pub account: AccountId,

    /// Payload from the original refresh caller.
    pub options: LoginOptions,

    /// When the request was raised.
    pub requested_at: DateTime<Utc>,
}

/// Trigger that queues login requests for a host to drain.
#[derive(Debug, Default)]
pub struct QueuedLoginTrigger {
    pending: Mutex<Vec<LoginRequest>>,
}

impl QueuedLoginTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued request, oldest first.
    pub fn drain(&self) -> Vec<LoginRequest> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Number of requests waiting.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

/// Holds at most one request per account. A repeat request for an account
/// that is still waiting keeps its id and queue position and takes the newer
/// options and timestamp.
#[async_trait]
impl LoginFlowTrigger for QueuedLoginTrigger {
    async fn request_login(&self, account: &AccountId, options: &LoginOptions) {
        let mut pending = self.pending.lock();

        if let Some(existing) = pending.iter_mut().find(|r| &r.account == account) {
            existing.options = options.clone();
            existing.requested_at = Utc::now();
            tracing::debug!(account = %account, request_id = %existing.id, "refreshed pending login");
            return;
        }

        let request = LoginRequest {
            id: Uuid::new_v4(),
            account: account.clone(),
            options: options.clone(),
            requested_at: Utc::now(),
        };

        tracing::info!(account = %account, request_id = %request.id, "queued interactive login");
        pending.push(request);
    }
}
