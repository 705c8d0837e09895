//! # Tokenwarden Core
//!
//! Core library for refreshing OAuth access tokens from stored, encrypted
//! refresh secrets.
//!
//! This crate provides:
//! - [`codec`] - AES-GCM sealing of stored secrets under a passcode-derived key
//! - [`endpoint`] - The OAuth 2.0 refresh-grant exchange and its failure classification
//! - [`store`] - Account metadata storage (in-memory and JSON file backends)
//! - [`login`] - The hand-off to an interactive login flow
//! - [`coordinator`] - [`RefreshCoordinator`], which ties the above together
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokenwarden_core::{
//!     AccountId, MemoryAccountStore, OAuthTokenEndpoint, PasscodeKey,
//!     QueuedLoginTrigger, RefreshCoordinator,
//! };
//!
//! let coordinator = RefreshCoordinator::new(
//!     Arc::new(MemoryAccountStore::new()),
//!     Arc::new(OAuthTokenEndpoint::new()),
//!     Arc::new(QueuedLoginTrigger::new()),
//! );
//! let key = PasscodeKey::from_base64(&encoded_key)?;
//! let outcome = coordinator.refresh_token(&AccountId::new("jane"), &key).await;
//! ```

pub mod codec;
pub mod coordinator;
pub mod endpoint;
pub mod error;
pub mod login;
pub mod model;
pub mod store;

// Re-export commonly used types at crate root
pub use model::{AccountId, AccountRecord};

pub use codec::{CodecError, PasscodeKey};

pub use endpoint::{
    EndpointError,
    OAuthTokenEndpoint,
    TokenEndpoint,
    TokenExchangeRequest,
    TokenExchangeResult,
};

pub use store::{
    AccountMetadataStore,
    FileAccountStore,
    MemoryAccountStore,
    Secret,
    StoreError,
};

pub use login::{
    LoginFlowTrigger,
    LoginOptions,
    LoginRequest,
    QueuedLoginTrigger,
};

pub use coordinator::{RefreshCoordinator, RefreshOutcome};

pub use error::TokenwardenError;
