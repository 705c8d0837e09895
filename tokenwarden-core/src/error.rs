//! Top-level error types for Tokenwarden.

use thiserror::Error;

use crate::codec::CodecError;
use crate::endpoint::EndpointError;
use crate::store::StoreError;

/// Top-level error type encompassing all Tokenwarden errors.
///
/// The refresh path itself never returns these; it folds every failure into
/// a [`RefreshOutcome`](crate::RefreshOutcome). They show up when wiring
/// the coordinator together.
#[derive(Debug, Error)]
pub enum TokenwardenError {
    /// Error from secret encryption or key parsing.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Error reaching the token endpoint.
    #[error("endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    /// Error from account metadata storage.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}
