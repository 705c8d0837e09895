//! OAuth 2.0 refresh-token exchange.
//!
//! This module provides:
//! - [`TokenEndpoint`] - Trait for performing one refresh-grant exchange
//! - [`OAuthTokenEndpoint`] - HTTP(S) implementation built on the `oauth2` crate
//! - [`TokenExchangeResult`] - Classified result of an exchange
//!
//! The classification is the important part: a provider error whose code is
//! [`INVALID_GRANT`] means the refresh secret itself is dead, which the
//! coordinator handles very differently from any other failure.

use async_trait::async_trait;
use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AccessToken, AuthType, AuthUrl, Client, ClientId, RefreshToken, RequestTokenError, Scope,
    StandardRevocableToken, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::store::Secret;

/// Provider error code reserved for an invalid, revoked or expired refresh token.
pub const INVALID_GRANT: &str = "invalid_grant";

/// Default token path appended to the login server.
pub const DEFAULT_TOKEN_PATH: &str = "/services/oauth2/token";

const AUTHORIZE_PATH: &str = "/services/oauth2/authorize";

/// Infrastructure failure talking to the token endpoint.
///
/// None of these say anything about whether the refresh secret is valid.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The stored login server URI cannot be used.
    #[error("malformed endpoint configuration {uri}: {message}")]
    MalformedEndpoint { uri: String, message: String },

    /// Connection or protocol failure.
    #[error("token request failed: {message}")]
    Request { message: String },

    /// No response within the configured limit.
    #[error("token request timed out after {0:?}")]
    Timeout(Duration),

    /// The response body was neither a token nor a provider error.
    #[error("unparseable token response: {message}")]
    Parse { message: String },
}

/// Input to a single exchange. Never persisted.
#[derive(Debug, Clone)]
pub struct TokenExchangeRequest {
    /// Login (authorization) server of the account.
    pub endpoint_uri: String,

    /// OAuth client the refresh secret belongs to.
    pub client_id: String,

    /// Decrypted refresh secret.
    pub refresh_secret: Secret,
}

/// Classified result of a refresh exchange.
#[derive(Debug)]
pub enum TokenExchangeResult {
    /// The provider issued a new access token.
    Success {
        access_token: Secret,
        instance_server_uri: String,
    },

    /// The provider answered with an OAuth error body.
    ProviderError {
        error_code: String,
        error_description: String,
        refresh_secret_invalid: bool,
    },

    /// The exchange never produced a usable provider answer.
    TransportError { cause: EndpointError },
}

/// Performs refresh-grant exchanges.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchange a refresh secret for a new access token. No retries.
    async fn refresh(&self, request: &TokenExchangeRequest) -> TokenExchangeResult;
}

/// Body of a successful refresh-grant response.
///
/// Only `access_token` and `instance_url` are required. Providers commonly
/// leave out `token_type` on refresh, so it defaults to bearer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceTokenResponse {
    access_token: AccessToken,

    #[serde(default = "bearer")]
    token_type: BasicTokenType,

    /// Instance the account is currently served from.
    pub instance_url: String,

    /// Identity URL of the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<RefreshToken>,
}

fn bearer() -> BasicTokenType {
    BasicTokenType::Bearer
}

impl TokenResponse<BasicTokenType> for InstanceTokenResponse {
    fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    fn token_type(&self) -> &BasicTokenType {
        &self.token_type
    }

    fn expires_in(&self) -> Option<Duration> {
        None
    }

    fn refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }

    fn scopes(&self) -> Option<&Vec<Scope>> {
        None
    }
}

type RefreshClient = Client<
    BasicErrorResponse,
    InstanceTokenResponse,
    BasicTokenType,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
>;

/// Token endpoint reached over HTTP(S).
///
/// The token URL is the account's login server joined with `token_path`.
///
/// # Example
///
/// ```rust,ignore
/// use std::time::Duration;
/// use tokenwarden_core::endpoint::OAuthTokenEndpoint;
///
/// let endpoint = OAuthTokenEndpoint::new().with_timeout(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct OAuthTokenEndpoint {
    token_path: String,
    timeout: Option<Duration>,
}

impl OAuthTokenEndpoint {
    /// Create an endpoint using [`DEFAULT_TOKEN_PATH`] and no timeout.
    pub fn new() -> Self {
        Self {
            token_path: DEFAULT_TOKEN_PATH.to_string(),
            timeout: None,
        }
    }

    /// Use a different token path on the login server.
    pub fn with_token_path(mut self, path: impl Into<String>) -> Self {
        self.token_path = path.into();
        self
    }

    /// Fail the exchange if no response arrives within `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the OAuth client for one login server.
    fn client_for(&self, request: &TokenExchangeRequest) -> Result<RefreshClient, EndpointError> {
        let malformed = |message: String| EndpointError::MalformedEndpoint {
            uri: request.endpoint_uri.clone(),
            message,
        };

        let base = Url::parse(&request.endpoint_uri).map_err(|e| malformed(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(malformed(format!("unsupported scheme '{}'", base.scheme())));
        }

        let token_url = base
            .join(&self.token_path)
            .map_err(|e| malformed(format!("invalid token path: {}", e)))?;
        let auth_url = base
            .join(AUTHORIZE_PATH)
            .map_err(|e| malformed(format!("invalid authorize path: {}", e)))?;

        let client = RefreshClient::new(
            ClientId::new(request.client_id.clone()),
            None,
            AuthUrl::from_url(auth_url),
            Some(TokenUrl::from_url(token_url)),
        )
        .set_auth_type(AuthType::RequestBody);

        Ok(client)
    }
}

impl Default for OAuthTokenEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenEndpoint for OAuthTokenEndpoint {
    async fn refresh(&self, request: &TokenExchangeRequest) -> TokenExchangeResult {
        let client = match self.client_for(request) {
            Ok(client) => client,
            Err(cause) => return TokenExchangeResult::TransportError { cause },
        };

        let refresh_token = RefreshToken::new(request.refresh_secret.expose().to_string());
        let exchange = client
            .exchange_refresh_token(&refresh_token)
            .request_async(async_http_client);

        tracing::debug!(endpoint = %request.endpoint_uri, "exchanging refresh token");

        let response = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(response) => response,
                Err(_) => {
                    return TokenExchangeResult::TransportError {
                        cause: EndpointError::Timeout(limit),
                    };
                }
            },
            None => exchange.await,
        };

        match response {
            Ok(token) => TokenExchangeResult::Success {
                access_token: Secret::new(token.access_token().secret().as_str()),
                instance_server_uri: token.instance_url.clone(),
            },
            Err(err) => classify_failure(err),
        }
    }
}

/// Sort a failed exchange into provider rejections and transport faults.
fn classify_failure<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> TokenExchangeResult
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            let error_code = response.error().as_ref().to_string();
            TokenExchangeResult::ProviderError {
                refresh_secret_invalid: error_code == INVALID_GRANT,
                error_description: response.error_description().cloned().unwrap_or_default(),
                error_code,
            }
        }
        RequestTokenError::Request(e) => TokenExchangeResult::TransportError {
            cause: EndpointError::Request {
                message: e.to_string(),
            },
        },
        RequestTokenError::Parse(e, body) => TokenExchangeResult::TransportError {
            cause: EndpointError::Parse {
                message: format!("{} ({} byte body)", e, body.len()),
            },
        },
        RequestTokenError::Other(message) => TokenExchangeResult::TransportError {
            cause: EndpointError::Request { message },
        },
    }
}
