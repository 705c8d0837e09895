//! Daemon client for communicating with tokenwardend.
//!
//! This module provides a client for connecting to the Tokenwarden daemon
//! over a Unix socket using JSON-RPC.

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use tokenwarden_core::{LoginOptions, LoginRequest, RefreshOutcome};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, warn};

/// Non-secret view of a stored account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account: String,
    pub username: String,
    pub login_server_uri: String,
    pub instance_server_uri: String,
    pub has_access_token: bool,
}

/// Response containing a list of accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListAccountsResponse {
    pub accounts: Vec<AccountSummary>,
}

/// Login requests raised since the last poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingLoginsResponse {
    pub requests: Vec<LoginRequest>,
}

/// Client for communicating with the Tokenwarden daemon.
pub struct DaemonClient {
    stream: Option<UnixStream>,
    socket_path: PathBuf,
    next_id: u64,
}

impl DaemonClient {
    /// Attempt to connect to the daemon at the given socket path.
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        debug!("Attempting to connect to daemon at {:?}", socket_path);

        let stream = if !socket_path.exists() {
            debug!("Socket does not exist at {:?}", socket_path);
            None
        } else {
            match UnixStream::connect(socket_path).await {
                Ok(stream) => {
                    debug!("Successfully connected to daemon");
                    Some(stream)
                }
                Err(e) => {
                    warn!("Failed to connect to daemon: {}", e);
                    None
                }
            }
        };

        Ok(Self {
            stream,
            socket_path: socket_path.to_path_buf(),
            next_id: 1,
        })
    }

    /// Check if the client is connected to the daemon.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send a JSON-RPC request and receive a response.
    async fn send_request<T: for<'de> Deserialize<'de>>(
        &mut self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Not connected to daemon"))?;

        let id = self.next_id;
        self.next_id += 1;

        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let request_str = serde_json::to_string(&request)?;
        // Params may carry the passcode key.
        debug!("Sending request: {} (id {})", method, id);

        stream.write_all(request_str.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await?;

        let mut reader = BufReader::new(stream);
        let mut response_str = String::new();
        reader.read_line(&mut response_str).await?;

        debug!("Received response for id {}", id);

        let response: serde_json::Value = serde_json::from_str(&response_str)?;

        if let Some(error) = response.get("error") {
            anyhow::bail!("RPC error: {}", error);
        }

        let result = response
            .get("result")
            .ok_or_else(|| anyhow::anyhow!("No result in response"))?;

        Ok(serde_json::from_value(result.clone())?)
    }

    /// Refresh the access token of an account.
    pub async fn refresh_token(
        &mut self,
        account: &str,
        key_b64: &str,
        options: &LoginOptions,
    ) -> Result<RefreshOutcome> {
        let options = if options.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::to_value(options)?
        };
        self.send_request("refresh_token", json!([account, key_b64, options]))
            .await
    }

    /// List stored accounts.
    pub async fn list_accounts(&mut self) -> Result<ListAccountsResponse> {
        self.send_request("list_accounts", json!([])).await
    }

    /// Take the login requests queued by the daemon.
    pub async fn pending_logins(&mut self) -> Result<PendingLoginsResponse> {
        self.send_request("pending_logins", json!([])).await
    }
}

/// Get the default socket path for the daemon.
pub fn default_socket_path() -> PathBuf {
    let dirs = ProjectDirs::from("com", "raibid-labs", "tokenwarden");

    dirs.as_ref()
        .map(|d| d.runtime_dir().unwrap_or(d.data_dir()).join("tokenwarden.sock"))
        .unwrap_or_else(|| PathBuf::from("/tmp/tokenwarden.sock"))
}
