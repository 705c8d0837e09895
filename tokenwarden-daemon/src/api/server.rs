//! Line-delimited JSON-RPC server on a Unix socket.
//!
//! Each connection carries one JSON request per line and gets one JSON
//! response per line back. Request lines carry passcode keys, so nothing
//! here logs request text or echoes it in an error.

use super::handlers::{ApiState, TokenwardenApiImpl, TokenwardenApiServer, internal_error};
use anyhow::{Context, Result};
use jsonrpsee::core::RpcResult;
use jsonrpsee::types::{ErrorCode, ErrorObject};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tokenwarden_core::LoginOptions;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Handle to a running RPC server.
pub struct ServerHandle {
    shutdown: watch::Sender<bool>,
    done: watch::Receiver<bool>,
}

impl ServerHandle {
    /// Stop accepting connections, close idle ones and wait for requests
    /// already in flight to be answered.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        self.stopped().await;
    }

    /// Wait until the accept loop and every connection task have exited.
    pub async fn stopped(&self) {
        let mut done = self.done.clone();
        // Err means the server task is gone, which is just as stopped.
        let _ = done.wait_for(|finished| *finished).await;
    }
}

/// Start the JSON-RPC server on a Unix socket.
///
/// Any stale socket file at `socket_path` is replaced. The returned handle
/// stops the server; dropping it without calling [`ServerHandle::stop`]
/// also shuts the accept loop down.
pub async fn start_server(socket_path: &Path, state: ApiState) -> Result<ServerHandle> {
    if socket_path.exists() {
        warn!("Removing existing socket at {:?}", socket_path);
        std::fs::remove_file(socket_path)
            .with_context(|| format!("Failed to remove existing socket at {:?}", socket_path))?;
    }

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create socket directory {:?}", parent))?;
    }

    info!("Starting JSON-RPC server on {:?}", socket_path);

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("Failed to bind Unix socket at {:?}", socket_path))?;

    let api = Arc::new(TokenwardenApiImpl::new(state));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (done_tx, done_rx) = watch::channel(false);

    tokio::spawn(accept_loop(listener, api, shutdown_rx, done_tx));

    info!("JSON-RPC server started and listening");

    Ok(ServerHandle {
        shutdown: shutdown_tx,
        done: done_rx,
    })
}

async fn accept_loop(
    listener: UnixListener,
    api: Arc<TokenwardenApiImpl>,
    mut shutdown: watch::Receiver<bool>,
    done: watch::Sender<bool>,
) {
    let connection_shutdown = shutdown.clone();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("Server shutdown signal received");
                break;
            }
            result = listener.accept() => match result {
                Ok((stream, _addr)) => {
                    let api = api.clone();
                    let shutdown = connection_shutdown.clone();
                    connections.spawn(async move {
                        if let Err(e) = handle_connection(stream, api, shutdown).await {
                            warn!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            },
            // Reap finished connections so the set stays small.
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    while connections.join_next().await.is_some() {}

    info!("JSON-RPC server stopped");
    done.send_replace(true);
}

async fn handle_connection(
    stream: UnixStream,
    api: Arc<TokenwardenApiImpl>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        // Only idle reads race the shutdown signal; a request that has
        // been read is always answered.
        let line = tokio::select! {
            _ = shutdown.changed() => break,
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
        };

        if line.trim().is_empty() {
            continue;
        }

        let response = respond(&line, &api).await;
        writer.write_all(response.to_string().as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Answer one request line.
pub(crate) async fn respond(line: &str, api: &TokenwardenApiImpl) -> Value {
    let request: Value = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            debug!(line = e.line(), column = e.column(), "Unparseable request");
            let error = ErrorObject::owned(
                ErrorCode::ParseError.code(),
                format!("Parse error at line {} column {}", e.line(), e.column()),
                None::<()>,
            );
            return error_response(Value::Null, error);
        }
    };

    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let Some(method) = request_method(&request) else {
        return error_response(id, ErrorObject::from(ErrorCode::InvalidRequest));
    };

    debug!(method = %method, id = %id, "RPC request");

    match dispatch(method, request.get("params"), api).await {
        Ok(result) => json!({
            "jsonrpc": "2.0",
            "result": result,
            "id": id
        }),
        Err(error) => error_response(id, error),
    }
}

/// Method name of a well-formed request object.
fn request_method(request: &Value) -> Option<&str> {
    let object = request.as_object()?;
    match object.get("jsonrpc") {
        None => {}
        Some(Value::String(version)) if version == "2.0" => {}
        Some(_) => return None,
    }
    object.get("method")?.as_str()
}

async fn dispatch(
    method: &str,
    params: Option<&Value>,
    api: &TokenwardenApiImpl,
) -> RpcResult<Value> {
    match method {
        "refresh_token" => {
            let params = RefreshParams::parse(params)
                .ok_or_else(|| ErrorObject::from(ErrorCode::InvalidParams))?;
            into_value(
                api.refresh_token(params.account, params.key, params.options)
                    .await,
            )
        }
        "list_accounts" => into_value(api.list_accounts().await),
        "pending_logins" => into_value(api.pending_logins().await),
        _ => Err(ErrorObject::from(ErrorCode::MethodNotFound)),
    }
}

fn error_response(id: Value, error: ErrorObject<'_>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": error.code(),
            "message": error.message()
        },
        "id": id
    })
}

fn into_value<T: serde::Serialize>(result: RpcResult<T>) -> RpcResult<Value> {
    result.and_then(|resp| serde_json::to_value(resp).map_err(internal_error))
}

/// Parameters of `refresh_token`. No `Debug`: `key` is the passcode key.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RefreshParams {
    account: String,
    key: String,
    #[serde(default)]
    options: Option<LoginOptions>,
}

impl RefreshParams {
    /// Positional `[account, key, options?]` or named `{account, key, options?}`.
    fn parse(params: Option<&Value>) -> Option<Self> {
        match params? {
            Value::Array(items) if (2..=3).contains(&items.len()) => {
                let named = ["account", "key", "options"]
                    .into_iter()
                    .zip(items)
                    .map(|(name, value)| (name.to_string(), value.clone()))
                    .collect();
                serde_json::from_value(Value::Object(named)).ok()
            }
            named @ Value::Object(_) => serde_json::from_value(named.clone()).ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tokenwarden_core::{MemoryAccountStore, OAuthTokenEndpoint, PasscodeKey};

    fn api() -> TokenwardenApiImpl {
        TokenwardenApiImpl::new(ApiState::with_components(
            Arc::new(MemoryAccountStore::new()),
            Arc::new(OAuthTokenEndpoint::new()),
        ))
    }

    /// Log sink shared between the subscriber and the test.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_refresh_params_positional() {
        let params = RefreshParams::parse(Some(&json!(["jane", "a2V5"]))).unwrap();
        assert_eq!(params.account, "jane");
        assert_eq!(params.key, "a2V5");
        assert!(params.options.is_none());

        let params = RefreshParams::parse(Some(&json!(["jane", "a2V5", null]))).unwrap();
        assert!(params.options.is_none());

        let params =
            RefreshParams::parse(Some(&json!(["jane", "a2V5", {"request_id": "r-1"}]))).unwrap();
        assert_eq!(
            params.options.unwrap().get("request_id"),
            Some(&json!("r-1"))
        );
    }

    #[test]
    fn test_refresh_params_named() {
        let params =
            RefreshParams::parse(Some(&json!({"account": "jane", "key": "a2V5"}))).unwrap();
        assert_eq!(params.account, "jane");
        assert!(params.options.is_none());
    }

    #[test]
    fn test_refresh_params_rejects_bad_shapes() {
        assert!(RefreshParams::parse(None).is_none());
        assert!(RefreshParams::parse(Some(&json!(["jane"]))).is_none());
        assert!(RefreshParams::parse(Some(&json!([1, "a2V5"]))).is_none());
        assert!(RefreshParams::parse(Some(&json!(["jane", "a2V5", "not-an-object"]))).is_none());
        assert!(RefreshParams::parse(Some(&json!(["jane", "a2V5", null, "extra"]))).is_none());
        assert!(RefreshParams::parse(Some(&json!({"account": "jane"}))).is_none());
        assert!(
            RefreshParams::parse(Some(&json!({"account": "jane", "key": "k", "pin": 1})))
                .is_none()
        );
    }

    #[test]
    fn test_request_method_checks_envelope() {
        assert_eq!(
            request_method(&json!({"jsonrpc": "2.0", "method": "list_accounts"})),
            Some("list_accounts")
        );
        assert_eq!(
            request_method(&json!({"method": "list_accounts"})),
            Some("list_accounts")
        );
        assert_eq!(
            request_method(&json!({"jsonrpc": "1.0", "method": "list_accounts"})),
            None
        );
        assert_eq!(request_method(&json!({"jsonrpc": "2.0"})), None);
        assert_eq!(request_method(&json!(["list_accounts"])), None);
    }

    #[tokio::test]
    async fn test_debug_logs_never_contain_the_key() {
        let logs = CapturedLogs::default();
        let sink = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let key = PasscodeKey::from_bytes([7; 32]).to_base64();
        let api = api();

        let request = json!({
            "jsonrpc": "2.0",
            "method": "refresh_token",
            "params": ["jane", key],
            "id": 1
        });
        let response = respond(&request.to_string(), &api).await;
        assert_eq!(response["result"]["status"], "failed");

        let truncated = format!(
            r#"{{"jsonrpc":"2.0","method":"refresh_token","params":["jane","{}"#,
            key
        );
        let response = respond(&truncated, &api).await;
        assert_eq!(response["error"]["code"], -32700);
        assert!(!response.to_string().contains(&key));

        let captured = logs.contents();
        assert!(captured.contains("refresh_token"));
        assert!(!captured.contains(&key));
    }

    #[tokio::test]
    async fn test_bad_key_error_omits_the_key() {
        let key = "not-a-valid-key!";
        let request = json!({
            "jsonrpc": "2.0",
            "method": "refresh_token",
            "params": ["jane", key],
            "id": "r-7"
        });

        let response = respond(&request.to_string(), &api()).await;

        assert_eq!(response["error"]["code"], -32602);
        assert_eq!(response["id"], "r-7");
        assert!(!response.to_string().contains(key));
    }
}
