//! Integration tests for the daemon RPC API.
//!
//! These tests verify that the JSON-RPC server works correctly over Unix sockets
//! and that refreshes reach a mock identity provider.

use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::{Duration, sleep};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tokenwarden_core::{
    AccountId, AccountMetadataStore, AccountRecord, FileAccountStore, OAuthTokenEndpoint,
    PasscodeKey, codec,
};
use tokenwarden_daemon::api::{
    ApiState, ListAccountsResponse, PendingLoginsResponse, ServerHandle, start_server,
};

const KEY_BYTES: [u8; 32] = [0x5a; 32];

/// Helper to set up a test server with unique temp directory and socket path.
/// Returns the temp directory (which must be kept alive), socket path, and server handle.
async fn setup_test_server(login_server: &str) -> (TempDir, PathBuf, ServerHandle) {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("test.sock");
    let accounts_path = temp_dir.path().join("accounts.json");

    let store = FileAccountStore::load_from_path(accounts_path).unwrap();
    let key = PasscodeKey::from_bytes(KEY_BYTES);
    store
        .put(
            &AccountId::new("jane"),
            AccountRecord {
                account_type: "com.example.auth".to_string(),
                username: "jane@example.com".to_string(),
                user_id: "005000000000001".to_string(),
                org_id: "00D000000000001".to_string(),
                client_id: "client-123".to_string(),
                login_server_uri: login_server.to_string(),
                instance_server_uri: "https://na1.example.com".to_string(),
                encrypted_refresh_secret: codec::encrypt("refresh-secret", &key).unwrap(),
                access_token: None,
            },
        )
        .await
        .unwrap();

    let state = ApiState::with_components(Arc::new(store), Arc::new(OAuthTokenEndpoint::new()));
    let handle = start_server(&socket_path, state).await.unwrap();

    // Give the server time to start accepting connections
    sleep(Duration::from_millis(100)).await;

    (temp_dir, socket_path, handle)
}

fn encoded_key() -> String {
    PasscodeKey::from_bytes(KEY_BYTES).to_base64()
}

/// Detect whether the sandbox allows binding Unix sockets. Skip tests if not.
fn can_bind_unix_socket() -> bool {
    let path = std::env::temp_dir().join("tokenwarden-socket-permission-check.sock");
    let _ = fs::remove_file(&path);
    let result = std::os::unix::net::UnixListener::bind(&path);
    let ok = result.is_ok();
    let _ = fs::remove_file(&path);
    ok
}

/// Helper function to send an RPC request and receive a response.
async fn send_rpc_request<T: for<'de> Deserialize<'de>>(
    stream: &mut UnixStream,
    method: &str,
    params: serde_json::Value,
    id: u64,
) -> Result<T, Box<dyn std::error::Error>> {
    let request = json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": id,
    });

    let request_str = serde_json::to_string(&request)?;
    stream.write_all(request_str.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await?;

    let mut reader = BufReader::new(stream);
    let mut response_str = String::new();
    reader.read_line(&mut response_str).await?;

    let response: serde_json::Value = serde_json::from_str(&response_str)?;

    if let Some(error) = response.get("error") {
        return Err(format!("RPC error: {}", error).into());
    }

    let result = response.get("result").ok_or("No result in response")?;

    Ok(serde_json::from_value(result.clone())?)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_list_accounts_hides_secrets() {
    if !can_bind_unix_socket() {
        eprintln!("Skipping test_list_accounts_hides_secrets: Unix sockets not permitted in sandbox");
        return;
    }

    let (_temp_dir, socket_path, handle) = setup_test_server("https://login.example.com").await;

    let mut stream = UnixStream::connect(&socket_path)
        .await
        .expect("Failed to connect to daemon");

    let raw: serde_json::Value = send_rpc_request(&mut stream, "list_accounts", json!([]), 1)
        .await
        .expect("list_accounts failed");
    let list_response: ListAccountsResponse = serde_json::from_value(raw.clone()).unwrap();

    assert_eq!(list_response.accounts.len(), 1);
    assert_eq!(list_response.accounts[0].account, "jane");
    assert_eq!(list_response.accounts[0].username, "jane@example.com");
    assert_eq!(
        list_response.accounts[0].instance_server_uri,
        "https://na1.example.com"
    );
    assert!(!list_response.accounts[0].has_access_token);
    assert!(!raw.to_string().contains("encrypted_refresh_secret"));

    handle.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_refresh_token_success() {
    if !can_bind_unix_socket() {
        eprintln!("Skipping test_refresh_token_success: Unix sockets not permitted in sandbox");
        return;
    }

    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-access-token",
            "instance_url": "https://na2.example.com",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&provider)
        .await;

    let (_temp_dir, socket_path, handle) = setup_test_server(&provider.uri()).await;

    let mut stream = UnixStream::connect(&socket_path)
        .await
        .expect("Failed to connect to daemon");

    let outcome: serde_json::Value =
        send_rpc_request(&mut stream, "refresh_token", json!(["jane", encoded_key()]), 1)
            .await
            .expect("refresh_token failed");

    assert_eq!(outcome["status"], "refreshed");
    assert_eq!(outcome["access_token"], "fresh-access-token");
    assert_eq!(outcome["instance_server_uri"], "https://na2.example.com");
    assert_eq!(outcome["account_name"], "jane");

    let list_response: ListAccountsResponse =
        send_rpc_request(&mut stream, "list_accounts", json!([]), 2)
            .await
            .expect("list_accounts failed");
    assert!(list_response.accounts[0].has_access_token);
    assert_eq!(
        list_response.accounts[0].instance_server_uri,
        "https://na2.example.com"
    );

    handle.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rejected_secret_queues_login() {
    if !can_bind_unix_socket() {
        eprintln!("Skipping test_rejected_secret_queues_login: Unix sockets not permitted in sandbox");
        return;
    }

    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "expired access/refresh token"
        })))
        .mount(&provider)
        .await;

    let (_temp_dir, socket_path, handle) = setup_test_server(&provider.uri()).await;

    let mut stream = UnixStream::connect(&socket_path)
        .await
        .expect("Failed to connect to daemon");

    let outcome: serde_json::Value = send_rpc_request(
        &mut stream,
        "refresh_token",
        json!(["jane", encoded_key(), {"request_id": "req-9"}]),
        1,
    )
    .await
    .expect("refresh_token failed");
    assert_eq!(outcome, json!({"status": "interactive_login_required"}));

    let pending: PendingLoginsResponse =
        send_rpc_request(&mut stream, "pending_logins", json!([]), 2)
            .await
            .expect("pending_logins failed");
    assert_eq!(pending.requests.len(), 1);
    assert_eq!(pending.requests[0].account, AccountId::new("jane"));
    assert_eq!(
        pending.requests[0].options.get("request_id"),
        Some(&json!("req-9"))
    );

    // Draining empties the queue.
    let pending: PendingLoginsResponse =
        send_rpc_request(&mut stream, "pending_logins", json!([]), 3)
            .await
            .expect("pending_logins failed");
    assert!(pending.requests.is_empty());

    handle.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_error_handling() {
    if !can_bind_unix_socket() {
        eprintln!("Skipping test_error_handling: Unix sockets not permitted in sandbox");
        return;
    }

    let (_temp_dir, socket_path, handle) = setup_test_server("https://login.example.com").await;

    let mut stream = UnixStream::connect(&socket_path)
        .await
        .expect("Failed to connect to daemon");

    // Undecodable key
    let result: Result<serde_json::Value, _> = send_rpc_request(
        &mut stream,
        "refresh_token",
        json!(["jane", "not base64!"]),
        1,
    )
    .await;
    assert!(result.is_err());

    // Unknown account is an outcome, not an RPC error
    let outcome: serde_json::Value = send_rpc_request(
        &mut stream,
        "refresh_token",
        json!(["nobody", encoded_key()]),
        2,
    )
    .await
    .expect("refresh_token failed");
    assert_eq!(outcome["status"], "failed");
    assert_eq!(outcome["error_code"], "account_not_found");

    handle.stop().await;
}
