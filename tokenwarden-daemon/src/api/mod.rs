//! JSON-RPC API for daemon IPC.
//!
//! This module provides a JSON-RPC interface for communication between
//! the tokenwarden CLI and the tokenwardend daemon.

pub mod handlers;
pub mod server;
pub mod types;

pub use handlers::{ApiState, TokenwardenApiImpl, TokenwardenApiServer};
pub use server::{ServerHandle, start_server};
pub use types::*;
