//! Tokenwarden Daemon
//!
//! Background service that refreshes access tokens from stored refresh
//! secrets and exposes a local API for Tokenwarden clients.
//!
//! # Running
//!
//! ```bash
//! cargo run -p tokenwarden-daemon
//! # or after install:
//! tokenwardend
//! ```

use anyhow::Result;
use tokenwarden_daemon::{api, config};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config()?;

    init_logging(&config.log_level);

    info!("Starting Tokenwarden daemon...");
    info!("Loaded configuration from {:?}", config.config_path);

    run_daemon(config).await
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn run_daemon(config: config::DaemonConfig) -> Result<()> {
    info!("Daemon starting on {:?}", config.socket_path);

    let state = api::ApiState::from_config(&config)?;

    let server_handle = api::start_server(&config.socket_path, state).await?;

    info!("Daemon running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping server...");

    server_handle.stop().await;

    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
        info!("Socket file removed");
    }

    info!("Daemon stopped");
    Ok(())
}
