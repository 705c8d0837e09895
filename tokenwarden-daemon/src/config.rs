//! Daemon configuration handling.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokenwarden_core::endpoint::DEFAULT_TOKEN_PATH;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Path to the Unix socket.
    pub socket_path: PathBuf,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Directory for storing account metadata.
    pub data_dir: PathBuf,

    /// Logging level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Token path appended to each account's login server.
    #[serde(default = "default_token_path")]
    pub token_path: String,

    /// Give up on a token exchange after this many seconds. Unset waits forever.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_token_path() -> String {
    DEFAULT_TOKEN_PATH.to_string()
}

impl DaemonConfig {
    /// File holding the account metadata records.
    pub fn accounts_path(&self) -> PathBuf {
        self.data_dir.join("accounts.json")
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Parse a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        let mut config: DaemonConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let dirs = project_dirs();
        let data_dir = dirs
            .as_ref()
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".tokenwarden"));

        let socket_path = dirs
            .as_ref()
            .map(|d| d.runtime_dir().unwrap_or(d.data_dir()).join("tokenwarden.sock"))
            .unwrap_or_else(|| PathBuf::from("/tmp/tokenwarden.sock"));

        Self {
            socket_path,
            config_path: PathBuf::new(),
            data_dir,
            log_level: default_log_level(),
            token_path: default_token_path(),
            request_timeout_secs: None,
        }
    }
}

/// Load configuration from the default location or create defaults.
pub fn load_config() -> Result<DaemonConfig> {
    let config_path = project_dirs()
        .map(|d| d.config_dir().join("daemon.toml"))
        .unwrap_or_else(|| PathBuf::from("tokenwarden-daemon.toml"));

    let config = if config_path.exists() {
        DaemonConfig::from_file(&config_path)?
    } else {
        DaemonConfig {
            config_path,
            ..DaemonConfig::default()
        }
    };

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", config.data_dir))?;

    Ok(config)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "raibid-labs", "tokenwarden")
}
