//! Tokenwarden CLI
//!
//! Command-line interface for refreshing access tokens through the
//! Tokenwarden daemon.
//!
//! # Usage
//!
//! ```bash
//! # Refresh the access token of an account (key read from $TOKENWARDEN_KEY)
//! tokenwarden refresh jane@example.com
//!
//! # List stored accounts
//! tokenwarden list-accounts
//!
//! # Show login requests raised by rejected refresh secrets
//! tokenwarden pending-logins
//! ```
//!
//! `refresh` exits with 0 when a token was issued, 1 on failure, 2 when an
//! interactive login is required and 75 (`EX_TEMPFAIL`) when the provider
//! could not be reached.

mod client;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tokenwarden_core::{LoginOptions, PasscodeKey, RefreshOutcome};
use tracing::debug;
use tracing_subscriber::FmtSubscriber;

use client::DaemonClient;

const EXIT_REFRESHED: u8 = 0;
const EXIT_FAILED: u8 = 1;
const EXIT_LOGIN_REQUIRED: u8 = 2;
const EXIT_UNAVAILABLE: u8 = 75;

#[derive(Parser)]
#[command(name = "tokenwarden")]
#[command(about = "Refresh OAuth access tokens from stored refresh secrets")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Daemon socket path
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh the access token of an account
    Refresh {
        /// Account name
        account: String,

        /// Environment variable holding the base64 passcode key
        #[arg(long, default_value = "TOKENWARDEN_KEY")]
        key_env: String,

        /// Entry for the login request if a new login is needed (key=value)
        #[arg(short, long = "option", value_parser = parse_option)]
        options: Vec<(String, String)>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List stored accounts
    ListAccounts {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show and clear the login requests queued by the daemon
    PendingLogins {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.verbose {
        FmtSubscriber::builder()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    }

    let socket_path = cli.socket.unwrap_or_else(client::default_socket_path);
    let mut client = DaemonClient::connect(&socket_path).await?;
    if !client.is_connected() {
        anyhow::bail!(
            "Tokenwarden daemon is not running at {:?}. Start it with `tokenwardend`.",
            client.socket_path()
        );
    }

    match cli.command {
        Commands::Refresh {
            account,
            key_env,
            options,
            format,
        } => refresh(&mut client, &account, &key_env, options, format).await,
        Commands::ListAccounts { format } => {
            list_accounts(&mut client, format).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::PendingLogins { format } => {
            pending_logins(&mut client, format).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn refresh(
    client: &mut DaemonClient,
    account: &str,
    key_env: &str,
    options: Vec<(String, String)>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let key = std::env::var(key_env)
        .with_context(|| format!("Passcode key not set; export it as ${}", key_env))?;
    PasscodeKey::from_base64(&key)
        .with_context(|| format!("${} does not hold a valid passcode key", key_env))?;

    let options = options
        .into_iter()
        .fold(LoginOptions::new(), |acc, (k, v)| acc.with(k, v));

    debug!("Refreshing {}", account);
    let outcome = client.refresh_token(account, &key, &options).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Text => print_outcome(account, &outcome),
    }

    Ok(ExitCode::from(exit_code(&outcome)))
}

fn print_outcome(account: &str, outcome: &RefreshOutcome) {
    match outcome {
        RefreshOutcome::Refreshed { access_token, .. } => println!("{}", access_token.expose()),
        RefreshOutcome::InteractiveLoginRequired => {
            eprintln!("{}: refresh secret rejected, sign in again", account);
        }
        RefreshOutcome::Failed {
            error_code,
            error_description,
        } => {
            if error_description.is_empty() {
                eprintln!("{}: refresh failed: {}", account, error_code);
            } else {
                eprintln!(
                    "{}: refresh failed: {} ({})",
                    account, error_code, error_description
                );
            }
        }
        RefreshOutcome::Unavailable => {
            eprintln!("{}: token endpoint unavailable, try again later", account);
        }
    }
}

fn exit_code(outcome: &RefreshOutcome) -> u8 {
    match outcome {
        RefreshOutcome::Refreshed { .. } => EXIT_REFRESHED,
        RefreshOutcome::Failed { .. } => EXIT_FAILED,
        RefreshOutcome::InteractiveLoginRequired => EXIT_LOGIN_REQUIRED,
        RefreshOutcome::Unavailable => EXIT_UNAVAILABLE,
    }
}

async fn list_accounts(client: &mut DaemonClient, format: OutputFormat) -> Result<()> {
    let response = client.list_accounts().await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.accounts.is_empty() {
        println!("No accounts stored.");
        return Ok(());
    }

    println!("Stored accounts:");
    for summary in &response.accounts {
        println!(
            "  {} ({}) via {} -> {}{}",
            summary.account,
            summary.username,
            summary.login_server_uri,
            summary.instance_server_uri,
            if summary.has_access_token {
                ""
            } else {
                " [never refreshed]"
            }
        );
    }
    Ok(())
}

async fn pending_logins(client: &mut DaemonClient, format: OutputFormat) -> Result<()> {
    let response = client.pending_logins().await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.requests.is_empty() {
        println!("No pending logins.");
        return Ok(());
    }

    for request in &response.requests {
        println!(
            "{}  {}  requested {}",
            request.id,
            request.account,
            request.requested_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}

fn parse_option(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}
