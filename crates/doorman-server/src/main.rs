//! `doorman` - RFID access server and operator tool.

use anyhow::Context;
use clap::{Parser, Subcommand};
use doorman_core::Credential;
use doorman_network::{IngressClient, IngressClientConfig};
use doorman_server::{Config, DEFAULT_CONFIG_PATH, Server};
use doorman_storage::{
    AccessEventRepository, CredentialHolder, Database, HolderRepository, HolderStatus,
    OccupancyStats, SqliteAccessEventRepository, SqliteHolderRepository,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// RFID access server for entry and exit scanners
#[derive(Parser, Debug)]
#[command(name = "doorman", version, about)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ingress listeners and access pipeline (default)
    Serve,

    /// Print occupancy statistics as JSON
    Stats,

    /// Print recent access events as JSON
    Events {
        /// Maximum number of events
        #[arg(short, long, default_value_t = 100)]
        limit: i64,

        /// Only events for this credential
        #[arg(long)]
        credential: Option<String>,
    },

    /// Manage the credential registry
    Holders {
        #[command(subcommand)]
        action: HolderCommand,
    },

    /// Send one payload to a listener, as a scanner would
    Scan {
        /// Listener address, e.g. 127.0.0.1:8080
        addr: SocketAddr,

        /// Payload line, e.g. ABC12345 or ABC12345;dir=exit
        payload: String,

        /// Per-operation timeout in milliseconds
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,

        /// Keep reading relayed display messages after the ack
        #[arg(long)]
        relay: bool,
    },
}

#[derive(Subcommand, Debug)]
enum HolderCommand {
    /// List registered holders
    List,

    /// Register a new holder
    Add {
        credential: String,
        name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },

    /// Deny further scans for a credential
    Deactivate { credential: String },

    /// Re-enable a deactivated credential
    Activate { credential: String },

    /// Remove a holder from the registry
    Remove { credential: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // The scan command works without a config file
    let config = Config::from_file(&cli.config);
    let log_level = config.as_ref().ok().and_then(|c| c.log_level.clone());
    init_tracing(log_level.as_deref(), cli.json_logs);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_level: Option<&str>, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli, config: anyhow::Result<Config>) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config?).await,
        Command::Stats => {
            let db = open_database(&config?).await?;
            let stats = OccupancyStats::collect(db.pool()).await?;
            print_json(&stats)
        }
        Command::Events { limit, credential } => {
            let db = open_database(&config?).await?;
            let events = SqliteAccessEventRepository::new(db.pool().clone());
            let events = match credential {
                Some(raw) => {
                    let credential = Credential::new(&raw)?;
                    events.find_by_credential(credential.as_str(), limit).await?
                }
                None => events.find_recent(limit).await?,
            };
            print_json(&events)
        }
        Command::Holders { action } => {
            let db = open_database(&config?).await?;
            manage_holders(&SqliteHolderRepository::new(db.pool().clone()), action).await
        }
        Command::Scan {
            addr,
            payload,
            timeout_ms,
            relay,
        } => scan(addr, &payload, Duration::from_millis(timeout_ms), relay).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!(
        devices = config.devices.len(),
        database = %config.database.path,
        display_interval_ms = config.feedback.display_interval_ms,
        "doorman starting"
    );

    let server = Server::build(&config).await?;
    for addr in server.listener_addrs() {
        info!(addr = %addr, "Listening");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => warn!(error = %e, "Failed to listen for ctrl-c; shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    server.run(shutdown_rx).await
}

async fn open_database(config: &Config) -> anyhow::Result<Database> {
    Database::new(config.database_config())
        .await
        .with_context(|| format!("Failed to open database {}", config.database.path))
}

async fn manage_holders(
    holders: &SqliteHolderRepository,
    action: HolderCommand,
) -> anyhow::Result<()> {
    match action {
        HolderCommand::List => print_json(&holders.list().await?),
        HolderCommand::Add {
            credential,
            name,
            email,
            phone,
        } => {
            let credential = Credential::new(&credential)?;
            let mut holder = CredentialHolder::new(name.trim(), &credential);
            if let Some(email) = email {
                holder = holder.with_email(email);
            }
            if let Some(phone) = phone {
                holder = holder.with_phone(phone);
            }
            let id = holders.create(&holder).await?;
            println!("Added holder {id} ({credential})");
            Ok(())
        }
        HolderCommand::Deactivate { credential } => {
            set_status(holders, &credential, HolderStatus::Inactive).await
        }
        HolderCommand::Activate { credential } => {
            set_status(holders, &credential, HolderStatus::Active).await
        }
        HolderCommand::Remove { credential } => {
            let credential = Credential::new(&credential)?;
            holders.delete(credential.as_str()).await?;
            println!("Removed {credential}");
            Ok(())
        }
    }
}

async fn set_status(
    holders: &SqliteHolderRepository,
    raw: &str,
    status: HolderStatus,
) -> anyhow::Result<()> {
    let credential = Credential::new(raw)?;
    holders.update_status(credential.as_str(), status).await?;
    println!("{credential} is now {status}");
    Ok(())
}

async fn scan(
    addr: SocketAddr,
    payload: &str,
    timeout: Duration,
    relay: bool,
) -> anyhow::Result<()> {
    let mut client = IngressClient::new(IngressClientConfig {
        server_addr: addr,
        timeout,
    });

    client.connect().await?;
    client.send_payload(payload).await?;
    client.recv_ack().await?;
    println!("OK");

    if relay {
        while let Some(message) = client.recv_relay().await? {
            println!("{message}\n");
        }
    }

    client.close().await?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
