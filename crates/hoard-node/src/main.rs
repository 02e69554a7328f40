//! Hoard Node - Git Smart HTTP server.

use anyhow::Context;
use clap::{Parser, Subcommand};
use hoard_node::api::{create_router, AppState};
use hoard_node::config::{AccountConfig, NodeConfig};
use hoard_node::observability::{init_logging, LogFormat};
use std::io::BufRead;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Hoard Node - Git hosting over an object store
#[derive(Parser, Debug)]
#[command(name = "hoard-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Hash a password for the `accounts` section of the config
    HashPassword {
        /// Password to hash; read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
        /// Print a full account entry for this username
        #[arg(long, requires = "id")]
        username: Option<String>,
        /// Account ID for the printed entry
        #[arg(long)]
        id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Some(Command::HashPassword {
            password,
            username,
            id,
        }) => hash_password(password, username, id),
        Some(Command::Serve) | None => {
            let mut config =
                NodeConfig::load(args.config.as_deref()).context("loading configuration")?;
            if let Some(addr) = args.addr {
                config.server.addr = addr;
            }
            if let Some(level) = args.log_level {
                config.logging.level = level;
            }
            if let Some(format) = args.log_format.as_deref() {
                config.logging.format = LogFormat::parse(format);
            }
            serve(config).await
        }
    }
}

async fn serve(config: NodeConfig) -> anyhow::Result<()> {
    init_logging(&config.logging.level, config.logging.format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Hoard node");
    tracing::info!(
        addr = %config.server.addr,
        backend = ?config.storage.backend,
        repositories = config.repositories.len(),
        accounts = config.accounts.len(),
        "Node configuration"
    );

    let state = AppState::from_config(&config)
        .await
        .context("opening object store")?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.server.addr)
        .await
        .with_context(|| format!("binding {}", config.server.addr))?;
    tracing::info!(addr = %config.server.addr, "Node is ready. Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Hoard node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}

fn hash_password(
    password: Option<String>,
    username: Option<String>,
    id: Option<String>,
) -> anyhow::Result<()> {
    let password = match password {
        Some(password) => password,
        None => {
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("reading password from stdin")?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    anyhow::ensure!(!password.is_empty(), "password must not be empty");

    let record = hoard_auth::hash_password(&password)?;
    match (username, id) {
        (Some(username), Some(id)) => {
            let entry = AccountConfig {
                id,
                username,
                password_hash: Some(record),
            };
            print!("{}", serde_yaml::to_string(&vec![entry])?);
        }
        _ => println!("{}", record),
    }
    Ok(())
}
