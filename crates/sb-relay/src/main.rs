//! ssh-bridge relay daemon
//!
//! Accepts WebSocket connections from browser terminals and relays each one
//! to an SSH shell and SFTP subsystem on the host the browser names.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sb_core::config::{self, RelayConfig};
use sb_relay::remote::SshConnector;
use sb_relay::{RelayServer, RelayState};

#[derive(Parser)]
#[command(name = "sb-relay")]
#[command(about = "ssh-bridge WebSocket to SSH relay")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "SB_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long, env = "SB_RELAY_BIND")]
    bind: Option<String>,

    /// WebSocket upgrade path (overrides config)
    #[arg(long)]
    path: Option<String>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("ssh-bridge relay starting...");

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                RelayConfig::default()
            })
        } else {
            tracing::info!("Using default configuration");
            RelayConfig::default()
        }
    };

    if let Some(path) = args.path {
        config.ws_path = path;
    }
    let bind_addr = args.bind.unwrap_or_else(|| config.bind_address.clone());

    match config.connect_timeout {
        Some(timeout) => tracing::info!("SSH handshake timeout: {:?}", timeout),
        None => tracing::debug!("No SSH handshake timeout configured"),
    }

    let state = Arc::new(RelayState::new(config, Arc::new(SshConnector::new())));

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Setup signal handlers
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let server = RelayServer::new(state, cancel);
    server.run(&bind_addr).await?;

    tracing::info!("Relay shutdown complete");
    Ok(())
}
