//! termbridge proxy daemon
//!
//! Serves browser terminals over WebSocket and relays each one to a
//! remote SSH shell.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tb_core::config::{self, ProxyConfig};
use tb_proxy::{ProxyServer, ProxyState};

#[derive(Parser)]
#[command(name = "termbridge")]
#[command(about = "WebSocket to SSH terminal proxy")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
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

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                ProxyConfig::default()
            })
        } else {
            tracing::info!("Using default configuration");
            ProxyConfig::default()
        }
    };

    // Override bind address if specified
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }

    config.validate().context("Invalid configuration")?;

    if args.print_config {
        print!("{}", config::render_config(&config)?);
        return Ok(());
    }

    tracing::info!("termbridge starting...");
    if let Some(max) = config.max_sessions {
        tracing::info!("Accepting at most {} concurrent sessions", max);
    }

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();
    tokio::spawn(wait_for_signal(cancel.clone()));

    let bind_addr = config.bind_address.clone();
    let grace = config.shutdown_grace;
    let state = Arc::new(ProxyState::new(config, cancel));
    let server = ProxyServer::new(state);

    server.run(&bind_addr).await?;
    server.drain(grace).await;

    tracing::info!("termbridge shutdown complete");
    Ok(())
}

/// Cancel `cancel` on Ctrl+C or SIGTERM
async fn wait_for_signal(cancel: CancellationToken) {
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

    cancel.cancel();
}
