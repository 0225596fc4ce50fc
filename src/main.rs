//! Orchestrator Gateway
//!
//! A dynamic reverse-proxy gateway built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────────┐
//!                        │                      GATEWAY                          │
//!                        │                                                       │
//!   Client Request       │  ┌─────────┐    ┌──────────────┐    ┌─────────────┐  │
//!   ─────────────────────┼─▶│  http   │───▶│   routing    │───▶│ resilience  │  │
//!                        │  │ server  │    │ route table  │    │   breaker   │  │
//!                        │  └─────────┘    └──────┬───────┘    └──────┬──────┘  │
//!                        │                        │ snapshot          │          │
//!                        │                        ▼                   ▼          │
//!                        │                 ┌──────────────┐    ┌─────────────┐  │
//!   Client Response      │                 │   registry   │◀───│ http proxy  │◀─┼─── Backend
//!   ◀────────────────────┼─────────────────│  endpoints   │    │   client    │  │    Endpoint
//!                        │                 └──────▲───────┘    └─────────────┘  │
//!                        │                        │                              │
//!                        │  ┌──────────┐  ┌───────┴──────┐  ┌─────────────────┐ │
//!                        │  │  config  │  │    health    │  │  admin (mgmt)   │ │
//!                        │  │ + reload │  │   checker    │  │      API        │ │
//!                        │  └──────────┘  └──────────────┘  └─────────────────┘ │
//!                        └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use orchestrator_gateway::config::{load_config, ConfigError, GatewayConfig};
use orchestrator_gateway::config::watcher::ConfigWatcher;
use orchestrator_gateway::lifecycle::signals::{spawn_reload_on_hangup, wait_for_signal};
use orchestrator_gateway::lifecycle::{AppContext, Shutdown};
use orchestrator_gateway::observability::{logging, metrics};
use orchestrator_gateway::GatewayServer;

#[derive(Parser)]
#[command(name = "orchestrator-gateway")]
#[command(about = "Dynamic reverse-proxy gateway", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Override `listener.bind_address`
    #[arg(short, long)]
    bind: Option<String>,

    /// Override `observability.log_level`
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (mut config, config_path) = match load_config(&cli.config) {
        Ok(config) => (config, Some(cli.config.clone())),
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            eprintln!("config file {} not found, using defaults", cli.config.display());
            (GatewayConfig::default(), None)
        }
        Err(e) => return Err(e.into()),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "orchestrator-gateway starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        endpoints = config.endpoints.len(),
        "Listening for connections"
    );

    let ctx = AppContext::build(config, config_path.clone());
    let shutdown = Shutdown::new();

    // The watcher must stay alive for the lifetime of the server.
    let _watcher = match &config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            ctx.spawn_config_subscriber(updates, shutdown.subscribe());
            match watcher.run() {
                Ok(w) => Some(w),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };
    spawn_reload_on_hangup(ctx.clone(), shutdown.subscribe());

    let server = GatewayServer::new(ctx);
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        signal = wait_for_signal() => {
            tracing::info!(signal, "Shutdown signal received");
            shutdown.trigger();
            server_task.await??;
        }
        result = &mut server_task => {
            shutdown.trigger();
            result??;
        }
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
