//! Request security gateway (v1)
//!
//! Screens inbound traffic and forwards admitted requests to one upstream.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────────┐
//!                        │                 REQUEST GATEWAY                       │
//!                        │                                                       │
//!     Client Request     │  ┌─────────┐   ┌──────────────────────────────────┐   │
//!     ───────────────────┼─▶│  http   │──▶│ gateway pipeline                 │   │
//!                        │  │ server  │   │  origin → threat → quota → admit │   │
//!                        │  └─────────┘   └───────┬───────────────┬──────────┘   │
//!                        │                        │ admit         │ reject       │
//!                        │                        ▼               ▼              │
//!                        │                ┌──────────────┐  ┌──────────┐         │
//!                        │                │   upstream   │  │ 403/429  │         │
//!                        │                │   forwarder  │  │  + event │         │
//!                        │                └──────┬───────┘  └────┬─────┘         │
//!                        │                       │               │               │
//!     Client Response    │                       ▼               ▼               │
//!     ◀──────────────────┼──────────── composed security + rate-limit headers    │
//!                        │                                                       │
//!                        │  Cross-cutting: config, events, observability,        │
//!                        │                 lifecycle (signals, shutdown)         │
//!                        └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use request_gateway::config::validation::validate_config;
use request_gateway::config::{load_config, ConfigError, GatewayConfig};
use request_gateway::events::build_sink;
use request_gateway::lifecycle::{spawn_signal_handler, Shutdown};
use request_gateway::net::tls;
use request_gateway::observability::{logging, metrics};
use request_gateway::GatewayServer;

#[derive(Parser)]
#[command(name = "request-gateway")]
#[command(about = "Security gateway in front of an HTTP service", long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => {
            let config = GatewayConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            config
        }
    };

    logging::init_logging(&config.observability)?;
    tracing::info!("request-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        max_connections = config.listener.max_connections,
        allowed_origins = config.cors.allowed_origins.len(),
        tls = config.listener.tls.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let sink = build_sink(&config.events).await?;
    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    match config.listener.tls.clone() {
        Some(tls_config) => {
            let addr = config.listener.bind_address.parse()?;
            let rustls = tls::from_config(&tls_config).await?;
            let server = GatewayServer::new(config, sink)?;
            server.run_tls(addr, rustls, shutdown).await?;
        }
        None => {
            let listener = TcpListener::bind(&config.listener.bind_address).await?;
            tracing::info!(address = %listener.local_addr()?, "Listening for connections");
            let server = GatewayServer::new(config, sink)?;
            server.run(listener, shutdown).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
