//! # chairside-gateway
//!
//! Realtime gateway binary: boots the WebSocket hub that fans clinic
//! events out to monitoring dashboards.

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use chairside_server::config::ServerConfig;
use chairside_server::server::ChairsideServer;

/// Chairside realtime gateway.
#[derive(Parser, Debug)]
#[command(name = "chairside-gateway", about = "Chairside realtime gateway")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Maximum concurrent WebSocket clients.
    #[arg(long, default_value = "50")]
    max_connections: usize,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_logging();

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        max_connections: args.max_connections,
        ..ServerConfig::default()
    };

    let server = ChairsideServer::new(config);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("chairside gateway listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().graceful_shutdown(vec![handle], None).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
