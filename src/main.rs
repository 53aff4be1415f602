//! session-relay server entry point.
//!
//! Starts the Axum HTTP server with the WebSocket endpoint, the REST
//! command endpoint, the cluster relay and the heartbeat sweeper.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use session_relay::config::{GatewayConfig, LogFormat};
use session_relay::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env().context("invalid LISTEN_ADDR")?;

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting session-relay");

    // Build cluster and core
    let bus = server::connect_bus(&config)
        .await
        .context("failed to connect broadcast bus")?;
    let (app, background) = server::start(&config, bus).await;

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(
        addr = %config.listen_addr,
        path = %config.socket_path,
        "server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    background.abort();
    tracing::info!("session-relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
