//! Process wiring: bus selection, background tasks and the router.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::cluster::{Bus, ClusterRelay, LocalBus, RedisBus};
use crate::config::GatewayConfig;
use crate::domain::ConnectionRegistry;
use crate::error::BusError;
use crate::service::HeartbeatSweeper;
use crate::ws::handler::ws_handler;

/// Background tasks owned by a running relay instance.
#[derive(Debug)]
pub struct Background {
    /// Cluster relay subscription loop, resubscribing on loss.
    pub relay: JoinHandle<()>,
    /// Heartbeat sweep loop.
    pub sweeper: JoinHandle<()>,
}

impl Background {
    /// Aborts every background task.
    pub fn abort(&self) {
        self.relay.abort();
        self.sweeper.abort();
    }
}

/// Connects the configured bus: Redis when `REDIS_URL` is set, the
/// in-process bus otherwise.
///
/// # Errors
///
/// Returns [`BusError::Redis`] if the Redis URL is invalid or the server
/// cannot be reached.
pub async fn connect_bus(config: &GatewayConfig) -> Result<Bus, BusError> {
    match &config.redis_url {
        Some(url) => {
            let bus = RedisBus::connect(url, config.broadcast_channel.clone()).await?;
            tracing::info!(channel = %bus.channel(), "using redis broadcast bus");
            Ok(Bus::Redis(bus))
        }
        None => {
            tracing::info!(
                capacity = config.event_bus_capacity,
                "REDIS_URL not set; using in-process bus"
            );
            Ok(Bus::Local(LocalBus::new(config.event_bus_capacity)))
        }
    }
}

/// Builds the application router and starts the relay and the sweeper.
///
/// The relay's first subscription is made before this returns, so
/// commands published through the returned state reach local sockets.
/// A failed subscription is retried in the background.
pub async fn start(config: &GatewayConfig, bus: Bus) -> (Router, Background) {
    let registry = Arc::new(ConnectionRegistry::with_heartbeat_tolerance(
        config.heartbeat_tolerance_ms,
    ));
    let relay = Arc::new(ClusterRelay::new(bus, Arc::clone(&registry)));
    let relay_task = relay.start().await;

    let sweeper = Arc::new(HeartbeatSweeper::new(
        Arc::clone(&registry),
        config.sweep_interval,
        config.heartbeat_timeout_ms,
    ));
    let sweeper_task = sweeper.spawn();

    let app_state = AppState::new(registry, relay, config.auth_settings());

    let app = Router::new()
        .merge(api::build_router())
        .route(&config.socket_path, get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    (
        app,
        Background {
            relay: relay_task,
            sweeper: sweeper_task,
        },
    )
}
