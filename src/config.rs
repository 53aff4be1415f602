//! Relay configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Missing or unparsable values fall
//! back to defaults, except `LISTEN_ADDR`, which must parse if set.

use std::net::SocketAddr;
use std::time::Duration;

use crate::domain::DEFAULT_HEARTBEAT_TOLERANCE_MS;
use crate::service::heartbeat_sweeper::{
    DEFAULT_HEARTBEAT_TIMEOUT_MS, DEFAULT_SWEEP_INTERVAL,
};
use crate::ws::AuthSettings;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Top-level relay configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:8080`).
    pub listen_addr: SocketAddr,

    /// Route the WebSocket endpoint is mounted on.
    pub socket_path: String,

    /// Shared static credential expected in `auth`.
    pub api_key: String,

    /// User bound to a connection whose `auth` names none.
    pub default_user_id: String,

    /// Maximum `now - time` accepted on a heartbeat, in milliseconds.
    pub heartbeat_tolerance_ms: i64,

    /// Silence after which the sweeper closes a connection, in milliseconds.
    pub heartbeat_timeout_ms: i64,

    /// Period of the heartbeat sweep.
    pub sweep_interval: Duration,

    /// Redis URL of the shared bus; `None` selects the in-process bus.
    pub redis_url: Option<String>,

    /// Name of the broadcast channel.
    pub broadcast_channel: String,

    /// Capacity of the in-process bus.
    pub event_bus_capacity: usize,

    /// Log output format.
    pub log_format: LogFormat,
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, std::net::AddrParseError> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()?;

        let redis_url = std::env::var("REDIS_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let log_format = match std::env::var("LOG_FORMAT").ok().as_deref() {
            Some("json") | Some("JSON") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            listen_addr,
            socket_path: normalize_path(&env_or("SOCKET_PATH", "/socket")),
            api_key: env_or("API_KEY", "hello"),
            default_user_id: env_or("DEFAULT_USER_ID", "zhangsan"),
            heartbeat_tolerance_ms: parse_env(
                "HEARTBEAT_TOLERANCE_MS",
                DEFAULT_HEARTBEAT_TOLERANCE_MS,
            ),
            heartbeat_timeout_ms: parse_env(
                "HEARTBEAT_TIMEOUT_MS",
                DEFAULT_HEARTBEAT_TIMEOUT_MS,
            ),
            sweep_interval: Duration::from_secs(parse_env(
                "SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL.as_secs(),
            ))
            .max(Duration::from_secs(1)),
            redis_url,
            broadcast_channel: env_or("BROADCAST_CHANNEL", "redis-broadcast"),
            event_bus_capacity: parse_env("EVENT_BUS_CAPACITY", 10_000_usize).max(1),
            log_format,
        })
    }

    /// Credential settings for the protocol handler.
    #[must_use]
    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            api_key: self.api_key.clone(),
            default_user_id: self.default_user_id.clone(),
        }
    }
}

/// Reads a string variable, returning `default` when unset or blank.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Ensures a route path starts with `/`.
fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
