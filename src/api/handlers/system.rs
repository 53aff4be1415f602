//! System endpoints: health check.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
    /// Live sockets held by this instance only.
    local_connections: usize,
}

/// `GET /health` — Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, current timestamp and the \
                   number of sockets held by this instance.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            local_connections: state.registry.len().await,
        }),
    )
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::cluster::{Bus, ClusterRelay, LocalBus};
    use crate::domain::{ConnectionHandle, ConnectionRegistry};
    use crate::ws::AuthSettings;

    #[tokio::test]
    async fn health_reports_local_connections() {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = Arc::new(ClusterRelay::new(
            Bus::Local(LocalBus::new(4)),
            Arc::clone(&registry),
        ));
        let (handle, _rx) = ConnectionHandle::channel();
        let _ = registry.register(handle, 0).await;
        let state = AppState::new(
            registry,
            relay,
            AuthSettings {
                api_key: "hello".to_string(),
                default_user_id: "zhangsan".to_string(),
            },
        );
        let app = routes().with_state(state);

        let Ok(req) = Request::builder().uri("/health").body(Body::empty()) else {
            panic!("request build failed");
        };
        let Ok(response) = app.oneshot(req).await;
        assert_eq!(response.status(), StatusCode::OK);

        let Ok(bytes) = to_bytes(response.into_body(), 4096).await else {
            panic!("body read failed");
        };
        let Ok(json) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
            panic!("body is not json");
        };
        assert_eq!(json.get("status").and_then(|v| v.as_str()), Some("healthy"));
        assert_eq!(
            json.get("local_connections").and_then(serde_json::Value::as_u64),
            Some(1)
        );
    }
}
