//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::cluster::ClusterRelay;
use crate::domain::ConnectionRegistry;
use crate::service::CommandDispatcher;
use crate::ws::{AuthSettings, ProtocolHandler};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Process-local connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Dispatch for frames arriving on client sockets.
    pub protocol: Arc<ProtocolHandler>,
    /// Command entry point for business logic.
    pub dispatcher: CommandDispatcher,
}

impl AppState {
    /// Wires the protocol handler and dispatcher around one registry and
    /// relay.
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        relay: Arc<ClusterRelay>,
        auth: AuthSettings,
    ) -> Self {
        let protocol = Arc::new(ProtocolHandler::new(
            Arc::clone(&registry),
            Arc::clone(&relay),
            auth,
        ));
        Self {
            registry,
            protocol,
            dispatcher: CommandDispatcher::new(relay),
        }
    }
}
