//! Domain layer: session identity, connection records and the registry.
//!
//! This module holds the process-local model of live sockets: the
//! [`SessionId`] handed to clients, the [`Connection`] record with its
//! writer [`ConnectionHandle`], and the [`ConnectionRegistry`] indexing
//! them by handle, session and user.

pub mod connection;
pub mod connection_registry;
pub mod session_id;

pub use connection::{
    CloseReason, Connection, ConnectionHandle, ConnectionId, ConnectionState, HandleClosed,
    Outbound, now_millis,
};
pub use connection_registry::{
    AuthGrant, ConnectionRegistry, DEFAULT_HEARTBEAT_TOLERANCE_MS,
};
pub use session_id::SessionId;
