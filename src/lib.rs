//! # session-relay
//!
//! Clustered WebSocket session manager.
//!
//! Tracks live client sockets, authenticates them against a shared
//! credential, expires them when heartbeats stop, and lets backend code
//! push commands to a user's socket even when that socket lives on
//! another instance. Instances share nothing but a broadcast channel
//! (Redis pub/sub, or an in-process bus for a single instance).
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket)          Business logic (HTTP)
//!     │                              │
//!     ├── WS loop + Protocol (ws/)   ├── REST Handlers (api/)
//!     │                              ├── CommandDispatcher (service/)
//!     │                              │
//!     ├── ConnectionRegistry ◄── ClusterRelay (cluster/) ◄──► Bus
//!     │   (domain/)
//!     └── HeartbeatSweeper (service/)
//! ```

pub mod api;
pub mod app_state;
pub mod cluster;
pub mod config;
pub mod domain;
pub mod error;
pub mod server;
pub mod service;
pub mod ws;
