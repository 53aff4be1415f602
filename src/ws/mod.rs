//! WebSocket layer: envelope codec, protocol dispatch, connection loop.
//!
//! The WebSocket endpoint (default `/socket`) carries `auth` and
//! `heartbeat` from clients and delivers relayed `command` frames.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod protocol;

pub use messages::{Envelope, MessageKind, ResultCode};
pub use protocol::{AuthSettings, Dispatch, IgnoreReason, ProtocolHandler, Violation};
