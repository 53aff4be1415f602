//! Live connection record and the handle used to reach its socket.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::mpsc;

use super::SessionId;

/// Returns the current wall-clock time in Unix milliseconds.
///
/// All connection timestamps and wire `time` fields use this unit.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-local identifier of one accepted socket.
///
/// Primary key of the [`super::ConnectionRegistry`]. Never leaves the
/// process; the client only ever sees the [`SessionId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// WebSocket close code and reason sent when the server ends a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseReason {
    /// RFC 6455 close code.
    pub code: u16,
    /// Human-readable reason sent in the close frame.
    pub reason: &'static str,
}

impl CloseReason {
    /// Authentication failed (1008, policy violation).
    pub const UNAUTHORIZED: Self = Self {
        code: 1008,
        reason: "unauthorized",
    };

    /// No heartbeat within the timeout window (1000, normal closure).
    pub const HEARTBEAT_TIMEOUT: Self = Self {
        code: 1000,
        reason: "heartbeat timeout",
    };

    /// A newer session for the same user took over (1000, normal closure).
    pub const KICKED: Self = Self {
        code: 1000,
        reason: "kick connection",
    };
}

/// Instruction for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send a text frame.
    Text(String),
    /// Send a close frame and stop writing.
    Close(CloseReason),
}

/// Error returned when the writer task of a connection has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection {0} is no longer writable")]
pub struct HandleClosed(pub ConnectionId);

/// Cloneable handle to one socket's writer task.
///
/// Writes are queued on an unbounded channel and drained by the task that
/// owns the WebSocket sink, so enqueuing never awaits.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    /// Creates a handle with a fresh [`ConnectionId`] and the receiving
    /// end the writer task should drain.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: ConnectionId::next(),
                tx,
            },
            rx,
        )
    }

    /// Returns the connection identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`HandleClosed`] if the writer task has already exited.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), HandleClosed> {
        self.tx
            .send(Outbound::Text(text.into()))
            .map_err(|_| HandleClosed(self.id))
    }

    /// Queues a close frame. Closing an already closed socket is a no-op.
    pub fn close(&self, reason: CloseReason) {
        let _ = self.tx.send(Outbound::Close(reason));
    }

    /// Returns `true` once the writer task has dropped its receiver.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Authentication state of a connection. `Closed` is represented by
/// removal from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket accepted, no valid `auth` yet.
    Connected,
    /// `auth` accepted; `user_id` is set.
    Authenticated,
}

/// One live client socket plus its session metadata.
///
/// The registry owns these records; lookups hand out clones, which share
/// the same underlying [`ConnectionHandle`].
#[derive(Debug, Clone)]
pub struct Connection {
    /// Handle to the socket writer.
    pub handle: ConnectionHandle,
    /// Server-generated session identifier (immutable).
    pub session_id: SessionId,
    /// Authenticated user; `None` while [`ConnectionState::Connected`].
    pub user_id: Option<String>,
    /// Connect (or authentication) time in Unix milliseconds.
    pub online_time: i64,
    /// Last accepted heartbeat in Unix milliseconds.
    pub last_heartbeat: i64,
    /// Current protocol state.
    pub state: ConnectionState,
}

impl Connection {
    /// Creates a freshly connected record stamped with `now`.
    #[must_use]
    pub fn new(handle: ConnectionHandle, now: i64) -> Self {
        Self {
            handle,
            session_id: SessionId::new(),
            user_id: None,
            online_time: now,
            last_heartbeat: now,
            state: ConnectionState::Connected,
        }
    }

    /// Returns the connection identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    /// Returns `true` if the connection has passed authentication.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state == ConnectionState::Authenticated
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let (a, _rx_a) = ConnectionHandle::channel();
        let (b, _rx_b) = ConnectionHandle::channel();
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn handle_queues_frames_in_order() {
        let (handle, mut rx) = ConnectionHandle::channel();
        assert!(handle.send_text("one").is_ok());
        handle.close(CloseReason::KICKED);

        assert_eq!(rx.recv().await, Some(Outbound::Text("one".to_string())));
        assert_eq!(rx.recv().await, Some(Outbound::Close(CloseReason::KICKED)));
    }

    #[test]
    fn send_after_writer_gone_fails() {
        let (handle, rx) = ConnectionHandle::channel();
        drop(rx);
        assert!(handle.is_closed());
        assert_eq!(handle.send_text("x"), Err(HandleClosed(handle.id())));
        // closing twice on a dead socket stays silent
        handle.close(CloseReason::HEARTBEAT_TIMEOUT);
        handle.close(CloseReason::HEARTBEAT_TIMEOUT);
    }

    #[test]
    fn new_connection_starts_unauthenticated() {
        let (handle, _rx) = ConnectionHandle::channel();
        let conn = Connection::new(handle, 1_000);
        assert_eq!(conn.state, ConnectionState::Connected);
        assert!(conn.user_id.is_none());
        assert_eq!(conn.online_time, 1_000);
        assert_eq!(conn.last_heartbeat, 1_000);
    }
}
