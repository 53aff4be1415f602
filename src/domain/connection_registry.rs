//! Process-local store of live connections with three lookup indices.
//!
//! [`ConnectionRegistry`] owns every [`Connection`] record in a single
//! map keyed by [`ConnectionId`]. The session and user indices only hold
//! ids pointing back into that map, so a heartbeat updates one record and
//! every view sees it. All indices sit behind one [`tokio::sync::RwLock`];
//! each operation takes the lock once and never awaits while holding it.
//!
//! The registry knows nothing about other instances. Cross-process
//! consistency is the job of [`crate::cluster::ClusterRelay`].

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::connection::{
    CloseReason, Connection, ConnectionHandle, ConnectionId, ConnectionState,
};
use super::SessionId;
use crate::error::RegistryError;

/// Default maximum `now - time` accepted for a heartbeat, in milliseconds.
pub const DEFAULT_HEARTBEAT_TOLERANCE_MS: i64 = 30_000;

#[derive(Debug, Default)]
struct Indices {
    connections: HashMap<ConnectionId, Connection>,
    sessions: HashMap<SessionId, ConnectionId>,
    users: HashMap<String, ConnectionId>,
}

impl Indices {
    fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let conn = self.connections.remove(&id)?;
        self.sessions.remove(&conn.session_id);
        if let Some(user_id) = conn.user_id.as_deref()
            && self.users.get(user_id) == Some(&id)
        {
            self.users.remove(user_id);
        }
        Some(conn)
    }

    fn lookup(&self, id: Option<&ConnectionId>) -> Option<Connection> {
        id.and_then(|id| self.connections.get(id)).cloned()
    }
}

/// Result of a successful [`ConnectionRegistry::authenticate`].
///
/// Carries the `(user_id, last_heartbeat)` snapshot a Kick event needs,
/// plus the connection this process previously indexed for the user.
#[derive(Debug, Clone)]
pub struct AuthGrant {
    /// The user now bound to the connection.
    pub user_id: String,
    /// Session of the newly authenticated connection.
    pub session_id: SessionId,
    /// `last_heartbeat` of the new connection right after authentication.
    pub last_heartbeat: i64,
    /// Previous local holder of the user index entry, if it was another
    /// live connection. It stays open until a Kick is applied.
    pub displaced: Option<Connection>,
}

/// Central store for all live connections of this process.
#[derive(Debug)]
pub struct ConnectionRegistry {
    inner: RwLock<Indices>,
    heartbeat_tolerance_ms: i64,
}

impl ConnectionRegistry {
    /// Creates an empty registry with the default heartbeat tolerance.
    #[must_use]
    pub fn new() -> Self {
        Self::with_heartbeat_tolerance(DEFAULT_HEARTBEAT_TOLERANCE_MS)
    }

    /// Creates an empty registry accepting heartbeats whose `time` lags
    /// `now` by less than `tolerance_ms`.
    #[must_use]
    pub fn with_heartbeat_tolerance(tolerance_ms: i64) -> Self {
        Self {
            inner: RwLock::new(Indices::default()),
            heartbeat_tolerance_ms: tolerance_ms,
        }
    }

    /// Inserts a newly accepted socket in the `Connected` state with a
    /// fresh session id, returning a snapshot of the record.
    pub async fn register(&self, handle: ConnectionHandle, now: i64) -> Connection {
        let conn = Connection::new(handle, now);
        let mut map = self.inner.write().await;
        map.sessions.insert(conn.session_id, conn.id());
        map.connections.insert(conn.id(), conn.clone());
        conn
    }

    /// Binds `user_id` to the connection and points the user index at it,
    /// overwriting any previous entry for that user.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownConnection`] if the connection is
    /// gone and [`RegistryError::AlreadyAuthenticated`] if it already
    /// carries a user id. Neither case mutates any index.
    pub async fn authenticate(
        &self,
        id: ConnectionId,
        user_id: &str,
        now: i64,
    ) -> Result<AuthGrant, RegistryError> {
        let mut map = self.inner.write().await;
        let Some(conn) = map.connections.get_mut(&id) else {
            return Err(RegistryError::UnknownConnection(id));
        };
        if conn.is_authenticated() {
            return Err(RegistryError::AlreadyAuthenticated(id));
        }

        conn.user_id = Some(user_id.to_string());
        conn.state = ConnectionState::Authenticated;
        conn.online_time = now;
        conn.last_heartbeat = now;
        let session_id = conn.session_id;

        let previous = map.users.insert(user_id.to_string(), id);
        let displaced = map.lookup(previous.as_ref().filter(|prev| **prev != id));

        Ok(AuthGrant {
            user_id: user_id.to_string(),
            session_id,
            last_heartbeat: now,
            displaced,
        })
    }

    /// Records a heartbeat observed at client time `observed_time`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::StaleHeartbeat`] if `now - observed_time`
    /// reaches the tolerance, or [`RegistryError::UnknownSession`] if no
    /// live connection has this session id. `last_heartbeat` is left
    /// untouched on failure.
    pub async fn record_heartbeat(
        &self,
        session_id: SessionId,
        observed_time: i64,
        now: i64,
    ) -> Result<(), RegistryError> {
        let skew_ms = now.saturating_sub(observed_time);
        if skew_ms >= self.heartbeat_tolerance_ms {
            return Err(RegistryError::StaleHeartbeat {
                skew_ms,
                tolerance_ms: self.heartbeat_tolerance_ms,
            });
        }

        let mut map = self.inner.write().await;
        let id = map
            .sessions
            .get(&session_id)
            .copied()
            .ok_or(RegistryError::UnknownSession(session_id))?;
        let conn = map
            .connections
            .get_mut(&id)
            .ok_or(RegistryError::UnknownSession(session_id))?;
        conn.last_heartbeat = now;
        Ok(())
    }

    /// Removes a connection from every index it still owns.
    ///
    /// Idempotent: returns the removed record the first time and `None`
    /// afterwards. The user index entry is dropped only if it still points
    /// at this connection.
    pub async fn remove(&self, id: ConnectionId) -> Option<Connection> {
        self.inner.write().await.remove(id)
    }

    /// Removes the connection and asks its writer to send a close frame.
    ///
    /// Returns `false` if the connection was already gone.
    pub async fn close(&self, id: ConnectionId, reason: CloseReason) -> bool {
        let removed = self.remove(id).await;
        match removed {
            Some(conn) => {
                conn.handle.close(reason);
                true
            }
            None => false,
        }
    }

    /// Atomically removes and closes every connection of `user_id` for
    /// which `predicate` holds, returning what was closed.
    pub async fn close_user_where<F>(
        &self,
        user_id: &str,
        reason: CloseReason,
        predicate: F,
    ) -> Vec<Connection>
    where
        F: Fn(&Connection) -> bool,
    {
        let mut map = self.inner.write().await;
        let targets: Vec<ConnectionId> = map
            .connections
            .values()
            .filter(|c| c.user_id.as_deref() == Some(user_id) && predicate(c))
            .map(Connection::id)
            .collect();

        let mut closed = Vec::with_capacity(targets.len());
        for id in targets {
            if let Some(conn) = map.remove(id) {
                conn.handle.close(reason);
                closed.push(conn);
            }
        }
        closed
    }

    /// Returns every connection whose last heartbeat is more than
    /// `timeout_ms` older than `now`. Read-only.
    pub async fn snapshot_stale(&self, now: i64, timeout_ms: i64) -> Vec<Connection> {
        let map = self.inner.read().await;
        map.connections
            .values()
            .filter(|c| now.saturating_sub(c.last_heartbeat) > timeout_ms)
            .cloned()
            .collect()
    }

    /// Returns the connection the user index currently points at.
    pub async fn find_by_user(&self, user_id: &str) -> Option<Connection> {
        let map = self.inner.read().await;
        map.lookup(map.users.get(user_id))
    }

    /// Returns the connection owning `session_id`.
    pub async fn find_by_session(&self, session_id: SessionId) -> Option<Connection> {
        let map = self.inner.read().await;
        map.lookup(map.sessions.get(&session_id))
    }

    /// Returns the connection with the given handle id.
    pub async fn get(&self, id: ConnectionId) -> Option<Connection> {
        self.inner.read().await.connections.get(&id).cloned()
    }

    /// Returns every live connection authenticated as `user_id`,
    /// including ones the user index no longer points at.
    pub async fn connections_for_user(&self, user_id: &str) -> Vec<Connection> {
        let map = self.inner.read().await;
        map.connections
            .values()
            .filter(|c| c.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect()
    }

    /// Returns the number of live connections.
    pub async fn len(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// Returns `true` if no connection is live.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
