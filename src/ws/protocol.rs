//! Per-connection message dispatch.
//!
//! [`ProtocolHandler::handle_text`] turns one inbound frame into a
//! [`Dispatch`] telling the socket loop what to send back. The connection
//! state machine is `Connected → Authenticated`, with removal from the
//! registry standing in for `Closed`.
//!
//! Undecodable frames yield [`Dispatch::Ignored`]: no reply, no close.
//! Server-only message kinds yield [`Dispatch::Rejected`], which the
//! socket loop logs and otherwise drops.

use std::sync::Arc;

use crate::cluster::ClusterRelay;
use crate::domain::{
    CloseReason, ConnectionId, ConnectionRegistry, SessionId, now_millis,
};
use crate::error::{DecodeError, RegistryError};

use super::messages::{Envelope, MessageKind, ResultCode};

/// Why a frame was dropped without a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not JSON or missing required fields.
    Malformed,
    /// No `msgType`.
    MissingType,
    /// `msgType` outside the known set.
    UnknownType(String),
    /// The connection left the registry while the frame was in flight.
    ConnectionGone,
}

impl From<DecodeError> for IgnoreReason {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Malformed(_) => Self::Malformed,
            DecodeError::MissingType => Self::MissingType,
            DecodeError::UnknownType(kind) => Self::UnknownType(kind),
        }
    }
}

/// Client frames that break the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// A server-to-client or relay-only kind arrived from a client.
    ServerOnlyKind(MessageKind),
    /// `auth` on a connection that is already authenticated.
    AlreadyAuthenticated,
}

/// What the socket loop must do in response to one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Send this reply.
    Reply(Envelope),
    /// Send this reply, then close the socket.
    ReplyAndClose(Envelope, CloseReason),
    /// Drop silently.
    Ignored(IgnoreReason),
    /// Drop as a protocol violation.
    Rejected(Violation),
}

/// Credential settings for `auth`.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// The single shared credential clients must present.
    pub api_key: String,
    /// User bound when `auth` names none.
    pub default_user_id: String,
}

/// Dispatches client frames against the registry and the relay.
#[derive(Debug)]
pub struct ProtocolHandler {
    registry: Arc<ConnectionRegistry>,
    relay: Arc<ClusterRelay>,
    auth: AuthSettings,
}

impl ProtocolHandler {
    /// Creates a handler.
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        relay: Arc<ClusterRelay>,
        auth: AuthSettings,
    ) -> Self {
        Self {
            registry,
            relay,
            auth,
        }
    }

    /// Returns the registry this handler mutates.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Handles one text frame received on connection `id`.
    pub async fn handle_text(&self, id: ConnectionId, text: &str) -> Dispatch {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => return Dispatch::Ignored(e.into()),
        };

        match envelope {
            Envelope::Auth { api_key, user_id } => {
                self.handle_auth(id, &api_key, user_id).await
            }
            Envelope::Heartbeat { session_id, time } => {
                self.handle_heartbeat(session_id, time).await
            }
            other => Dispatch::Rejected(Violation::ServerOnlyKind(other.kind())),
        }
    }

    async fn handle_auth(
        &self,
        id: ConnectionId,
        api_key: &str,
        user_id: Option<String>,
    ) -> Dispatch {
        if api_key != self.auth.api_key {
            tracing::info!(connection = %id, "auth rejected: bad credential");
            return Dispatch::ReplyAndClose(
                Envelope::AuthResult {
                    code: ResultCode::Fail,
                    session_id: None,
                },
                CloseReason::UNAUTHORIZED,
            );
        }

        let user_id = user_id
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| self.auth.default_user_id.clone());
        let now = now_millis();

        let grant = match self.registry.authenticate(id, &user_id, now).await {
            Ok(grant) => grant,
            Err(RegistryError::AlreadyAuthenticated(_)) => {
                return Dispatch::Rejected(Violation::AlreadyAuthenticated);
            }
            Err(_) => return Dispatch::Ignored(IgnoreReason::ConnectionGone),
        };

        if let Some(prev) = &grant.displaced {
            tracing::info!(
                %user_id,
                previous_session = %prev.session_id,
                "user re-authenticated; previous session will be kicked"
            );
        }

        // other instances may hold older sessions of this user, so the kick
        // is published even when nothing was displaced locally
        self.relay
            .publish(&Envelope::Kick {
                user_id: grant.user_id.clone(),
                last_heartbeat: grant.last_heartbeat,
                time: now,
                session_id: Some(grant.session_id),
            })
            .await;

        tracing::info!(
            %user_id,
            session_id = %grant.session_id,
            "connection authenticated"
        );
        Dispatch::Reply(Envelope::AuthResult {
            code: ResultCode::Success,
            session_id: Some(grant.session_id),
        })
    }

    async fn handle_heartbeat(&self, session_id: SessionId, time: i64) -> Dispatch {
        let result = self
            .registry
            .record_heartbeat(session_id, time, now_millis())
            .await;
        if let Err(e) = &result {
            tracing::debug!(%session_id, error = %e, "heartbeat rejected");
        }
        Dispatch::Reply(Envelope::HeartbeatResult {
            code: result.is_ok().into(),
        })
    }
}
