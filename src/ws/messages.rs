//! Wire envelope: one JSON object per text frame, tagged by `msgType`.
//!
//! The same [`Envelope`] type travels over client sockets and over the
//! cluster bus. Client frames carry `auth`/`heartbeat`, server replies
//! carry the `*-result` kinds, and `command`/`kick` are control events
//! published between instances.

use serde::{Deserialize, Serialize};

use crate::domain::SessionId;
use crate::error::DecodeError;

/// Outcome code carried by `auth-result` and `heartbeat-result`.
///
/// Serialized as the integers `0` (success) and `-1` (failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum ResultCode {
    /// `0`
    Success,
    /// `-1`
    Fail,
}

impl From<ResultCode> for i32 {
    fn from(code: ResultCode) -> Self {
        match code {
            ResultCode::Success => 0,
            ResultCode::Fail => -1,
        }
    }
}

impl TryFrom<i32> for ResultCode {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Success),
            -1 => Ok(Self::Fail),
            other => Err(format!("invalid result code {other}")),
        }
    }
}

impl From<bool> for ResultCode {
    fn from(ok: bool) -> Self {
        if ok { Self::Success } else { Self::Fail }
    }
}

/// Discriminator of the six known message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `auth`
    Auth,
    /// `auth-result`
    AuthResult,
    /// `heartbeat`
    Heartbeat,
    /// `heartbeat-result`
    HeartbeatResult,
    /// `command`
    Command,
    /// `kick`
    Kick,
}

impl MessageKind {
    /// Every known kind.
    pub const ALL: [Self; 6] = [
        Self::Auth,
        Self::AuthResult,
        Self::Heartbeat,
        Self::HeartbeatResult,
        Self::Command,
        Self::Kick,
    ];

    /// Returns the `msgType` string used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::AuthResult => "auth-result",
            Self::Heartbeat => "heartbeat",
            Self::HeartbeatResult => "heartbeat-result",
            Self::Command => "command",
            Self::Kick => "kick",
        }
    }

    /// Looks up a kind by its wire string.
    #[must_use]
    pub fn from_wire(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

/// One wire message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "msgType",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum Envelope {
    /// Client credential presentation.
    Auth {
        /// Shared static credential.
        api_key: String,
        /// User to bind; the configured default user when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    /// Server reply to `auth`.
    AuthResult {
        /// Outcome.
        code: ResultCode,
        /// Session id, present on success.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },
    /// Client liveness signal.
    Heartbeat {
        /// Session the heartbeat is for.
        session_id: SessionId,
        /// Client clock in Unix milliseconds.
        time: i64,
    },
    /// Server reply to `heartbeat`.
    HeartbeatResult {
        /// Outcome.
        code: ResultCode,
    },
    /// Application payload relayed to one user's socket.
    Command {
        /// Target user.
        user_id: String,
        /// Opaque application payload.
        context: String,
        /// Publish time in Unix milliseconds.
        time: i64,
    },
    /// Request to close a user's older sessions.
    Kick {
        /// User whose sessions are reconciled.
        user_id: String,
        /// `last_heartbeat` of the session that took over.
        last_heartbeat: i64,
        /// Publish time in Unix milliseconds.
        time: i64,
        /// Session that took over; never closed by this kick. Publishers
        /// that omit it get the plain `last_heartbeat` comparison.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },
}

impl Envelope {
    /// Parses one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MissingType`] or [`DecodeError::UnknownType`]
    /// when `msgType` is absent or unrecognised, and
    /// [`DecodeError::Malformed`] for invalid JSON or missing fields.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let Some(kind) = value.get("msgType").and_then(serde_json::Value::as_str) else {
            return Err(DecodeError::MissingType);
        };
        if MessageKind::from_wire(kind).is_none() {
            return Err(DecodeError::UnknownType(kind.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Serializes to a single JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Returns the message kind.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Auth { .. } => MessageKind::Auth,
            Self::AuthResult { .. } => MessageKind::AuthResult,
            Self::Heartbeat { .. } => MessageKind::Heartbeat,
            Self::HeartbeatResult { .. } => MessageKind::HeartbeatResult,
            Self::Command { .. } => MessageKind::Command,
            Self::Kick { .. } => MessageKind::Kick,
        }
    }
}
