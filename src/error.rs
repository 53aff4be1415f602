//! Error types for the relay.
//!
//! [`GatewayError`] is the HTTP-facing error with status code mapping.
//! [`RegistryError`], [`BusError`] and [`DecodeError`] are internal to
//! the realtime core; none of them is ever fatal to the process.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::{ConnectionId, SessionId};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "invalid request: user id must not be empty",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category   | HTTP Status               |
/// |-----------|------------|---------------------------|
/// | 1000–1999 | Validation | 400 Bad Request           |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

/// Rejections raised by [`crate::domain::ConnectionRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No live connection with this handle.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// No live connection with this session id.
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    /// Heartbeat `time` lags `now` by at least the tolerance.
    #[error("stale heartbeat: {skew_ms} ms behind, tolerance {tolerance_ms} ms")]
    StaleHeartbeat {
        /// Observed `now - time` in milliseconds.
        skew_ms: i64,
        /// Configured tolerance in milliseconds.
        tolerance_ms: i64,
    },

    /// The connection already carries a user id.
    #[error("connection {0} is already authenticated")]
    AlreadyAuthenticated(ConnectionId),
}

/// Failures of the cluster broadcast transport.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Redis rejected the command or the connection failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Reasons an inbound text frame is not a usable envelope.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Not JSON, or a known `msgType` with missing/invalid fields.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// No `msgType` string present.
    #[error("missing msgType")]
    MissingType,

    /// `msgType` is not one of the known kinds.
    #[error("unknown msgType {0:?}")]
    UnknownType(String),
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_maps_to_bad_request() {
        let err = GatewayError::InvalidRequest("empty".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), 1001);
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn stale_heartbeat_message_names_both_values() {
        let err = RegistryError::StaleHeartbeat {
            skew_ms: 31_000,
            tolerance_ms: 30_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("31000"));
        assert!(msg.contains("30000"));
    }
}
