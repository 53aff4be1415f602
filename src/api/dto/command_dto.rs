//! Command push DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request body for `POST /api/v1/users/{user_id}/commands`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SendCommandRequest {
    /// Opaque payload delivered to the client as the command `context`.
    pub context: String,
}

/// Response body for `POST /api/v1/users/{user_id}/commands`.
///
/// Acceptance only means the command was handed to the cluster bus;
/// delivery is never confirmed.
#[derive(Debug, Serialize, ToSchema)]
pub struct SendCommandResponse {
    /// Target user.
    pub user_id: String,
    /// Always `true`; present so clients can distinguish it from errors.
    pub accepted: bool,
    /// When the command was accepted.
    pub accepted_at: DateTime<Utc>,
}
