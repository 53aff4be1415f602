//! Command push endpoint.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::{SendCommandRequest, SendCommandResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};

/// `POST /users/{user_id}/commands` — Push a command to a user's socket.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] if the user id is blank.
#[utoipa::path(
    post,
    path = "/api/v1/users/{user_id}/commands",
    tag = "Commands",
    summary = "Push a command to a user",
    description = "Publishes a command on the cluster bus. Whichever instance holds the \
                   user's socket forwards it. Delivery is not confirmed.",
    params(
        ("user_id" = String, Path, description = "Target user id"),
    ),
    request_body = SendCommandRequest,
    responses(
        (status = 202, description = "Command handed to the bus", body = SendCommandResponse),
        (status = 400, description = "Blank user id", body = ErrorResponse),
    )
)]
pub async fn send_command(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<SendCommandRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "user id must not be empty".to_string(),
        ));
    }

    state
        .dispatcher
        .send_command_to_user(user_id, req.context)
        .await;

    Ok((
        StatusCode::ACCEPTED,
        Json(SendCommandResponse {
            user_id: user_id.to_string(),
            accepted: true,
            accepted_at: Utc::now(),
        }),
    ))
}

/// Command routes (nested under `/api/v1`).
pub fn routes() -> Router<AppState> {
    Router::new().route("/users/{user_id}/commands", post(send_command))
}
