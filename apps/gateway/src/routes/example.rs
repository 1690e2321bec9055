//! Example HTTP endpoint that publishes into a room.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};

use crate::error::{ApiError, ApiErrorBody};
use crate::rooms::RoomMessage;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/example/ping/{room_id}", post(ping))
        .route("/example/ping/{room_id}/", post(ping))
}

// ---------------------------------------------------------------------------
// POST /api/v0/example/ping/{room_id}
// ---------------------------------------------------------------------------

/// Publish `pong` to every member of the room, on every process.
#[utoipa::path(
    post,
    path = "/api/v0/example/ping/{room_id}",
    tag = "Example",
    params(("room_id" = String, Path, description = "Room to publish to")),
    responses(
        (status = 200, description = "Published", body = RoomMessage),
        (status = 503, description = "Broker unavailable", body = ApiErrorBody),
    ),
)]
pub async fn ping(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomMessage>, ApiError> {
    let message = RoomMessage::new(room_id, "pong");
    state.rooms.send_message(&message).await?;
    Ok(Json(message))
}
