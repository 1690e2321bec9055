//! Read-only view of the rooms hosted by this process.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/rooms", get(list_rooms))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoomInfo {
    pub room_id: String,
    /// Connections to this room on this process only.
    pub connections: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListRoomsResponse {
    pub rooms: Vec<RoomInfo>,
}

#[utoipa::path(
    get,
    path = "/api/v0/rooms",
    tag = "Rooms",
    responses(
        (status = 200, description = "Locally hosted rooms", body = ListRoomsResponse),
    ),
)]
pub async fn list_rooms(State(state): State<AppState>) -> Json<ListRoomsResponse> {
    let rooms = state
        .rooms
        .registry()
        .room_sizes()
        .into_iter()
        .map(|(room_id, connections)| RoomInfo {
            room_id,
            connections,
        })
        .collect();
    Json(ListRoomsResponse { rooms })
}
