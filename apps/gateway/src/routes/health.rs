use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::rooms::ListenerState;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok`, or `degraded` once the broadcast listener has stopped.
    pub status: String,
    pub listener: ListenerState,
    pub rooms: usize,
    pub connections: usize,
    pub started_at: DateTime<Utc>,
}

/// Process health. A stopped listener means no further broadcasts can be
/// delivered here, so it reports 503 for the orchestrator to restart us.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Healthy", body = HealthResponse),
        (status = 503, description = "Broadcast listener stopped", body = HealthResponse),
    ),
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let listener = state.rooms.listener_state();
    let registry = state.rooms.registry();

    let (code, status) = match listener {
        ListenerState::Stopped => (StatusCode::SERVICE_UNAVAILABLE, "degraded"),
        ListenerState::NotStarted | ListenerState::Running => (StatusCode::OK, "ok"),
    };

    let body = HealthResponse {
        status: status.to_string(),
        listener,
        rooms: registry.room_count(),
        connections: registry.connection_count(),
        started_at: state.started_at,
    };
    (code, Json(body))
}
