pub mod example;
pub mod health;
pub mod rooms;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest(
            "/api/v0",
            rooms::router().merge(example::router()),
        )
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Rooms
        rooms::list_rooms,
        // Example
        example::ping,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            // Room payloads
            crate::rooms::RoomMessage,
            crate::rooms::ListenerState,
            // Route request/response types
            health::HealthResponse,
            rooms::RoomInfo,
            rooms::ListRoomsResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Rooms", description = "Local room membership"),
        (name = "Example", description = "Publishing into rooms over HTTP"),
    )
)]
pub struct ApiDoc;
