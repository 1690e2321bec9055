pub mod broker;
pub mod config;
pub mod error;
pub mod gateway;
pub mod rooms;
pub mod routes;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use config::Config;
use rooms::RoomManager;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RoomManager>,
    pub config: Arc<Config>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(rooms: Arc<RoomManager>, config: Config) -> Self {
        Self {
            rooms,
            config: Arc::new(config),
            started_at: Utc::now(),
        }
    }
}
