//! The JSON payload carried on room channels.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// `{"room_id": ..., "message": ...}` as published to a room channel and
/// delivered to every member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RoomMessage {
    pub room_id: String,
    pub message: String,
}

impl RoomMessage {
    pub fn new(room_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            message: message.into(),
        }
    }

    /// Sent directly to a client once it has joined.
    pub fn joined(room_id: &str) -> Self {
        Self::new(room_id, format!("Joined room - {room_id}"))
    }

    /// Broadcast to the room when a client connects.
    pub fn user_connected(room_id: &str) -> Self {
        Self::new(room_id, format!("User connected to room - {room_id}"))
    }

    /// Broadcast to the room when a client goes away.
    pub fn user_disconnected(room_id: &str) -> Self {
        Self::new(room_id, format!("User disconnected from room - {room_id}"))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("room message is plain strings")
    }
}
