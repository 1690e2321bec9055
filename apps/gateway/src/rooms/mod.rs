//! Room core: local membership, broker subscriptions and the broadcast listener.

pub mod handle;
pub mod listener;
pub mod manager;
pub mod message;
pub mod registry;

use std::fmt;

use crate::broker::BrokerError;

pub use handle::{ClientHandle, SendError};
pub use listener::ListenerState;
pub use manager::RoomManager;
pub use message::RoomMessage;
pub use registry::{RoomRegistry, SharedHandle};

/// Failure of a room lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    /// The room key is empty.
    InvalidRoom,
    /// The handle is already a member of the named room.
    AlreadyJoined(String),
    /// The broker rejected or could not complete the call.
    Broker(BrokerError),
}

impl fmt::Display for RoomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomError::InvalidRoom => f.write_str("room id must not be empty"),
            RoomError::AlreadyJoined(room) => write!(f, "connection is already in room {room}"),
            RoomError::Broker(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for RoomError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RoomError::InvalidRoom | RoomError::AlreadyJoined(_) => None,
            RoomError::Broker(err) => Some(err),
        }
    }
}

impl From<BrokerError> for RoomError {
    fn from(err: BrokerError) -> Self {
        RoomError::Broker(err)
    }
}

fn validate_room(room: &str) -> Result<(), RoomError> {
    if room.is_empty() {
        return Err(RoomError::InvalidRoom);
    }
    Ok(())
}
