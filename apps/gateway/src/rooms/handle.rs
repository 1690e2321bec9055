//! The transport-facing capability a room member must provide.

use std::fmt;

/// Why a text frame could not be handed to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The connection has already gone away.
    Closed,
    /// The client is not draining its outbound queue fast enough.
    Full,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Closed => f.write_str("connection closed"),
            SendError::Full => f.write_str("outbound queue full"),
        }
    }
}

impl std::error::Error for SendError {}

/// One live client connection, as seen by the room core.
///
/// Handles are compared by [`ClientHandle::id`], which must be unique for
/// the lifetime of the process. `send_text` must not block: the broadcast
/// listener calls it for every member of a room in turn.
pub trait ClientHandle: Send + Sync {
    fn id(&self) -> &str;
    fn send_text(&self, text: &str) -> Result<(), SendError>;
}
