//! WebSocket transport for rooms.

pub mod server;
pub mod session;
