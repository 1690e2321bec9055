//! Publish/subscribe broker abstraction.
//!
//! Backed by Redis pub/sub in production and an in-process bus in tests and
//! single-node development.

pub mod memory;
pub mod redis_pubsub;

use std::fmt;

use async_trait::async_trait;

pub use self::memory::{BrokerCall, MemoryBroker, MemoryBus};
pub use self::redis_pubsub::RedisBroker;

/// A message delivered by the broker on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

impl BrokerMessage {
    /// The payload as UTF-8 text, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// A broker call failed (connection lost, broker unavailable, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerError {
    pub message: String,
}

impl BrokerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "broker error: {}", self.message)
    }
}

impl std::error::Error for BrokerError {}

impl From<::redis::RedisError> for BrokerError {
    fn from(err: ::redis::RedisError) -> Self {
        Self::new(err.to_string())
    }
}

/// The capabilities the room core needs from a pub/sub broker.
///
/// `subscribe`/`unsubscribe` act on this process's single subscriber
/// connection; every subscribed channel is multiplexed onto the one stream
/// drained by [`PubSubBroker::next_message`].
#[async_trait]
pub trait PubSubBroker: Send + Sync {
    async fn publish(&self, channel: &str, message: &str) -> Result<(), BrokerError>;
    async fn subscribe(&self, channel: &str) -> Result<(), BrokerError>;
    async fn unsubscribe(&self, channel: &str) -> Result<(), BrokerError>;

    /// Wait for the next message on any subscribed channel.
    ///
    /// `Ok(None)` means the message source has ended and will not yield
    /// anything again. Only one caller is expected at a time.
    async fn next_message(&self) -> Result<Option<BrokerMessage>, BrokerError>;
}
