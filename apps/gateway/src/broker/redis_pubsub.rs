//! Redis pub/sub broker.
//!
//! Publishing goes through a `ConnectionManager` (reconnects on its own).
//! Subscriptions live on one dedicated pub/sub connection that is split into
//! a command sink and a message stream, so SUBSCRIBE/UNSUBSCRIBE never wait
//! on the listener draining messages.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use redis::aio::{ConnectionManager, PubSubSink};
use redis::AsyncCommands;
use tokio::sync::Mutex;

use super::{BrokerError, BrokerMessage, PubSubBroker};

type MessageStream = Pin<Box<dyn Stream<Item = redis::Msg> + Send>>;

pub struct RedisBroker {
    publisher: ConnectionManager,
    sink: Mutex<PubSubSink>,
    stream: Mutex<MessageStream>,
}

impl RedisBroker {
    /// Open the publisher and subscriber connections to `redis_url`.
    pub async fn connect(redis_url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url)?;
        let publisher = ConnectionManager::new(client.clone()).await?;
        let (sink, stream) = client.get_async_pubsub().await?.split();

        tracing::info!("redis broker connected");

        Ok(Self {
            publisher,
            sink: Mutex::new(sink),
            stream: Mutex::new(Box::pin(stream)),
        })
    }
}

#[async_trait]
impl PubSubBroker for RedisBroker {
    async fn publish(&self, channel: &str, message: &str) -> Result<(), BrokerError> {
        let mut conn = self.publisher.clone();
        conn.publish::<_, _, ()>(channel, message).await.map_err(|e| {
            tracing::error!(?e, %channel, "redis publish failed");
            BrokerError::from(e)
        })
    }

    async fn subscribe(&self, channel: &str) -> Result<(), BrokerError> {
        self.sink.lock().await.subscribe(channel).await.map_err(|e| {
            tracing::error!(?e, %channel, "redis subscribe failed");
            BrokerError::from(e)
        })
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), BrokerError> {
        self.sink.lock().await.unsubscribe(channel).await.map_err(|e| {
            tracing::error!(?e, %channel, "redis unsubscribe failed");
            BrokerError::from(e)
        })
    }

    async fn next_message(&self) -> Result<Option<BrokerMessage>, BrokerError> {
        // The stream ends when the pub/sub connection drops.
        let msg = self.stream.lock().await.next().await;
        Ok(msg.map(|msg| BrokerMessage {
            channel: msg.get_channel_name().to_string(),
            payload: msg.get_payload_bytes().to_vec(),
        }))
    }
}
