//! In-process pub/sub bus.
//!
//! A [`MemoryBus`] plays the role of the broker server; every
//! [`MemoryBroker`] connected to it behaves like one process's broker
//! client. Connecting several brokers to one bus simulates a fleet of
//! processes sharing Redis. Each broker records the calls made on it so
//! tests can assert on subscribe/unsubscribe traffic.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{BrokerError, BrokerMessage, PubSubBroker};

/// A call made on a [`MemoryBroker`], in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    Publish { channel: String, message: String },
    Subscribe(String),
    Unsubscribe(String),
}

/// Per-client state shared between the bus and the client.
struct Subscriber {
    channels: Mutex<HashSet<String>>,
    /// Taken on [`MemoryBroker::close`] so the receiving side sees the end of the stream.
    tx: Mutex<Option<mpsc::UnboundedSender<BrokerMessage>>>,
}

impl Subscriber {
    fn deliver(&self, msg: BrokerMessage) {
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.send(msg);
        }
    }
}

/// The shared bus all in-memory broker clients publish through.
#[derive(Clone, Default)]
pub struct MemoryBus {
    subscribers: Arc<Mutex<Vec<Weak<Subscriber>>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new client connection on this bus.
    pub fn connect(&self) -> MemoryBroker {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber = Arc::new(Subscriber {
            channels: Mutex::new(HashSet::new()),
            tx: Mutex::new(Some(tx)),
        });
        self.subscribers.lock().push(Arc::downgrade(&subscriber));

        MemoryBroker {
            bus: self.clone(),
            subscriber,
            rx: tokio::sync::Mutex::new(rx),
            calls: Mutex::new(Vec::new()),
            available: Mutex::new(true),
        }
    }

    /// Deliver `message` to every client subscribed to `channel`.
    /// Returns the number of clients it was delivered to.
    fn publish(&self, channel: &str, message: &str) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|weak| weak.strong_count() > 0);

        let mut delivered = 0;
        for subscriber in subscribers.iter().filter_map(Weak::upgrade) {
            if subscriber.channels.lock().contains(channel) {
                subscriber.deliver(BrokerMessage {
                    channel: channel.to_string(),
                    payload: message.as_bytes().to_vec(),
                });
                delivered += 1;
            }
        }
        delivered
    }
}

/// One process's connection to a [`MemoryBus`].
pub struct MemoryBroker {
    bus: MemoryBus,
    subscriber: Arc<Subscriber>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<BrokerMessage>>,
    calls: Mutex<Vec<BrokerCall>>,
    available: Mutex<bool>,
}

impl MemoryBroker {
    /// A broker on its own private bus.
    pub fn new() -> Self {
        MemoryBus::new().connect()
    }

    /// Make every subsequent publish/subscribe/unsubscribe fail (or succeed
    /// again). Calls made while unavailable are not recorded.
    pub fn set_available(&self, available: bool) {
        *self.available.lock() = available;
    }

    /// End the message stream, as if the subscriber connection was lost.
    pub fn close(&self) {
        self.subscriber.tx.lock().take();
    }

    /// Push a raw message into this client's stream, bypassing subscriptions.
    pub fn inject(&self, channel: &str, payload: impl Into<Vec<u8>>) {
        self.subscriber.deliver(BrokerMessage {
            channel: channel.to_string(),
            payload: payload.into(),
        });
    }

    /// Every successful call made on this broker, oldest first.
    pub fn calls(&self) -> Vec<BrokerCall> {
        self.calls.lock().clone()
    }

    pub fn subscribe_count(&self, channel: &str) -> usize {
        self.count(|call| matches!(call, BrokerCall::Subscribe(c) if c == channel))
    }

    pub fn unsubscribe_count(&self, channel: &str) -> usize {
        self.count(|call| matches!(call, BrokerCall::Unsubscribe(c) if c == channel))
    }

    /// Channels currently subscribed, sorted.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.subscriber.channels.lock().iter().cloned().collect();
        channels.sort();
        channels
    }

    fn count(&self, pred: impl Fn(&BrokerCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| pred(call)).count()
    }

    fn check_available(&self) -> Result<(), BrokerError> {
        if *self.available.lock() {
            Ok(())
        } else {
            Err(BrokerError::new("broker unavailable"))
        }
    }

    fn record(&self, call: BrokerCall) {
        self.calls.lock().push(call);
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSubBroker for MemoryBroker {
    async fn publish(&self, channel: &str, message: &str) -> Result<(), BrokerError> {
        self.check_available()?;
        self.record(BrokerCall::Publish {
            channel: channel.to_string(),
            message: message.to_string(),
        });
        let delivered = self.bus.publish(channel, message);
        tracing::trace!(%channel, delivered, "memory bus publish");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<(), BrokerError> {
        self.check_available()?;
        self.record(BrokerCall::Subscribe(channel.to_string()));
        self.subscriber.channels.lock().insert(channel.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), BrokerError> {
        self.check_available()?;
        self.record(BrokerCall::Unsubscribe(channel.to_string()));
        self.subscriber.channels.lock().remove(channel);
        Ok(())
    }

    async fn next_message(&self) -> Result<Option<BrokerMessage>, BrokerError> {
        Ok(self.rx.lock().await.recv().await)
    }
}
