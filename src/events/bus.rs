//! Message bus abstraction
//!
//! A topic/offset/consumer-group surface shaped like a log-based broker.
//! The in-process implementation fans out over tokio broadcast channels.

use super::DeliveryError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::warn;

/// A delivered record.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub topic: String,
    pub key: String,
    pub payload: String,
    /// Monotonic per topic, starting at 0.
    pub offset: i64,
}

/// Receiving half handed to a consumer group.
pub struct Subscription {
    pub topic: String,
    pub group: String,
    receiver: broadcast::Receiver<BusMessage>,
}

impl Subscription {
    /// Next message, or `None` once the bus is gone. Lagged gaps are skipped.
    pub async fn next(&mut self) -> Option<BusMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        topic = %self.topic,
                        group = %self.group,
                        skipped,
                        "Consumer lagged, messages dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Establish the producer connection. Safe to call more than once.
    async fn connect(&self) -> Result<(), DeliveryError>;

    /// Append `payload` to `topic`; returns the assigned offset.
    async fn send(&self, topic: &str, key: &str, payload: String) -> Result<i64, DeliveryError>;

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Subscription, DeliveryError>;
}

struct TopicChannel {
    sender: broadcast::Sender<BusMessage>,
    next_offset: i64,
}

/// In-process bus based on tokio broadcast channels.
pub struct InMemoryEventBus {
    topics: Mutex<HashMap<String, TopicChannel>>,
    capacity: usize,
    available: AtomicBool,
}

impl InMemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate a broker outage; sends and connects fail while unavailable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), DeliveryError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DeliveryError::Unavailable("broker unreachable".to_string()))
        }
    }

    fn with_topic<T>(&self, topic: &str, f: impl FnOnce(&mut TopicChannel) -> T) -> Result<T, DeliveryError> {
        let mut topics = self
            .topics
            .lock()
            .map_err(|_| DeliveryError::Unavailable("topic table poisoned".to_string()))?;
        let channel = topics.entry(topic.to_string()).or_insert_with(|| TopicChannel {
            sender: broadcast::channel(self.capacity).0,
            next_offset: 0,
        });
        Ok(f(channel))
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn connect(&self) -> Result<(), DeliveryError> {
        self.ensure_available()
    }

    async fn send(&self, topic: &str, key: &str, payload: String) -> Result<i64, DeliveryError> {
        self.ensure_available()?;

        self.with_topic(topic, |channel| {
            let offset = channel.next_offset;
            channel.next_offset += 1;
            // No subscribers is not an error; the offset is still consumed.
            let _ = channel.sender.send(BusMessage {
                topic: topic.to_string(),
                key: key.to_string(),
                payload,
                offset,
            });
            offset
        })
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Subscription, DeliveryError> {
        let receiver = self.with_topic(topic, |channel| channel.sender.subscribe())?;
        Ok(Subscription {
            topic: topic.to_string(),
            group: group.to_string(),
            receiver,
        })
    }
}
