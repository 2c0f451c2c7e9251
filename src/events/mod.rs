//! Transfer events and the best-effort publisher
//!
//! Delivery is at-most-once from the producer's side: a failed publish is
//! reported to the caller as `Err(DeliveryError)` and the caller logs it and
//! carries on. Ledger writes never wait on, or roll back for, the bus.

pub mod bus;

pub use bus::{BusMessage, EventBus, InMemoryEventBus, Subscription};

use crate::config::EventSettings;
use crate::error::BankingError;
use crate::models::Transaction;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferEventType {
    TransferInitiated,
    TransferCompleted,
    TransferFailed,
}

impl TransferEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferEventType::TransferInitiated => "TRANSFER_INITIATED",
            TransferEventType::TransferCompleted => "TRANSFER_COMPLETED",
            TransferEventType::TransferFailed => "TRANSFER_FAILED",
        }
    }
}

/// Wire envelope: `{ type, fromAccount, toAccount, amount, reference, timestamp }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferEvent {
    #[serde(rename = "type")]
    pub event_type: TransferEventType,
    pub from_account: String,
    pub to_account: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub reference: String,
    pub timestamp: DateTime<Utc>,
}

impl TransferEvent {
    pub fn new(
        event_type: TransferEventType,
        from_account: impl Into<String>,
        to_account: impl Into<String>,
        amount: Decimal,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            from_account: from_account.into(),
            to_account: to_account.into(),
            amount,
            reference: reference.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn for_transaction(event_type: TransferEventType, record: &Transaction) -> Self {
        Self::new(
            event_type,
            record.from_account.clone(),
            record.to_account.clone(),
            record.amount,
            record.reference.clone(),
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("event publishing is disabled")]
    Disabled,

    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode event: {0}")]
    Encode(String),
}

impl From<DeliveryError> for BankingError {
    fn from(e: DeliveryError) -> Self {
        BankingError::DeliveryError(e.to_string())
    }
}

/// Acknowledgement for a published event.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub offset: i64,
    pub reference: String,
}

/// Producer side. Connects on first use and reuses the connection.
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
    topic: String,
    enabled: bool,
    connected: OnceCell<()>,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn EventBus>, settings: &EventSettings) -> Self {
        Self {
            bus,
            topic: settings.topic.clone(),
            enabled: settings.enabled,
            connected: OnceCell::new(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn publish(&self, event: &TransferEvent) -> Result<Published, DeliveryError> {
        if !self.enabled {
            return Err(DeliveryError::Disabled);
        }

        self.connected
            .get_or_try_init(|| async { self.bus.connect().await })
            .await?;

        let payload =
            serde_json::to_string(event).map_err(|e| DeliveryError::Encode(e.to_string()))?;
        let offset = self
            .bus
            .send(&self.topic, &event.reference, payload)
            .await?;

        debug!(
            event = event.event_type.as_str(),
            reference = %event.reference,
            offset,
            "Event published"
        );

        Ok(Published {
            topic: self.topic.clone(),
            offset,
            reference: event.reference.clone(),
        })
    }

    /// Publish and log a failure instead of returning it.
    pub async fn publish_best_effort(&self, event: &TransferEvent) -> Option<Published> {
        match self.publish(event).await {
            Ok(published) => Some(published),
            Err(DeliveryError::Disabled) => None,
            Err(e) => {
                warn!(
                    event = event.event_type.as_str(),
                    reference = %event.reference,
                    error = %e,
                    "Event publish failed, continuing"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn publisher(bus: Arc<InMemoryEventBus>, enabled: bool) -> EventPublisher {
        let settings = EventSettings {
            enabled,
            ..EventSettings::default()
        };
        EventPublisher::new(bus, &settings)
    }

    #[test]
    fn test_envelope_wire_format() {
        let event = TransferEvent::new(
            TransferEventType::TransferCompleted,
            "OW10001",
            "OW10002",
            dec!(500),
            "TXN-12345678",
        );
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "TRANSFER_COMPLETED");
        assert_eq!(json["fromAccount"], "OW10001");
        assert_eq!(json["toAccount"], "OW10002");
        assert_eq!(json["amount"], 500.0);
        assert_eq!(json["reference"], "TXN-12345678");
        assert!(json["timestamp"].is_string());

        let back: TransferEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.amount, dec!(500));
    }

    #[tokio::test]
    async fn test_publish_delivers_to_subscriber() {
        let bus = Arc::new(InMemoryEventBus::new(8));
        let mut sub = bus.subscribe("owbank-transfers", "test").await.unwrap();
        let publisher = publisher(bus.clone(), true);

        let event = TransferEvent::new(
            TransferEventType::TransferInitiated,
            "OW10001",
            "OW10002",
            dec!(1),
            "TXN-AAAAAAAA",
        );
        let published = publisher.publish(&event).await.unwrap();
        assert_eq!(published.offset, 0);

        let message = sub.next().await.unwrap();
        assert_eq!(message.key, "TXN-AAAAAAAA");
    }

    #[tokio::test]
    async fn test_failures_are_reported_not_raised() {
        let bus = Arc::new(InMemoryEventBus::new(8));
        bus.set_available(false);
        let publisher = publisher(bus.clone(), true);
        let event = TransferEvent::new(
            TransferEventType::TransferFailed,
            "OW10001",
            "OW10002",
            dec!(1),
            "TXN-BBBBBBBB",
        );

        assert!(matches!(
            publisher.publish(&event).await,
            Err(DeliveryError::Unavailable(_))
        ));
        assert!(publisher.publish_best_effort(&event).await.is_none());

        // Connection is retried once the broker is back.
        bus.set_available(true);
        assert!(publisher.publish(&event).await.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_publisher_never_sends() {
        let bus = Arc::new(InMemoryEventBus::new(8));
        let publisher = publisher(bus, false);
        let event = TransferEvent::new(
            TransferEventType::TransferCompleted,
            "A",
            "B",
            dec!(1),
            "TXN-CCCCCCCC",
        );
        assert_eq!(publisher.publish(&event).await, Err(DeliveryError::Disabled));
    }
}
