//! Reconciliation consumer
//!
//! Runs apart from the request path, reading transfer events and tightening
//! the matching transaction records. Every step is idempotent so redelivery
//! under at-least-once semantics leaves the ledger as a single pass would.

use crate::events::{BusMessage, EventBus, Subscription, TransferEvent, TransferEventType};
use crate::ledger::LedgerStore;
use crate::models::{Transaction, TransactionStatus, TransactionType};
use crate::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What a single message did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    PlaceholderInserted,
    Stamped,
    MarkedFailed,
    Unchanged,
    Skipped,
}

pub struct ReconciliationConsumer {
    ledger: Arc<dyn LedgerStore>,
}

impl ReconciliationConsumer {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Apply one bus message. Malformed payloads are skipped with a warning.
    pub async fn handle(&self, message: &BusMessage) -> Result<ReconcileOutcome> {
        let event: TransferEvent = match serde_json::from_str(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(offset = message.offset, error = %e, "Skipping malformed bus message");
                return Ok(ReconcileOutcome::Skipped);
            }
        };

        let outcome = match event.event_type {
            TransferEventType::TransferInitiated => {
                let placeholder = Transaction::new(
                    event.reference.clone(),
                    event.from_account.clone(),
                    event.to_account.clone(),
                    event.amount,
                    TransactionType::Transfer,
                    TransactionStatus::Pending,
                    format!("Transfer to {}", event.to_account),
                );
                if self.ledger.insert_pending_if_absent(placeholder).await? {
                    ReconcileOutcome::PlaceholderInserted
                } else {
                    ReconcileOutcome::Unchanged
                }
            }
            TransferEventType::TransferCompleted => {
                if self
                    .ledger
                    .stamp_delivery(&event.reference, message.offset)
                    .await?
                {
                    info!(
                        reference = %event.reference,
                        offset = message.offset,
                        "Transaction stamped with delivery offset"
                    );
                    ReconcileOutcome::Stamped
                } else {
                    ReconcileOutcome::Unchanged
                }
            }
            TransferEventType::TransferFailed => {
                if self.ledger.mark_failed(&event.reference).await? {
                    info!(reference = %event.reference, "Transaction marked failed");
                    ReconcileOutcome::MarkedFailed
                } else {
                    ReconcileOutcome::Unchanged
                }
            }
        };

        debug!(
            event = event.event_type.as_str(),
            reference = %event.reference,
            ?outcome,
            "Reconciled event"
        );
        Ok(outcome)
    }

    /// Consume until the subscription closes or `shutdown` flips to `true`.
    pub async fn run(&self, mut subscription: Subscription, mut shutdown: watch::Receiver<bool>) {
        info!(
            topic = %subscription.topic,
            group = %subscription.group,
            "Reconciliation consumer started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                message = subscription.next() => {
                    let Some(message) = message else { break };
                    if let Err(e) = self.handle(&message).await {
                        warn!(offset = message.offset, error = %e, "Failed to reconcile message");
                    }
                }
            }
        }

        info!("Reconciliation consumer stopped");
    }
}

/// Handle to a spawned consumer.
pub struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Reconciliation consumer task ended abnormally");
        }
    }
}

/// Subscribe and spawn the consumer as an independent task.
pub async fn spawn_consumer(
    ledger: Arc<dyn LedgerStore>,
    bus: Arc<dyn EventBus>,
    topic: &str,
    group: &str,
) -> Result<ConsumerHandle> {
    let subscription = bus.subscribe(topic, group).await?;
    let (shutdown, shutdown_rx) = watch::channel(false);
    let consumer = ReconciliationConsumer::new(ledger);

    let task = tokio::spawn(async move {
        consumer.run(subscription, shutdown_rx).await;
    });

    Ok(ConsumerHandle { shutdown, task })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{InMemoryLedger, LedgerEntry};
    use crate::models::{AccountType, NewAccount};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn message(event: &TransferEvent, offset: i64) -> BusMessage {
        BusMessage {
            topic: "owbank-transfers".to_string(),
            key: event.reference.clone(),
            payload: serde_json::to_string(event).unwrap(),
            offset,
        }
    }

    async fn funded_ledger() -> Arc<InMemoryLedger> {
        let ledger = Arc::new(InMemoryLedger::new());
        for _ in 0..2 {
            ledger
                .open_account(NewAccount {
                    owner_id: Uuid::new_v4(),
                    holder_name: "Holder".to_string(),
                    account_type: AccountType::Checking,
                    currency: "USD".to_string(),
                    opening_bonus: dec!(1000),
                    number_prefix: "OW".to_string(),
                    first_number: 10001,
                })
                .await
                .unwrap();
        }
        ledger
    }

    #[tokio::test]
    async fn test_duplicate_completed_event_is_noop() {
        let ledger = funded_ledger().await;
        let record = Transaction::new(
            "TXN-0000AAAA",
            "OW10001",
            "OW10002",
            dec!(500),
            TransactionType::Transfer,
            TransactionStatus::Completed,
            "Transfer to OW10002",
        );
        ledger.apply(LedgerEntry::transfer(record.clone())).await.unwrap();

        let consumer = ReconciliationConsumer::new(ledger.clone());
        let completed = TransferEvent::for_transaction(TransferEventType::TransferCompleted, &record);

        assert_eq!(
            consumer.handle(&message(&completed, 4)).await.unwrap(),
            ReconcileOutcome::Stamped
        );
        let first = ledger.find_transaction("TXN-0000AAAA").await.unwrap().unwrap();

        assert_eq!(
            consumer.handle(&message(&completed, 9)).await.unwrap(),
            ReconcileOutcome::Unchanged
        );
        let second = ledger.find_transaction("TXN-0000AAAA").await.unwrap().unwrap();

        assert_eq!(first.delivery_offset, Some(4));
        assert_eq!(second.delivery_offset, first.delivery_offset);
        assert_eq!(second.status, TransactionStatus::Completed);
        assert!(second.notification_sent);
    }

    #[tokio::test]
    async fn test_initiated_never_overwrites_faster_write() {
        let ledger = funded_ledger().await;
        let record = Transaction::new(
            "TXN-0000BBBB",
            "OW10001",
            "OW10002",
            dec!(100),
            TransactionType::Transfer,
            TransactionStatus::Completed,
            "Transfer to OW10002",
        );
        ledger.apply(LedgerEntry::transfer(record.clone())).await.unwrap();

        let consumer = ReconciliationConsumer::new(ledger.clone());
        let initiated = TransferEvent::for_transaction(TransferEventType::TransferInitiated, &record);
        assert_eq!(
            consumer.handle(&message(&initiated, 0)).await.unwrap(),
            ReconcileOutcome::Unchanged
        );

        let stored = ledger.find_transaction("TXN-0000BBBB").await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn test_early_initiated_then_failed() {
        let ledger = funded_ledger().await;
        let consumer = ReconciliationConsumer::new(ledger.clone());
        let initiated = TransferEvent::new(
            TransferEventType::TransferInitiated,
            "OW10001",
            "OW10002",
            dec!(10),
            "TXN-0000CCCC",
        );
        let failed = TransferEvent {
            event_type: TransferEventType::TransferFailed,
            ..initiated.clone()
        };

        assert_eq!(
            consumer.handle(&message(&initiated, 0)).await.unwrap(),
            ReconcileOutcome::PlaceholderInserted
        );
        assert_eq!(
            consumer.handle(&message(&failed, 1)).await.unwrap(),
            ReconcileOutcome::MarkedFailed
        );
        assert_eq!(
            consumer.handle(&message(&failed, 2)).await.unwrap(),
            ReconcileOutcome::Unchanged
        );

        let stored = ledger.find_transaction("TXN-0000CCCC").await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Failed);
        let sender = ledger.find_account("OW10001").await.unwrap().unwrap();
        assert_eq!(sender.balance, dec!(1000));
    }

    #[tokio::test]
    async fn test_malformed_payload_skipped() {
        let ledger = funded_ledger().await;
        let consumer = ReconciliationConsumer::new(ledger);
        let bad = BusMessage {
            topic: "owbank-transfers".to_string(),
            key: "x".to_string(),
            payload: "{not json".to_string(),
            offset: 0,
        };
        assert_eq!(consumer.handle(&bad).await.unwrap(), ReconcileOutcome::Skipped);
    }
}
