//! Background settlement
//!
//! Confirmed transfers and loan disbursements are handed to a single worker
//! over a bounded queue; the caller gets its acknowledgement as soon as the
//! job is enqueued. Jobs run in FIFO order, each inside its own spawned task
//! so a panic is reported and the worker keeps going.

use crate::error::BankingError;
use crate::events::{EventPublisher, TransferEvent, TransferEventType};
use crate::ledger::{LedgerEntry, LedgerStore};
use crate::models::{Transaction, TransactionStatus};
use crate::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum SettlementJob {
    /// Debit `record.from_account`, credit `record.to_account`.
    Transfer { record: Transaction },
    /// Credit `record.to_account` and move the loan to `disbursed`.
    Disbursement { record: Transaction, loan_id: Uuid },
}

impl SettlementJob {
    pub fn reference(&self) -> &str {
        match self {
            SettlementJob::Transfer { record } | SettlementJob::Disbursement { record, .. } => {
                &record.reference
            }
        }
    }
}

enum Command {
    Job(SettlementJob),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Cloneable producer handle.
#[derive(Clone)]
pub struct SettlementQueue {
    sender: mpsc::Sender<Command>,
}

impl SettlementQueue {
    pub async fn enqueue(&self, job: SettlementJob) -> Result<()> {
        let reference = job.reference().to_string();
        self.sender
            .send(Command::Job(job))
            .await
            .map_err(|_| BankingError::QueueError(format!("worker stopped, {} not queued", reference)))
    }

    /// Resolves once every job enqueued before this call has been settled.
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(Command::Flush(ack))
            .await
            .map_err(|_| BankingError::QueueError("worker stopped".to_string()))?;
        done.await
            .map_err(|_| BankingError::QueueError("worker dropped flush".to_string()))
    }
}

struct Settler {
    ledger: Arc<dyn LedgerStore>,
    publisher: Arc<EventPublisher>,
}

impl Settler {
    async fn settle(&self, job: SettlementJob) {
        match job {
            SettlementJob::Transfer { record } => self.settle_transfer(record).await,
            SettlementJob::Disbursement { record, loan_id } => {
                self.settle_disbursement(record, loan_id).await
            }
        }
    }

    async fn settle_transfer(&self, record: Transaction) {
        self.publisher
            .publish_best_effort(&TransferEvent::for_transaction(
                TransferEventType::TransferInitiated,
                &record,
            ))
            .await;

        let completed = Transaction {
            status: TransactionStatus::Completed,
            ..record.clone()
        };

        match self.ledger.apply(LedgerEntry::transfer(completed)).await {
            Ok(applied) => {
                info!(
                    reference = %record.reference,
                    from = %record.from_account,
                    to = %record.to_account,
                    amount = %record.amount,
                    sender_balance = ?applied.balance_of(&record.from_account),
                    "Transfer completed"
                );
                self.publisher
                    .publish_best_effort(&TransferEvent::for_transaction(
                        TransferEventType::TransferCompleted,
                        &record,
                    ))
                    .await;
            }
            Err(e) => {
                self.fail(&record, &e).await;
                self.publisher
                    .publish_best_effort(&TransferEvent::for_transaction(
                        TransferEventType::TransferFailed,
                        &record,
                    ))
                    .await;
            }
        }
    }

    async fn settle_disbursement(&self, record: Transaction, loan_id: Uuid) {
        let completed = Transaction {
            status: TransactionStatus::Completed,
            ..record.clone()
        };

        match self
            .ledger
            .apply(LedgerEntry::disbursement(completed, loan_id))
            .await
        {
            Ok(_) => info!(
                reference = %record.reference,
                loan_id = %loan_id,
                account = %record.to_account,
                amount = %record.amount,
                "Loan disbursed"
            ),
            Err(e) => self.fail(&record, &e).await,
        }
    }

    async fn fail(&self, record: &Transaction, cause: &BankingError) {
        error!(
            reference = %record.reference,
            from = %record.from_account,
            to = %record.to_account,
            amount = %record.amount,
            error = %cause,
            "Background settlement failed, ledger left unchanged"
        );

        // A collision means the reference belongs to someone else's record.
        if matches!(cause, BankingError::ReferenceCollision(_)) {
            return;
        }

        let failed = Transaction {
            status: TransactionStatus::Failed,
            ..record.clone()
        };
        if let Err(e) = self.ledger.record_failure(failed).await {
            error!(reference = %record.reference, error = %e, "Could not record failed settlement");
        }
    }
}

/// The supervised worker task.
pub struct SettlementWorker {
    queue: SettlementQueue,
    task: JoinHandle<()>,
}

impl SettlementWorker {
    pub fn spawn(
        ledger: Arc<dyn LedgerStore>,
        publisher: Arc<EventPublisher>,
        capacity: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let settler = Arc::new(Settler { ledger, publisher });
        let task = tokio::spawn(run(settler, receiver));

        Self {
            queue: SettlementQueue { sender },
            task,
        }
    }

    pub fn queue(&self) -> SettlementQueue {
        self.queue.clone()
    }

    /// Settle everything already queued, then stop the worker.
    pub async fn shutdown(self) {
        if self.queue.sender.send(Command::Shutdown).await.is_err() {
            warn!("Settlement worker already stopped");
        }
        if let Err(e) = self.task.await {
            error!(error = %e, "Settlement worker ended abnormally");
        }
    }
}

async fn run(settler: Arc<Settler>, mut receiver: mpsc::Receiver<Command>) {
    info!("Settlement worker started");

    while let Some(command) = receiver.recv().await {
        match command {
            Command::Job(job) => {
                let reference = job.reference().to_string();
                let settler = settler.clone();
                let outcome = tokio::spawn(async move { settler.settle(job).await }).await;
                if let Err(e) = outcome {
                    error!(reference = %reference, error = %e, "Settlement task panicked");
                }
            }
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
            Command::Shutdown => break,
        }
    }

    info!("Settlement worker stopped");
}
