//! Component wiring
//!
//! Builds the ledger, bus, background tasks, operations and assistant in one
//! place so both binaries and the integration tests start the same system.

use crate::assistant::BankingAssistant;
use crate::config::BankingConfig;
use crate::credit::{CreditScorer, SimulatedScorer};
use crate::events::{EventBus, EventPublisher, InMemoryEventBus};
use crate::ledger::{build_ledger, LedgerStore};
use crate::llm::{build_chat_model, ChatModel};
use crate::memory::InMemorySessionStore;
use crate::operations::BankingOperations;
use crate::reconciliation::{spawn_consumer, ConsumerHandle};
use crate::router::create_default_router;
use crate::settlement::SettlementWorker;
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub struct BankingRuntime {
    pub config: Arc<BankingConfig>,
    pub ledger: Arc<dyn LedgerStore>,
    pub bus: Arc<dyn EventBus>,
    pub ops: Arc<BankingOperations>,
    pub assistant: Arc<BankingAssistant>,
    worker: SettlementWorker,
    consumer: Option<ConsumerHandle>,
}

impl BankingRuntime {
    /// Start every component from the environment.
    pub async fn from_env() -> Result<Self> {
        let config = BankingConfig::from_env()?;
        let scorer = Arc::new(SimulatedScorer::new(&config.scoring));
        Self::start(
            config,
            build_ledger(),
            Arc::new(InMemoryEventBus::default()),
            scorer,
            build_chat_model(),
        )
        .await
    }

    pub async fn start(
        config: BankingConfig,
        ledger: Arc<dyn LedgerStore>,
        bus: Arc<dyn EventBus>,
        scorer: Arc<dyn CreditScorer>,
        model: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let publisher = Arc::new(EventPublisher::new(bus.clone(), &config.events));
        let worker = SettlementWorker::spawn(
            ledger.clone(),
            publisher,
            config.settlement_queue_capacity,
        );

        let consumer = if config.events.enabled {
            match spawn_consumer(
                ledger.clone(),
                bus.clone(),
                &config.events.topic,
                &config.events.consumer_group,
            )
            .await
            {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(error = %e, "Reconciliation consumer not started");
                    None
                }
            }
        } else {
            None
        };

        let ops = Arc::new(BankingOperations::new(
            config.clone(),
            ledger.clone(),
            scorer.clone(),
            worker.queue(),
        ));

        let assistant = Arc::new(BankingAssistant::new(
            config.clone(),
            create_default_router(ops.clone()),
            model,
            Arc::new(InMemorySessionStore::new(config.session_turns)),
        ));

        info!(
            ledger = ledger.backend(),
            scorer = scorer.name(),
            events = config.events.enabled,
            "Banking runtime started"
        );

        Ok(Self {
            config,
            ledger,
            bus,
            ops,
            assistant,
            worker,
            consumer,
        })
    }

    /// Wait until every queued settlement job has been applied.
    pub async fn settle(&self) -> Result<()> {
        self.worker.queue().flush().await
    }

    pub async fn shutdown(self) {
        self.worker.shutdown().await;
        if let Some(consumer) = self.consumer {
            consumer.stop().await;
        }
        info!("Banking runtime stopped");
    }
}
