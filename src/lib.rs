//! Banking Orchestrator
//!
//! A conversational banking core that:
//! - Extracts a single structured intent from free-form model output
//! - Routes intents to deterministic banking operations (LLM excluded from money movement)
//! - Keeps accounts, transactions, cards and loans in an atomic ledger
//! - Settles confirmed transfers and loan disbursements on a supervised background worker
//! - Publishes transfer lifecycle events and reconciles them idempotently
//!
//! CHAT LOOP:
//! MESSAGE → MODEL → EXTRACT → ROUTE → OPERATE → (SETTLE → PUBLISH → RECONCILE)

pub mod api;
pub mod assistant;
pub mod classifier;
pub mod config;
pub mod credit;
pub mod error;
pub mod events;
pub mod intent;
pub mod ledger;
pub mod llm;
pub mod memory;
pub mod models;
pub mod operations;
pub mod reconciliation;
pub mod router;
pub mod runtime;
pub mod settlement;

pub use error::{BankingError, ErrorKind, Result};

// Re-export common types
pub use assistant::{AssistantReply, BankingAssistant, ChatRequest};
pub use classifier::{AgentLabel, MessageClassifier};
pub use config::BankingConfig;
pub use intent::{clean_response, extract_intent, Intent};
pub use models::*;
pub use operations::BankingOperations;
pub use router::{create_default_router, ActionContext, ActionRouter};
pub use runtime::BankingRuntime;
