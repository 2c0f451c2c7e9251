//! Ledger persistence layer
//!
//! The single source of truth for accounts, transactions, cards and loans.
//! Every balance mutation goes through [`LedgerStore::apply`], which commits
//! all legs of an entry together with its transaction record, or nothing.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryLedger;
pub use postgres::PostgresLedger;

use crate::error::BankingError;
use crate::models::{
    Account, AccountStatus, Card, CardAction, Loan, LoanStatus, NewAccount, Transaction,
    TransactionStatus,
};
use crate::Result;
use rust_decimal::Decimal;
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// A signed balance change on one account.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceLeg {
    pub account_number: String,
    pub delta: Decimal,
}

/// Balance legs plus the audit record they produce, committed as one unit.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub legs: Vec<BalanceLeg>,
    pub record: Transaction,
    /// Loan moved `approved → disbursed` in the same unit.
    pub disburse_loan: Option<Uuid>,
}

impl LedgerEntry {
    /// Debit `from_account`, credit `to_account` by `record.amount`.
    pub fn transfer(record: Transaction) -> Self {
        Self {
            legs: vec![
                BalanceLeg {
                    account_number: record.from_account.clone(),
                    delta: -record.amount,
                },
                BalanceLeg {
                    account_number: record.to_account.clone(),
                    delta: record.amount,
                },
            ],
            record,
            disburse_loan: None,
        }
    }

    /// Credit `to_account` from an external source and disburse `loan_id`.
    pub fn disbursement(record: Transaction, loan_id: Uuid) -> Self {
        Self {
            legs: vec![BalanceLeg {
                account_number: record.to_account.clone(),
                delta: record.amount,
            }],
            record,
            disburse_loan: Some(loan_id),
        }
    }
}

/// Post-commit balances, in leg order.
#[derive(Debug, Clone)]
pub struct AppliedEntry {
    pub reference: String,
    pub balances: Vec<(String, Decimal)>,
}

impl AppliedEntry {
    pub fn balance_of(&self, account_number: &str) -> Option<Decimal> {
        self.balances
            .iter()
            .find(|(number, _)| number == account_number)
            .map(|(_, balance)| *balance)
    }
}

/// Trait for ledger persistence
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    fn backend(&self) -> &'static str;

    // Accounts
    async fn open_account(&self, request: NewAccount) -> Result<Account>;
    async fn find_account(&self, account_number: &str) -> Result<Option<Account>>;
    async fn find_account_by_owner(&self, owner_id: Uuid) -> Result<Option<Account>>;
    async fn set_account_status(
        &self,
        account_number: &str,
        status: AccountStatus,
    ) -> Result<Account>;

    // Transactions
    async fn apply(&self, entry: LedgerEntry) -> Result<AppliedEntry>;
    /// Write a `failed` record unless the reference already reached a terminal state.
    async fn record_failure(&self, record: Transaction) -> Result<()>;
    async fn find_transaction(&self, reference: &str) -> Result<Option<Transaction>>;
    /// Newest first.
    async fn list_transactions(&self, account_number: &str, limit: usize)
        -> Result<Vec<Transaction>>;

    // Reconciliation
    async fn insert_pending_if_absent(&self, record: Transaction) -> Result<bool>;
    async fn stamp_delivery(&self, reference: &str, offset: i64) -> Result<bool>;
    async fn mark_failed(&self, reference: &str) -> Result<bool>;

    // Cards
    /// Fails with `DuplicateCardTier` if the owner already holds a live card of that tier.
    async fn issue_card(&self, card: Card) -> Result<Card>;
    async fn list_cards(&self, owner_id: Uuid) -> Result<Vec<Card>>;
    /// `card_ref` is a card id or the last four digits.
    async fn set_card_status(
        &self,
        owner_id: Uuid,
        card_ref: &str,
        action: CardAction,
    ) -> Result<Card>;

    // Loans
    async fn create_loan(&self, loan: Loan) -> Result<Loan>;
    async fn set_loan_status(&self, loan_id: Uuid, status: LoanStatus) -> Result<Loan>;
    async fn latest_loan(&self, account_number: &str) -> Result<Option<Loan>>;
    async fn list_loans(&self, owner_id: Uuid) -> Result<Vec<Loan>>;
}

/// New balance after `delta`, or the validation error that blocks it.
pub(crate) fn apply_leg(account: &Account, delta: Decimal) -> Result<Decimal> {
    if !account.is_active() {
        return Err(BankingError::AccountInactive(account.account_number.clone()));
    }

    let next = account.balance + delta;
    if next < Decimal::ZERO {
        return Err(BankingError::InsufficientBalance {
            available: account.balance,
        });
    }

    Ok(next)
}

/// Resolve `record` against whatever already holds its reference.
///
/// A pending placeholder is promoted and keeps its delivery stamps; a
/// terminal record is a collision.
pub(crate) fn merge_record(existing: Option<&Transaction>, record: Transaction) -> Result<Transaction> {
    match existing {
        None => Ok(record),
        Some(current) if current.status == TransactionStatus::Pending => Ok(Transaction {
            delivery_offset: current.delivery_offset,
            notification_sent: current.notification_sent,
            created_at: current.created_at,
            ..record
        }),
        Some(current) => Err(BankingError::ReferenceCollision(current.reference.clone())),
    }
}

pub(crate) fn account_number_for(request: &NewAccount, existing: usize) -> String {
    format!(
        "{}{}",
        request.number_prefix,
        request.first_number as usize + existing
    )
}

/// Matches `card_ref` against a card id or the trailing digits of its number.
pub(crate) fn card_matches(card: &Card, card_ref: &str) -> bool {
    let card_ref = card_ref.trim();
    card.card_id.to_string() == card_ref
        || (card_ref.len() == 4 && card.last_four() == card_ref)
}

/// Build the ledger from the environment: Postgres when a URL is set, else in-memory.
pub fn build_ledger() -> Arc<dyn LedgerStore> {
    let database_url = env::var("DATABASE_URL")
        .or_else(|_| env::var("POSTGRES_URL"))
        .ok();

    if let Some(url) = database_url {
        match PostgresLedger::connect_lazy(&url) {
            Ok(ledger) => {
                info!("Ledger backend: postgres");
                return Arc::new(ledger);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres ledger, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Ledger backend: in-memory");
    Arc::new(InMemoryLedger::new())
}
