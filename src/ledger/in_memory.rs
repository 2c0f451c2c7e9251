//! In-memory ledger for development and tests
//!
//! All collections sit behind one `RwLock`, so an entry's legs, its record
//! and any loan transition are validated and written under a single guard.

use super::{
    account_number_for, apply_leg, card_matches, merge_record, AppliedEntry, LedgerEntry,
    LedgerStore,
};
use crate::error::BankingError;
use crate::models::{
    generate_reference, Account, AccountStatus, Card, CardAction, CardStatus, Loan, LoanStatus,
    NewAccount, Transaction, TransactionStatus, TransactionType,
};
use crate::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<String, Account>,
    /// Insertion order; `reference_index` points into it.
    transactions: Vec<Transaction>,
    reference_index: HashMap<String, usize>,
    cards: Vec<Card>,
    loans: Vec<Loan>,
}

impl LedgerState {
    fn transaction(&self, reference: &str) -> Option<&Transaction> {
        self.reference_index
            .get(reference)
            .map(|&idx| &self.transactions[idx])
    }

    fn upsert_transaction(&mut self, record: Transaction) {
        match self.reference_index.get(&record.reference) {
            Some(&idx) => self.transactions[idx] = record,
            None => {
                self.reference_index
                    .insert(record.reference.clone(), self.transactions.len());
                self.transactions.push(record);
            }
        }
    }

    fn transaction_mut(&mut self, reference: &str) -> Option<&mut Transaction> {
        let idx = *self.reference_index.get(reference)?;
        self.transactions.get_mut(idx)
    }
}

pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState::default())),
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedger {
    fn backend(&self) -> &'static str {
        "in-memory"
    }

    async fn open_account(&self, request: NewAccount) -> Result<Account> {
        let mut state = self.state.write().await;

        let account_number = account_number_for(&request, state.accounts.len());
        let account = Account {
            account_id: Uuid::new_v4(),
            owner_id: request.owner_id,
            account_number: account_number.clone(),
            holder_name: request.holder_name.clone(),
            account_type: request.account_type,
            balance: request.opening_bonus,
            currency: request.currency.clone(),
            status: AccountStatus::Active,
            created_at: Utc::now(),
        };

        if request.opening_bonus > Decimal::ZERO {
            let bonus = Transaction::new(
                generate_reference(),
                "SYSTEM",
                account_number.clone(),
                request.opening_bonus,
                TransactionType::Bonus,
                TransactionStatus::Completed,
                "Welcome bonus",
            );
            if state.transaction(&bonus.reference).is_some() {
                return Err(BankingError::ReferenceCollision(bonus.reference));
            }
            state.upsert_transaction(bonus);
        }

        state.accounts.insert(account_number, account.clone());
        Ok(account)
    }

    async fn find_account(&self, account_number: &str) -> Result<Option<Account>> {
        let state = self.state.read().await;
        Ok(state.accounts.get(account_number).cloned())
    }

    async fn find_account_by_owner(&self, owner_id: Uuid) -> Result<Option<Account>> {
        let state = self.state.read().await;
        Ok(state
            .accounts
            .values()
            .filter(|account| account.owner_id == owner_id)
            .min_by_key(|account| account.created_at)
            .cloned())
    }

    async fn set_account_status(
        &self,
        account_number: &str,
        status: AccountStatus,
    ) -> Result<Account> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(account_number)
            .ok_or_else(|| BankingError::AccountNotFound(account_number.to_string()))?;
        account.status = status;
        Ok(account.clone())
    }

    async fn apply(&self, entry: LedgerEntry) -> Result<AppliedEntry> {
        let mut state = self.state.write().await;

        // Stage every leg before touching state.
        let mut staged: HashMap<String, Account> = HashMap::new();
        for leg in &entry.legs {
            let current = match staged.get(&leg.account_number) {
                Some(account) => account.clone(),
                None => state
                    .accounts
                    .get(&leg.account_number)
                    .cloned()
                    .ok_or_else(|| BankingError::AccountNotFound(leg.account_number.clone()))?,
            };
            let balance = apply_leg(&current, leg.delta)?;
            staged.insert(
                leg.account_number.clone(),
                Account { balance, ..current },
            );
        }

        let record = merge_record(state.transaction(&entry.record.reference), entry.record)?;

        let loan_idx = match entry.disburse_loan {
            Some(loan_id) => {
                let idx = state
                    .loans
                    .iter()
                    .position(|loan| loan.loan_id == loan_id)
                    .ok_or_else(|| BankingError::LoanNotFound(loan_id.to_string()))?;
                if !state.loans[idx].status.can_transition_to(LoanStatus::Disbursed) {
                    return Err(BankingError::AtomicityViolation(format!(
                        "loan {} is {} and cannot be disbursed",
                        loan_id,
                        state.loans[idx].status.as_str()
                    )));
                }
                Some(idx)
            }
            None => None,
        };

        // Commit.
        let balances = entry
            .legs
            .iter()
            .filter_map(|leg| {
                staged
                    .get(&leg.account_number)
                    .map(|account| (leg.account_number.clone(), account.balance))
            })
            .collect();
        for (number, account) in staged {
            state.accounts.insert(number, account);
        }
        if let Some(idx) = loan_idx {
            state.loans[idx].status = LoanStatus::Disbursed;
        }
        let reference = record.reference.clone();
        state.upsert_transaction(record);

        debug!(reference = %reference, "Ledger entry committed");
        Ok(AppliedEntry {
            reference,
            balances,
        })
    }

    async fn record_failure(&self, record: Transaction) -> Result<()> {
        let mut state = self.state.write().await;

        match state.transaction_mut(&record.reference) {
            Some(existing) if existing.status == TransactionStatus::Pending => {
                existing.status = TransactionStatus::Failed;
                existing.updated_at = Utc::now();
            }
            Some(_) => {}
            None => state.upsert_transaction(Transaction {
                status: TransactionStatus::Failed,
                ..record
            }),
        }
        Ok(())
    }

    async fn find_transaction(&self, reference: &str) -> Result<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state.transaction(reference).cloned())
    }

    async fn list_transactions(
        &self,
        account_number: &str,
        limit: usize,
    ) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.from_account == account_number || tx.to_account == account_number)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_pending_if_absent(&self, record: Transaction) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.transaction(&record.reference).is_some() {
            return Ok(false);
        }
        state.upsert_transaction(Transaction {
            status: TransactionStatus::Pending,
            ..record
        });
        Ok(true)
    }

    async fn stamp_delivery(&self, reference: &str, offset: i64) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(tx) = state.transaction_mut(reference) else {
            return Ok(false);
        };

        let mut changed = false;
        if tx.delivery_offset.is_none() {
            tx.delivery_offset = Some(offset);
            tx.notification_sent = true;
            changed = true;
        }
        if tx.status == TransactionStatus::Pending {
            tx.status = TransactionStatus::Completed;
            changed = true;
        }
        if changed {
            tx.updated_at = Utc::now();
        }
        Ok(changed)
    }

    async fn mark_failed(&self, reference: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.transaction_mut(reference) {
            Some(tx) if tx.status == TransactionStatus::Pending => {
                tx.status = TransactionStatus::Failed;
                tx.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn issue_card(&self, card: Card) -> Result<Card> {
        let mut state = self.state.write().await;

        let duplicate = state.cards.iter().any(|existing| {
            existing.owner_id == card.owner_id
                && existing.tier == card.tier
                && existing.status != CardStatus::Cancelled
        });
        if duplicate {
            return Err(BankingError::DuplicateCardTier(card.tier.display_name().to_string()));
        }

        info!(tier = %card.tier, last_four = %card.last_four(), "Card stored");
        state.cards.push(card.clone());
        Ok(card)
    }

    async fn list_cards(&self, owner_id: Uuid) -> Result<Vec<Card>> {
        let state = self.state.read().await;
        Ok(state
            .cards
            .iter()
            .filter(|card| card.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn set_card_status(
        &self,
        owner_id: Uuid,
        card_ref: &str,
        action: CardAction,
    ) -> Result<Card> {
        let mut state = self.state.write().await;

        // Prefer a live card when several share the same last four digits.
        let mut candidates: Vec<usize> = state
            .cards
            .iter()
            .enumerate()
            .filter(|(_, card)| card.owner_id == owner_id && card_matches(card, card_ref))
            .map(|(idx, _)| idx)
            .collect();
        candidates.sort_by_key(|&idx| state.cards[idx].status == CardStatus::Cancelled);

        let idx = *candidates
            .first()
            .ok_or_else(|| BankingError::CardNotFound(card_ref.to_string()))?;

        let card = &mut state.cards[idx];
        card.status = card.status.apply(action)?;
        Ok(card.clone())
    }

    async fn create_loan(&self, loan: Loan) -> Result<Loan> {
        let mut state = self.state.write().await;
        state.loans.push(loan.clone());
        Ok(loan)
    }

    async fn set_loan_status(&self, loan_id: Uuid, status: LoanStatus) -> Result<Loan> {
        let mut state = self.state.write().await;
        let loan = state
            .loans
            .iter_mut()
            .find(|loan| loan.loan_id == loan_id)
            .ok_or_else(|| BankingError::LoanNotFound(loan_id.to_string()))?;

        if !loan.status.can_transition_to(status) {
            return Err(BankingError::AtomicityViolation(format!(
                "loan {} cannot move from {} to {}",
                loan_id,
                loan.status.as_str(),
                status.as_str()
            )));
        }
        loan.status = status;
        Ok(loan.clone())
    }

    async fn latest_loan(&self, account_number: &str) -> Result<Option<Loan>> {
        let state = self.state.read().await;
        Ok(state
            .loans
            .iter()
            .rev()
            .find(|loan| loan.account_number == account_number)
            .cloned())
    }

    async fn list_loans(&self, owner_id: Uuid) -> Result<Vec<Loan>> {
        let state = self.state.read().await;
        Ok(state
            .loans
            .iter()
            .rev()
            .filter(|loan| loan.owner_id == owner_id)
            .cloned()
            .collect())
    }
}
