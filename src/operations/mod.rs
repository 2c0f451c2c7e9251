//! Banking operations
//!
//! Transport-agnostic entry points. Each returns an [`ActionResult`]; errors
//! below this layer are translated to a typed `error` result here and never
//! surface verbatim.

mod cards;
mod loans;
mod transfer;

pub use loans::{LoanConfirmation, LoanQuery};
pub use transfer::TransferRequest;

use crate::config::BankingConfig;
use crate::credit::{credit_rating, CreditScorer};
use crate::error::{BankingError, ErrorKind};
use crate::ledger::LedgerStore;
use crate::models::{Account, AccountType, ActionResult, NewAccount, ResultKind};
use crate::settlement::SettlementQueue;
use crate::Result;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct BankingOperations {
    config: Arc<BankingConfig>,
    ledger: Arc<dyn LedgerStore>,
    scorer: Arc<dyn CreditScorer>,
    settlement: SettlementQueue,
}

impl BankingOperations {
    pub fn new(
        config: Arc<BankingConfig>,
        ledger: Arc<dyn LedgerStore>,
        scorer: Arc<dyn CreditScorer>,
        settlement: SettlementQueue,
    ) -> Self {
        Self {
            config,
            ledger,
            scorer,
            settlement,
        }
    }

    pub fn config(&self) -> &BankingConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerStore> {
        &self.ledger
    }

    async fn require_account(&self, account_ref: &str) -> Result<Account> {
        self.ledger
            .find_account(account_ref)
            .await?
            .ok_or_else(|| BankingError::AccountNotFound(account_ref.to_string()))
    }

    /// Score from the most recent loan on file, else a fresh one.
    async fn current_score(&self, account_ref: &str) -> Result<u32> {
        match self.ledger.latest_loan(account_ref).await? {
            Some(loan) => Ok(loan.credit_score),
            None => self.scorer.score(account_ref).await,
        }
    }

    //
    // ================= Accounts =================
    //

    pub async fn open_account(
        &self,
        owner_id: Uuid,
        holder_name: &str,
        account_type: AccountType,
    ) -> ActionResult {
        respond("open_account", self.open_account_inner(owner_id, holder_name, account_type).await)
    }

    async fn open_account_inner(
        &self,
        owner_id: Uuid,
        holder_name: &str,
        account_type: AccountType,
    ) -> Result<ActionResult> {
        if holder_name.trim().is_empty() {
            return Err(BankingError::MissingParameters("the account holder's name".to_string()));
        }

        let account = self
            .ledger
            .open_account(NewAccount {
                owner_id,
                holder_name: holder_name.trim().to_string(),
                account_type,
                currency: self.config.currency.code.clone(),
                opening_bonus: self.config.welcome_bonus,
                number_prefix: self.config.account_prefix.clone(),
                first_number: self.config.first_account_number,
            })
            .await?;

        info!(account = %account.account_number, owner = %owner_id, "Account opened");

        Ok(ActionResult::new(
            ResultKind::AccountOpened,
            format!(
                "Welcome aboard, {}! Your account **{}** is open with a welcome bonus of **{}**.",
                account.holder_name,
                account.account_number,
                self.config.money(self.config.welcome_bonus)
            ),
        )
        .with_data(json!({
            "accountNumber": account.account_number,
            "accountType": account.account_type,
            "balance": account.balance,
            "currency": account.currency,
        })))
    }

    pub async fn get_balance(&self, account_ref: &str) -> ActionResult {
        respond("get_balance", self.balance_inner(account_ref).await)
    }

    async fn balance_inner(&self, account_ref: &str) -> Result<ActionResult> {
        let account = self.require_account(account_ref).await?;
        let kind = match account.account_type {
            AccountType::Savings => "savings",
            AccountType::Checking => "checking",
        };

        Ok(ActionResult::new(
            ResultKind::Balance,
            format!(
                "Your **{}** account (**{}**) has a balance of **{}**.",
                kind,
                account.account_number,
                self.config.money(account.balance)
            ),
        )
        .with_data(json!({
            "balance": account.balance,
            "accountNumber": account.account_number,
            "accountType": account.account_type,
        })))
    }

    pub async fn list_transactions(&self, account_ref: &str, limit: Option<usize>) -> ActionResult {
        respond("list_transactions", self.transactions_inner(account_ref, limit).await)
    }

    async fn transactions_inner(&self, account_ref: &str, limit: Option<usize>) -> Result<ActionResult> {
        let limit = limit
            .filter(|&n| n > 0)
            .unwrap_or(self.config.transaction_history_limit);
        let account = self.require_account(account_ref).await?;
        let history = self
            .ledger
            .list_transactions(&account.account_number, limit)
            .await?;

        if history.is_empty() {
            return Ok(
                ActionResult::new(ResultKind::Transactions, "No recent transactions found.")
                    .with_data(json!({ "transactions": [] })),
            );
        }

        let lines: Vec<String> = history
            .iter()
            .map(|tx| {
                let sign = if tx.is_credit_for(&account.account_number) { "+" } else { "-" };
                format!(
                    "- {}{} {} ({}, {})",
                    sign,
                    self.config.money(tx.amount),
                    tx.description,
                    tx.created_at.format("%Y-%m-%d"),
                    tx.status.as_str(),
                )
            })
            .collect();

        Ok(ActionResult::new(
            ResultKind::Transactions,
            format!("Here are your recent transactions:\n\n{}", lines.join("\n")),
        )
        .with_data(json!({
            "count": history.len(),
            "transactions": history,
        })))
    }

    pub async fn get_credit_score(&self, account_ref: &str) -> ActionResult {
        respond("get_credit_score", self.credit_score_inner(account_ref).await)
    }

    async fn credit_score_inner(&self, account_ref: &str) -> Result<ActionResult> {
        let score = self.current_score(account_ref).await?;
        let rating = credit_rating(score);

        Ok(ActionResult::new(
            ResultKind::CreditScore,
            format!("Your credit score is **{}** ({}).", score, rating),
        )
        .with_data(json!({ "score": score, "rating": rating })))
    }
}

/// Translate an operation outcome into a caller-facing result.
fn respond(operation: &'static str, result: Result<ActionResult>) -> ActionResult {
    match result {
        Ok(result) => result,
        Err(e) => {
            match e.kind() {
                ErrorKind::Validation | ErrorKind::NotFound => {
                    debug!(operation, error = %e, "Operation rejected")
                }
                ErrorKind::Infrastructure => warn!(operation, error = %e, "Operation failed"),
                ErrorKind::Atomicity => error!(operation, error = %e, "Atomicity violation"),
            }
            ActionResult::from(e)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::Harness;
    use super::*;

    #[tokio::test]
    async fn test_open_account_and_balance() {
        let h = Harness::new(700).await;
        let number = h.open("Ada").await;
        assert_eq!(number, "OW10001");

        let result = h.ops.get_balance(&number).await;
        assert_eq!(result.kind, ResultKind::Balance);
        assert!(result.text.contains("$1,000.00"));
    }

    #[tokio::test]
    async fn test_unknown_account_is_typed_error() {
        let h = Harness::new(700).await;
        let result = h.ops.get_balance("OW99999").await;
        assert!(result.is_error());
        assert_eq!(result.text, "Your account was not found.");
    }

    #[tokio::test]
    async fn test_history_signs_and_default_limit() {
        let h = Harness::new(700).await;
        let a = h.open("Ada").await;
        let b = h.open("Grace").await;

        let result = h.ops.list_transactions(&a, None).await;
        assert!(result.text.contains("+$1,000.00 Welcome bonus"));

        for _ in 0..6 {
            h.ops
                .confirm_transfer(
                    &a,
                    TransferRequest {
                        to_account: b.clone(),
                        amount: rust_decimal_macros::dec!(10),
                        description: None,
                    },
                )
                .await;
        }
        h.settle().await;

        let result = h.ops.list_transactions(&a, None).await;
        assert_eq!(result.data.as_ref().unwrap()["count"], 5);
        assert!(result.text.contains("-$10.00 Transfer to OW10002"));

        let result = h.ops.list_transactions(&b, Some(1)).await;
        assert!(result.text.contains("+$10.00"));
    }

    #[tokio::test]
    async fn test_credit_score_reports_rating() {
        let h = Harness::new(810).await;
        let a = h.open("Ada").await;
        let result = h.ops.get_credit_score(&a).await;
        assert_eq!(result.kind, ResultKind::CreditScore);
        assert!(result.text.contains("810"));
        assert!(result.text.contains("Excellent"));
    }
}
