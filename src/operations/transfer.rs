//! Two-phase transfer: initiate (validate only) and confirm (validate, enqueue)

use super::{respond, BankingOperations};
use crate::error::BankingError;
use crate::models::{
    generate_reference, Account, ActionResult, ResultKind, Transaction, TransactionStatus,
    TransactionType,
};
use crate::settlement::SettlementJob;
use crate::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(default)]
    pub to_account: String,
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

impl TransferRequest {
    fn description_or_default(&self) -> String {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Transfer to {}", self.to_account.trim()))
    }
}

/// Accounts that passed every precondition.
struct ValidatedTransfer {
    sender: Account,
    recipient: Account,
    amount: Decimal,
    description: String,
}

impl BankingOperations {
    async fn validate_transfer(
        &self,
        account_ref: &str,
        request: &TransferRequest,
    ) -> Result<ValidatedTransfer> {
        let to_account = request.to_account.trim();
        if to_account.is_empty() || request.amount.is_zero() {
            return Err(BankingError::MissingParameters(
                "both a recipient account number and amount".to_string(),
            ));
        }
        if request.amount < Decimal::ZERO {
            return Err(BankingError::InvalidAmount("it must be greater than zero".to_string()));
        }
        if request.amount.normalize().scale() > 2 {
            return Err(BankingError::InvalidAmount(
                "use at most two decimal places".to_string(),
            ));
        }
        if to_account == account_ref {
            return Err(BankingError::SelfTransfer);
        }

        let sender = self.require_account(account_ref).await?;
        if !sender.is_active() {
            return Err(BankingError::AccountInactive(sender.account_number));
        }

        let recipient = self
            .ledger
            .find_account(to_account)
            .await?
            .ok_or_else(|| BankingError::RecipientNotFound(to_account.to_string()))?;
        if !recipient.is_active() {
            return Err(BankingError::RecipientInactive(recipient.account_number));
        }

        if sender.balance < request.amount {
            return Err(BankingError::InsufficientBalance {
                available: sender.balance,
            });
        }

        Ok(ValidatedTransfer {
            sender,
            recipient,
            amount: request.amount,
            description: request.description_or_default(),
        })
    }

    /// Validate and summarise. Never mutates the ledger.
    pub async fn initiate_transfer(&self, account_ref: &str, request: TransferRequest) -> ActionResult {
        respond("initiate_transfer", self.initiate_inner(account_ref, &request).await)
    }

    async fn initiate_inner(&self, account_ref: &str, request: &TransferRequest) -> Result<ActionResult> {
        let transfer = self.validate_transfer(account_ref, request).await?;

        Ok(ActionResult::new(
            ResultKind::TransferConfirm,
            format!(
                "Please confirm this transfer:\n\n- **Amount:** {}\n- **To:** {} ({})\n- **Description:** {}\n- **Balance after:** {}\n\nShall I go ahead?",
                self.config.money(transfer.amount),
                transfer.recipient.account_number,
                transfer.recipient.holder_name,
                transfer.description,
                self.config.money(transfer.sender.balance - transfer.amount),
            ),
        )
        .with_data(json!({
            "toAccount": transfer.recipient.account_number,
            "amount": transfer.amount,
            "description": transfer.description,
            "recipientName": transfer.recipient.holder_name,
        })))
    }

    /// Re-validate, then hand the mutation to the settlement worker.
    ///
    /// Returns as soon as the job is queued; the outcome shows up later in
    /// the transaction history under the returned reference.
    pub async fn confirm_transfer(&self, account_ref: &str, request: TransferRequest) -> ActionResult {
        respond("confirm_transfer", self.confirm_inner(account_ref, &request).await)
    }

    async fn confirm_inner(&self, account_ref: &str, request: &TransferRequest) -> Result<ActionResult> {
        let transfer = self.validate_transfer(account_ref, request).await?;
        let reference = generate_reference();

        let record = Transaction::new(
            reference.clone(),
            transfer.sender.account_number.clone(),
            transfer.recipient.account_number.clone(),
            transfer.amount,
            TransactionType::Transfer,
            TransactionStatus::Pending,
            transfer.description.clone(),
        );
        self.settlement
            .enqueue(SettlementJob::Transfer { record })
            .await?;

        info!(
            reference = %reference,
            from = %transfer.sender.account_number,
            to = %transfer.recipient.account_number,
            amount = %transfer.amount,
            "Transfer submitted"
        );

        Ok(ActionResult::new(
            ResultKind::TransferSubmitted,
            format!(
                "Transfer submitted!\n\n- **Amount:** {}\n- **To:** {}\n- **Reference:** {}\n\nIt will appear in your transaction history shortly.",
                self.config.money(transfer.amount),
                transfer.recipient.account_number,
                reference,
            ),
        )
        .with_data(json!({
            "reference": reference,
            "amount": transfer.amount,
            "toAccount": transfer.recipient.account_number,
            "status": "submitted",
        })))
    }
}
