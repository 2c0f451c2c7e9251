//! Core data models for the banking ledger

use crate::error::BankingError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//
// ================= Accounts =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Savings,
    Checking,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Frozen,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_id: Uuid,
    pub owner_id: Uuid,
    pub account_number: String,
    pub holder_name: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub currency: String,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Parameters for opening an account; the store assigns the number.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub owner_id: Uuid,
    pub holder_name: String,
    pub account_type: AccountType,
    pub currency: String,
    pub opening_bonus: Decimal,
    pub number_prefix: String,
    pub first_number: u32,
}

//
// ================= Transactions =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Transfer,
    Deposit,
    Withdrawal,
    Bonus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// Append-only audit record of a money movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub reference: String,
    pub from_account: String,
    pub to_account: String,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub description: String,
    /// Set only by the reconciliation consumer.
    pub delivery_offset: Option<i64>,
    pub notification_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        reference: impl Into<String>,
        from_account: impl Into<String>,
        to_account: impl Into<String>,
        amount: Decimal,
        transaction_type: TransactionType,
        status: TransactionStatus,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            reference: reference.into(),
            from_account: from_account.into(),
            to_account: to_account.into(),
            amount,
            transaction_type,
            status,
            description: description.into(),
            delivery_offset: None,
            notification_sent: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this record increases the balance of `account_number`.
    pub fn is_credit_for(&self, account_number: &str) -> bool {
        self.transaction_type == TransactionType::Bonus || self.to_account == account_number
    }
}

/// Fresh reference of the form `TXN-1A2B3C4D`.
pub fn generate_reference() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("TXN-{}", raw[..8].to_uppercase())
}

//
// ================= Cards =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CardTier {
    Standard,
    Gold,
    Platinum,
}

impl CardTier {
    pub const ALL: [CardTier; 3] = [CardTier::Standard, CardTier::Gold, CardTier::Platinum];

    pub fn as_str(self) -> &'static str {
        match self {
            CardTier::Standard => "standard",
            CardTier::Gold => "gold",
            CardTier::Platinum => "platinum",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            CardTier::Standard => "Standard",
            CardTier::Gold => "Gold",
            CardTier::Platinum => "Platinum",
        }
    }
}

impl fmt::Display for CardTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardTier {
    type Err = BankingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(CardTier::Standard),
            "gold" => Ok(CardTier::Gold),
            "platinum" => Ok(CardTier::Platinum),
            other => Err(BankingError::MissingParameters(format!(
                "a valid card type (standard, gold or platinum), not '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Active,
    Frozen,
    Cancelled,
}

impl CardStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CardStatus::Active => "active",
            CardStatus::Frozen => "frozen",
            CardStatus::Cancelled => "cancelled",
        }
    }

    /// Next status after `action`. Cancelled cards never come back.
    pub fn apply(self, action: CardAction) -> Result<CardStatus, BankingError> {
        match (self, action) {
            (CardStatus::Cancelled, _) => Err(BankingError::InvalidCardTransition(
                "the card is cancelled".to_string(),
            )),
            (CardStatus::Active, CardAction::Freeze) => Ok(CardStatus::Frozen),
            (CardStatus::Frozen, CardAction::Unfreeze) => Ok(CardStatus::Active),
            (_, CardAction::Cancel) => Ok(CardStatus::Cancelled),
            (CardStatus::Frozen, CardAction::Freeze) => Err(BankingError::InvalidCardTransition(
                "the card is already frozen".to_string(),
            )),
            (CardStatus::Active, CardAction::Unfreeze) => Err(
                BankingError::InvalidCardTransition("the card is already active".to_string()),
            ),
        }
    }
}

impl FromStr for CardStatus {
    type Err = BankingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CardStatus::Active),
            "frozen" => Ok(CardStatus::Frozen),
            "cancelled" => Ok(CardStatus::Cancelled),
            other => Err(BankingError::DatabaseError(format!(
                "unknown card status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CardAction {
    Freeze,
    Unfreeze,
    Cancel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub card_id: Uuid,
    pub owner_id: Uuid,
    pub account_number: String,
    pub card_number: String,
    #[serde(skip_serializing)]
    pub cvv: String,
    /// `MM/YYYY`
    pub expiry: String,
    pub tier: CardTier,
    pub credit_limit: Decimal,
    pub used_credit: Decimal,
    pub status: CardStatus,
    pub created_at: DateTime<Utc>,
}

impl Card {
    pub fn masked_number(&self) -> String {
        mask_card_number(&self.card_number)
    }

    pub fn last_four(&self) -> &str {
        let len = self.card_number.len();
        &self.card_number[len.saturating_sub(4)..]
    }

    /// Outward-facing view; the full number and CVV never leave the store.
    pub fn summary(&self) -> Value {
        serde_json::json!({
            "card_id": self.card_id,
            "card_number": self.masked_number(),
            "tier": self.tier,
            "credit_limit": self.credit_limit,
            "used_credit": self.used_credit,
            "expiry": self.expiry,
            "status": self.status,
        })
    }
}

pub fn mask_card_number(number: &str) -> String {
    let len = number.len();
    format!("****-****-****-{}", &number[len.saturating_sub(4)..])
}

//
// ================= Loans =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Applied,
    Approved,
    Disbursed,
    Rejected,
}

impl LoanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LoanStatus::Applied => "applied",
            LoanStatus::Approved => "approved",
            LoanStatus::Disbursed => "disbursed",
            LoanStatus::Rejected => "rejected",
        }
    }

    pub fn can_transition_to(self, next: LoanStatus) -> bool {
        matches!(
            (self, next),
            (LoanStatus::Applied, LoanStatus::Approved)
                | (LoanStatus::Applied, LoanStatus::Rejected)
                | (LoanStatus::Approved, LoanStatus::Disbursed)
        )
    }
}

impl FromStr for LoanStatus {
    type Err = BankingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "applied" => Ok(LoanStatus::Applied),
            "approved" => Ok(LoanStatus::Approved),
            "disbursed" => Ok(LoanStatus::Disbursed),
            "rejected" => Ok(LoanStatus::Rejected),
            other => Err(BankingError::DatabaseError(format!(
                "unknown loan status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub loan_id: Uuid,
    pub owner_id: Uuid,
    pub account_number: String,
    pub principal: Decimal,
    pub interest_rate: Decimal,
    pub tenure_months: u32,
    pub emi: Decimal,
    pub total_repayment: Decimal,
    pub purpose: String,
    pub status: LoanStatus,
    pub credit_score: u32,
    pub remaining_balance: Decimal,
    pub created_at: DateTime<Utc>,
}

//
// ================= Operation results =================
//

/// Result-kind tag carried by every operation response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Balance,
    Transactions,
    TransferConfirm,
    TransferSubmitted,
    CardEligibility,
    PickCard,
    CardConfirm,
    CardIssued,
    CardStatus,
    Cards,
    LoanCreditCheck,
    LoanOffer,
    LoanResult,
    Loans,
    CreditScore,
    AccountOpened,
    Error,
    Unhandled,
}

impl ResultKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultKind::Balance => "balance",
            ResultKind::Transactions => "transactions",
            ResultKind::TransferConfirm => "transfer_confirm",
            ResultKind::TransferSubmitted => "transfer_submitted",
            ResultKind::CardEligibility => "card_eligibility",
            ResultKind::PickCard => "pick_card",
            ResultKind::CardConfirm => "card_confirm",
            ResultKind::CardIssued => "card_issued",
            ResultKind::CardStatus => "card_status",
            ResultKind::Cards => "cards",
            ResultKind::LoanCreditCheck => "loan_credit_check",
            ResultKind::LoanOffer => "loan_offer",
            ResultKind::LoanResult => "loan_result",
            ResultKind::Loans => "loans",
            ResultKind::CreditScore => "credit_score",
            ResultKind::AccountOpened => "account_opened",
            ResultKind::Error => "error",
            ResultKind::Unhandled => "unhandled",
        }
    }
}

/// `{ text, type, data? }` returned from every banking operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: ResultKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionResult {
    pub fn new(kind: ResultKind, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind,
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(ResultKind::Error, text)
    }

    pub fn unhandled() -> Self {
        Self::new(
            ResultKind::Unhandled,
            "I could not process that action. Please try again.",
        )
    }

    pub fn is_error(&self) -> bool {
        self.kind == ResultKind::Error
    }
}

impl From<BankingError> for ActionResult {
    fn from(err: BankingError) -> Self {
        ActionResult::error(err.user_message()).with_data(serde_json::json!({
            "error": format!("{:?}", err.kind()),
        }))
    }
}
