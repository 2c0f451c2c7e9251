//! Error types for the banking orchestrator

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type alias for banking operations
pub type Result<T> = std::result::Result<T, BankingError>;

/// Coarse classification used to decide how an error crosses the operation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Infrastructure,
    Atomicity,
}

#[derive(Error, Debug)]
pub enum BankingError {

    // =============================
    // Validation Errors
    // =============================

    #[error("Missing parameters: {0}")]
    MissingParameters(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Cannot transfer to the same account")]
    SelfTransfer,

    #[error("Insufficient balance: available {available}")]
    InsufficientBalance { available: Decimal },

    #[error("Account {0} is not active")]
    AccountInactive(String),

    #[error("Recipient account {0} is not active")]
    RecipientInactive(String),

    #[error("Amount {amount} outside allowed range {min}..={max}")]
    AmountOutOfRange { amount: Decimal, min: Decimal, max: Decimal },

    #[error("Tenure {tenure} outside allowed range {min}..={max}")]
    TenureOutOfRange { tenure: u32, min: u32, max: u32 },

    #[error("Owner already holds a {0} card")]
    DuplicateCardTier(String),

    #[error("Invalid card transition: {0}")]
    InvalidCardTransition(String),

    // =============================
    // Not Found
    // =============================

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Recipient account not found: {0}")]
    RecipientNotFound(String),

    #[error("Card not found: {0}")]
    CardNotFound(String),

    #[error("Loan not found: {0}")]
    LoanNotFound(String),

    // =============================
    // Infrastructure
    // =============================

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Event delivery error: {0}")]
    DeliveryError(String),

    #[error("Settlement queue error: {0}")]
    QueueError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // =============================
    // Atomicity
    // =============================

    #[error("Transaction reference collision: {0}")]
    ReferenceCollision(String),

    #[error("Atomicity violation: {0}")]
    AtomicityViolation(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sqlx::Error> for BankingError {
    fn from(e: sqlx::Error) -> Self {
        BankingError::DatabaseError(e.to_string())
    }
}

impl BankingError {
    pub fn kind(&self) -> ErrorKind {
        use BankingError::*;

        match self {
            MissingParameters(_)
            | InvalidAmount(_)
            | SelfTransfer
            | InsufficientBalance { .. }
            | AccountInactive(_)
            | RecipientInactive(_)
            | AmountOutOfRange { .. }
            | TenureOutOfRange { .. }
            | DuplicateCardTier(_)
            | InvalidCardTransition(_) => ErrorKind::Validation,

            AccountNotFound(_) | RecipientNotFound(_) | CardNotFound(_) | LoanNotFound(_) => {
                ErrorKind::NotFound
            }

            ReferenceCollision(_) | AtomicityViolation(_) => ErrorKind::Atomicity,

            DatabaseError(_) | LlmError(_) | DeliveryError(_) | QueueError(_)
            | ConfigurationError(_) | SerializationError(_) | HttpError(_) | IoError(_) => {
                ErrorKind::Infrastructure
            }
        }
    }

    /// Text safe to show the end user. Infrastructure detail never leaks.
    pub fn user_message(&self) -> String {
        use BankingError::*;

        match self {
            MissingParameters(what) => format!("Please provide {}.", what),
            InvalidAmount(reason) => format!("That amount is not valid: {}.", reason),
            SelfTransfer => "You cannot transfer to your own account.".to_string(),
            InsufficientBalance { available } => format!(
                "Insufficient balance. Your current balance is **{:.2}**.",
                available
            ),
            AccountInactive(_) => "Your account is not active.".to_string(),
            RecipientInactive(acct) => format!("Recipient account **{}** is not active.", acct),
            AmountOutOfRange { min, max, .. } => format!(
                "Loan amount must be between {:.0} and {:.0}.",
                min, max
            ),
            TenureOutOfRange { min, max, .. } => {
                format!("Tenure must be between {} and {} months.", min, max)
            }
            DuplicateCardTier(tier) => format!("You already have a **{}** credit card.", tier),
            InvalidCardTransition(reason) => format!("That card change is not allowed: {}.", reason),
            AccountNotFound(_) => "Your account was not found.".to_string(),
            RecipientNotFound(acct) => format!("Recipient account **{}** not found.", acct),
            CardNotFound(_) => "Card not found.".to_string(),
            LoanNotFound(_) => "Loan not found.".to_string(),
            _ => "I could not process that action. Please try again.".to_string(),
        }
    }
}
