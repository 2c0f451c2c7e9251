//! Banking configuration
//!
//! A single value object injected into operations. Loaded from an optional
//! JSON profile (`BANK_PROFILE_PATH`) plus a few environment overrides.

use crate::error::BankingError;
use crate::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrencyConfig {
    pub code: String,
    pub symbol: String,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            code: "USD".to_string(),
            symbol: "$".to_string(),
        }
    }
}

/// Credit limit per card tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CardLimits {
    pub standard: Decimal,
    pub gold: Decimal,
    pub platinum: Decimal,
}

impl Default for CardLimits {
    fn default() -> Self {
        Self {
            standard: dec!(5000),
            gold: dec!(15000),
            platinum: dec!(25000),
        }
    }
}

/// Annual income thresholds for tier eligibility and recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CardIncomeBands {
    pub gold_eligible_from: Decimal,
    pub platinum_eligible_from: Decimal,
    pub gold_recommended_from: Decimal,
    pub platinum_recommended_from: Decimal,
}

impl Default for CardIncomeBands {
    fn default() -> Self {
        Self {
            gold_eligible_from: dec!(40000),
            platinum_eligible_from: dec!(80000),
            gold_recommended_from: dec!(60000),
            platinum_recommended_from: dec!(120000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoanSettings {
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub min_tenure_months: u32,
    pub max_tenure_months: u32,
    pub default_tenure_months: u32,
    /// Scores at or above this are approved and disbursed immediately.
    pub approval_threshold: u32,
    /// Payslip offers below this score are approved at `partial_approval_factor`.
    pub full_approval_score: u32,
    pub partial_approval_factor: Decimal,
}

impl Default for LoanSettings {
    fn default() -> Self {
        Self {
            min_amount: dec!(1000),
            max_amount: dec!(100000),
            min_tenure_months: 3,
            max_tenure_months: 60,
            default_tenure_months: 12,
            approval_threshold: 650,
            full_approval_score: 720,
            partial_approval_factor: dec!(0.9),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateTier {
    pub min_score: u32,
    /// Annual percentage rate, e.g. `10.5`.
    pub annual_rate: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Inclusive lower bound of simulated scores.
    pub simulated_min: u32,
    /// Exclusive upper bound of simulated scores.
    pub simulated_max: u32,
    /// Checked in descending `min_score` order.
    pub rate_tiers: Vec<RateTier>,
    pub fallback_rate: Decimal,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            simulated_min: 650,
            simulated_max: 850,
            rate_tiers: vec![
                RateTier { min_score: 800, annual_rate: dec!(8.5) },
                RateTier { min_score: 720, annual_rate: dec!(10.5) },
                RateTier { min_score: 650, annual_rate: dec!(13.5) },
                RateTier { min_score: 580, annual_rate: dec!(16.5) },
            ],
            fallback_rate: dec!(21.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    pub enabled: bool,
    pub topic: String,
    pub consumer_group: String,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            topic: "owbank-transfers".to_string(),
            consumer_group: "owbank-transactions".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BankingConfig {
    pub currency: CurrencyConfig,
    pub welcome_bonus: Decimal,
    pub account_prefix: String,
    pub first_account_number: u32,
    pub card_limits: CardLimits,
    pub card_income: CardIncomeBands,
    pub loans: LoanSettings,
    pub scoring: ScoringConfig,
    pub transaction_history_limit: usize,
    pub session_turns: usize,
    pub events: EventSettings,
    pub settlement_queue_capacity: usize,
}

impl Default for BankingConfig {
    fn default() -> Self {
        Self {
            currency: CurrencyConfig::default(),
            welcome_bonus: dec!(1000),
            account_prefix: "OW".to_string(),
            first_account_number: 10001,
            card_limits: CardLimits::default(),
            card_income: CardIncomeBands::default(),
            loans: LoanSettings::default(),
            scoring: ScoringConfig::default(),
            transaction_history_limit: 5,
            session_turns: 20,
            events: EventSettings::default(),
            settlement_queue_capacity: 256,
        }
    }
}

impl BankingConfig {
    /// Load `.env`, an optional JSON profile, then environment overrides.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match env::var("BANK_PROFILE_PATH") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)?;
                let parsed: BankingConfig = serde_json::from_str(&raw).map_err(|e| {
                    BankingError::ConfigurationError(format!(
                        "Invalid banking profile {}: {}",
                        path, e
                    ))
                })?;
                info!(path = %path, "Loaded banking profile");
                parsed
            }
            Err(_) => BankingConfig::default(),
        };

        if let Ok(code) = env::var("BANK_CURRENCY") {
            config.currency.code = code;
        }
        if let Ok(symbol) = env::var("BANK_CURRENCY_SYMBOL") {
            config.currency.symbol = symbol;
        }
        if let Ok(flag) = env::var("BANK_EVENTS_ENABLED") {
            config.events.enabled = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.loans.min_amount > self.loans.max_amount {
            return Err(BankingError::ConfigurationError(
                "loans.min_amount exceeds loans.max_amount".to_string(),
            ));
        }
        if self.loans.min_tenure_months == 0
            || self.loans.min_tenure_months > self.loans.max_tenure_months
        {
            return Err(BankingError::ConfigurationError(
                "loan tenure band is empty".to_string(),
            ));
        }
        if self.scoring.simulated_min >= self.scoring.simulated_max {
            return Err(BankingError::ConfigurationError(
                "scoring.simulated_min must be below simulated_max".to_string(),
            ));
        }
        Ok(())
    }

    /// Format an amount with the configured symbol, e.g. `$1,625.13`.
    pub fn money(&self, amount: Decimal) -> String {
        format_money(&self.currency.symbol, amount)
    }
}

pub fn format_money(symbol: &str, amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let plain = format!("{:.2}", rounded.abs());
    let (whole, fraction) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{}{}{}.{}", sign, symbol, grouped, fraction)
}
