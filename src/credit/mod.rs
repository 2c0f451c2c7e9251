//! Credit decisioning
//!
//! Pure functions for card eligibility and loan pricing, plus the
//! `CreditScorer` seam that produces a score for a fresh applicant.

pub mod scoring;

pub use scoring::{CreditScorer, FixedScorer, SimulatedScorer};

use crate::config::{BankingConfig, ScoringConfig};
use crate::models::CardTier;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// One row of an eligibility answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CardOffer {
    pub tier: CardTier,
    pub credit_limit: Decimal,
    pub eligible: bool,
    pub recommended: bool,
}

pub fn credit_limit(config: &BankingConfig, tier: CardTier) -> Decimal {
    match tier {
        CardTier::Standard => config.card_limits.standard,
        CardTier::Gold => config.card_limits.gold,
        CardTier::Platinum => config.card_limits.platinum,
    }
}

/// Offers for every tier, pure in `income`.
pub fn card_eligibility(config: &BankingConfig, annual_income: Decimal) -> Vec<CardOffer> {
    let bands = &config.card_income;

    CardTier::ALL
        .iter()
        .map(|&tier| {
            let (eligible, recommended) = match tier {
                CardTier::Standard => (
                    annual_income >= Decimal::ZERO,
                    annual_income < bands.gold_recommended_from,
                ),
                CardTier::Gold => (
                    annual_income >= bands.gold_eligible_from,
                    annual_income >= bands.gold_recommended_from
                        && annual_income < bands.platinum_recommended_from,
                ),
                CardTier::Platinum => (
                    annual_income >= bands.platinum_eligible_from,
                    annual_income >= bands.platinum_recommended_from,
                ),
            };
            CardOffer {
                tier,
                credit_limit: credit_limit(config, tier),
                eligible,
                recommended,
            }
        })
        .collect()
}

/// Annual rate for a score, first matching tier wins.
pub fn interest_rate(scoring: &ScoringConfig, score: u32) -> Decimal {
    let mut tiers: Vec<_> = scoring.rate_tiers.iter().collect();
    tiers.sort_by(|a, b| b.min_score.cmp(&a.min_score));

    tiers
        .into_iter()
        .find(|tier| score >= tier.min_score)
        .map(|tier| tier.annual_rate)
        .unwrap_or(scoring.fallback_rate)
}

pub fn credit_rating(score: u32) -> &'static str {
    match score {
        s if s >= 800 => "Excellent",
        s if s >= 720 => "Good",
        s if s >= 650 => "Fair",
        _ => "Poor",
    }
}

/// Equated monthly installment: `P·r·(1+r)^n / ((1+r)^n − 1)`, rounded to cents.
///
/// `annual_rate` is a percentage. A zero rate degenerates to `P / n`.
pub fn calculate_emi(principal: Decimal, annual_rate: Decimal, months: u32) -> Decimal {
    if months == 0 {
        return principal;
    }

    let n = Decimal::from(months);
    let monthly = annual_rate / Decimal::from(12) / Decimal::ONE_HUNDRED;

    let emi = if monthly.is_zero() {
        principal / n
    } else {
        let growth = (0..months).fold(Decimal::ONE, |acc, _| acc * (Decimal::ONE + monthly));
        principal * monthly * growth / (growth - Decimal::ONE)
    };

    emi.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `EMI × tenure`, rounded to whole currency units.
pub fn total_repayment(emi: Decimal, months: u32) -> Decimal {
    (emi * Decimal::from(months)).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}
