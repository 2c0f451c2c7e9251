use super::{respond, BankingOperations};
use crate::credit::{card_eligibility, credit_limit};
use crate::error::BankingError;
use crate::models::{ActionResult, Card, CardAction, CardStatus, CardTier, ResultKind};
use crate::Result;
use chrono::{Datelike, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

/// Network prefix for minted card numbers.
const CARD_PREFIX: &str = "4532";
const CARD_VALIDITY_YEARS: i32 = 3;

fn mint_card_number() -> String {
    let mut rng = rand::thread_rng();
    let digits: String = (0..12)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect();
    format!("{}{}", CARD_PREFIX, digits)
}

fn mint_cvv() -> String {
    rand::thread_rng().gen_range(100..1000).to_string()
}

fn expiry_from_now() -> String {
    let now = Utc::now();
    format!("{:02}/{}", now.month(), now.year() + CARD_VALIDITY_YEARS)
}

impl BankingOperations {
    pub async fn check_card_eligibility(
        &self,
        employment: Option<String>,
        annual_income: Decimal,
    ) -> ActionResult {
        let employment = employment
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| "employed".to_string());
        let offers = card_eligibility(&self.config, annual_income.max(Decimal::ZERO));

        let lines: Vec<String> = offers
            .iter()
            .filter(|offer| offer.eligible)
            .map(|offer| {
                format!(
                    "- **{}** card, credit limit {}{}",
                    offer.tier.display_name(),
                    self.config.money(offer.credit_limit),
                    if offer.recommended { " (recommended)" } else { "" }
                )
            })
            .collect();

        ActionResult::new(
            ResultKind::CardEligibility,
            format!(
                "Based on your {} status and annual income of {}, here are your eligible cards:\n\n{}",
                employment,
                self.config.money(annual_income),
                lines.join("\n")
            ),
        )
        .with_data(json!({
            "employment": employment,
            "income": annual_income,
            "eligibleCards": offers,
        }))
    }

    /// Issue a card once the customer named a tier and confirmed it.
    pub async fn apply_for_card(
        &self,
        account_ref: &str,
        card_type: Option<String>,
        confirmed: bool,
    ) -> ActionResult {
        respond("apply_for_card", self.apply_inner(account_ref, card_type, confirmed).await)
    }

    async fn apply_inner(
        &self,
        account_ref: &str,
        card_type: Option<String>,
        confirmed: bool,
    ) -> Result<ActionResult> {
        let tier = match card_type.as_deref().map(str::parse::<CardTier>) {
            Some(Ok(tier)) => tier,
            _ => {
                return Ok(ActionResult::new(
                    ResultKind::PickCard,
                    "Please specify a card type: **standard**, **gold**, or **platinum**.",
                ))
            }
        };

        if !confirmed {
            return Ok(ActionResult::new(
                ResultKind::CardConfirm,
                format!(
                    "Please confirm you want to apply for the **{}** card.",
                    tier.display_name()
                ),
            )
            .with_data(json!({ "cardType": tier })));
        }

        let account = self.require_account(account_ref).await?;

        // Fast path; the store enforces the same rule.
        let held = self.ledger.list_cards(account.owner_id).await?;
        if held
            .iter()
            .any(|card| card.tier == tier && card.status != CardStatus::Cancelled)
        {
            return Err(BankingError::DuplicateCardTier(tier.display_name().to_string()));
        }

        let card = self
            .ledger
            .issue_card(Card {
                card_id: Uuid::new_v4(),
                owner_id: account.owner_id,
                account_number: account.account_number.clone(),
                card_number: mint_card_number(),
                cvv: mint_cvv(),
                expiry: expiry_from_now(),
                tier,
                credit_limit: credit_limit(&self.config, tier),
                used_credit: Decimal::ZERO,
                status: CardStatus::Active,
                created_at: Utc::now(),
            })
            .await?;

        info!(
            account = %account.account_number,
            card_id = %card.card_id,
            tier = tier.as_str(),
            "Card issued"
        );

        Ok(ActionResult::new(
            ResultKind::CardIssued,
            format!(
                "Your **{}** credit card has been issued!\n\n- **Card:** {}\n- **Credit limit:** {}\n- **Expiry:** {}",
                tier.display_name(),
                card.masked_number(),
                self.config.money(card.credit_limit),
                card.expiry,
            ),
        )
        .with_data(card.summary()))
    }

    pub async fn list_cards(&self, account_ref: &str) -> ActionResult {
        respond("list_cards", self.list_cards_inner(account_ref).await)
    }

    async fn list_cards_inner(&self, account_ref: &str) -> Result<ActionResult> {
        let account = self.require_account(account_ref).await?;
        let cards = self.ledger.list_cards(account.owner_id).await?;

        if cards.is_empty() {
            return Ok(ActionResult::new(ResultKind::Cards, "You don't have any cards yet.")
                .with_data(json!({ "cards": [] })));
        }

        let lines: Vec<String> = cards
            .iter()
            .map(|card| {
                format!(
                    "- **{}** {} ({}), limit {}",
                    card.tier.display_name(),
                    card.masked_number(),
                    card.status.as_str(),
                    self.config.money(card.credit_limit)
                )
            })
            .collect();
        let summaries: Vec<Value> = cards.iter().map(Card::summary).collect();

        Ok(ActionResult::new(
            ResultKind::Cards,
            format!("Here are your cards:\n\n{}", lines.join("\n")),
        )
        .with_data(json!({ "cards": summaries })))
    }

    /// Freeze, unfreeze or cancel a card by id or last four digits.
    pub async fn set_card_status(
        &self,
        account_ref: &str,
        card_ref: &str,
        action: CardAction,
    ) -> ActionResult {
        respond("set_card_status", self.card_status_inner(account_ref, card_ref, action).await)
    }

    async fn card_status_inner(
        &self,
        account_ref: &str,
        card_ref: &str,
        action: CardAction,
    ) -> Result<ActionResult> {
        if card_ref.trim().is_empty() {
            return Err(BankingError::MissingParameters(
                "the card's last four digits".to_string(),
            ));
        }

        let account = self.require_account(account_ref).await?;
        let card = self
            .ledger
            .set_card_status(account.owner_id, card_ref, action)
            .await?;

        info!(
            card_id = %card.card_id,
            status = card.status.as_str(),
            "Card status changed"
        );

        Ok(ActionResult::new(
            ResultKind::CardStatus,
            format!(
                "Your **{}** card {} is now **{}**.",
                card.tier.display_name(),
                card.masked_number(),
                card.status.as_str()
            ),
        )
        .with_data(card.summary()))
    }
}
