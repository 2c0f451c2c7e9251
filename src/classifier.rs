//! Message Classifier
//!
//! Cheap keyword heuristics around the model call:
//! - Topic guard: refuse clearly non-banking requests before calling the model
//! - Fallback intent: derive an action from the user's words when the model emitted none
//! - Agent label: which desk (Transaction, Card, Loan, Manager) the reply came from
//! - Follow-up inference: what the assistant is asking for when no action ran

use crate::intent::Intent;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

lazy_static! {
    static ref NON_BANKING_PATTERNS: Vec<Regex> = [
        r"\b(joke|funny|humor|laugh)\b",
        r"\b(recipe|cook|bake|ingredient)\b",
        r"\b(weather|forecast|temperature)\b",
        r"\b(poem|poetry|story|tale|fiction)\b",
        r"\b(code|program|javascript|python|html|css)\b",
        r"\b(movie|film|song|music|lyrics|actor|actress)\b",
        r"\b(game|play|sport|football|cricket|basketball)\b",
        r"\b(travel|vacation|flight|hotel|tourism)\b",
        r"\b(diet|exercise|workout|fitness|yoga)\b",
        r"\b(astrology|horoscope|zodiac)\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect();

    /// `Label: value` lines that look like ledger data.
    static ref LEDGER_LIKE_LINE: Regex =
        Regex::new(r"(?i)(?:Date|Time|Reference|Amount|Status|Balance|Transaction):\s*[\w\d\s,.-]+")
            .unwrap();
}

/// Prose longer than this that also contains ledger-like lines is treated as invented.
const HALLUCINATION_MIN_LEN: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AgentLabel {
    Transaction,
    Card,
    Loan,
    Manager,
}

/// Message classifier
pub struct MessageClassifier;

impl MessageClassifier {
    /// True when the message is clearly outside banking.
    pub fn is_non_banking(message: &str) -> bool {
        let lower = message.to_lowercase();
        NON_BANKING_PATTERNS.iter().any(|re| re.is_match(&lower))
    }

    /// Intent implied by the user's own words.
    pub fn fallback_intent(message: &str) -> Option<Intent> {
        let lower = message.to_lowercase();

        if lower.contains("balance") {
            Some(Intent::new("GET_BALANCE", json!({})))
        } else if lower.contains("transaction") || lower.contains("history") {
            Some(Intent::new("GET_TRANSACTIONS", json!({ "limit": 5 })))
        } else if lower.contains("credit score") {
            Some(Intent::new("GET_CREDIT_SCORE", json!({})))
        } else {
            None
        }
    }

    /// Whether conversational prose invents ledger figures.
    pub fn looks_hallucinated(prose: &str) -> bool {
        prose.len() > HALLUCINATION_MIN_LEN && LEDGER_LIKE_LINE.is_match(prose)
    }

    pub fn classify_agent(reply: &str, action_type: Option<&str>) -> AgentLabel {
        let lower = reply.to_lowercase();
        let action_type = action_type.unwrap_or_default();

        if lower.contains("transfer")
            || lower.contains("transaction")
            || matches!(action_type, "transfer_submitted" | "transfer_confirm" | "transactions")
        {
            AgentLabel::Transaction
        } else if lower.contains("card")
            || lower.contains("credit limit")
            || matches!(action_type, "card_issued" | "pick_card" | "card_confirm")
        {
            AgentLabel::Card
        } else if lower.contains("loan")
            || lower.contains("emi")
            || lower.contains("tenure")
            || action_type == "loan_result"
        {
            AgentLabel::Loan
        } else {
            AgentLabel::Manager
        }
    }

    /// Follow-up the assistant is prompting for, when no action ran.
    pub fn infer_action_type(reply: &str) -> Option<&'static str> {
        let lower = reply.to_lowercase();

        if (lower.contains("standard") && lower.contains("gold") && lower.contains("platinum"))
            || lower.contains("which card")
        {
            Some("pick_card")
        } else if lower.contains("transfer")
            && (lower.contains("account number") || lower.contains("how much"))
        {
            Some("transfer_prompt")
        } else if lower.contains("loan") && (lower.contains("how much") || lower.contains("amount")) {
            Some("loan_prompt")
        } else {
            None
        }
    }
}
