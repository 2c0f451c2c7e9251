//! Action handler trait and router
//!
//! Handlers are thin adapters: they pull loosely-typed intent parameters
//! into typed requests and delegate to [`BankingOperations`]. The router
//! itself performs no validation.

use crate::intent::Intent;
use crate::models::{ActionResult, CardAction};
use crate::operations::{BankingOperations, LoanConfirmation, LoanQuery, TransferRequest};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Who is asking, and on which account.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub caller_id: Uuid,
    pub account_number: String,
}

impl ActionContext {
    pub fn new(caller_id: Uuid, account_number: impl Into<String>) -> Self {
        Self {
            caller_id,
            account_number: account_number.into(),
        }
    }
}

/// Trait for a single routed action
#[async_trait::async_trait]
pub trait ActionHandler: Send + Sync {
    fn action(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn handle(&self, ctx: &ActionContext, params: &Value) -> ActionResult;
}

/// Fixed table from intent name to handler
pub struct ActionRouter {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRouter {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(handler.action().to_string(), handler);
    }

    /// Route `alias` to the handler already registered for `action`.
    pub fn register_alias(&mut self, alias: &str, action: &str) {
        if let Some(handler) = self.get(action) {
            self.handlers.insert(alias.to_string(), handler);
        }
    }

    pub fn get(&self, action: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(action).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        let mut actions: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        actions.sort_unstable();
        actions
    }

    /// Dispatch `intent`. Unknown actions yield an `unhandled` result, never an error.
    pub async fn route(&self, ctx: &ActionContext, intent: &Intent) -> ActionResult {
        let action = intent.action.trim().to_uppercase();
        match self.get(&action) {
            Some(handler) => {
                debug!(action = %action, caller = %ctx.caller_id, "Dispatching action");
                handler.handle(ctx, &intent.params).await
            }
            None => {
                warn!(action = %intent.action, "Unknown action type");
                ActionResult::unhandled()
            }
        }
    }
}

impl Default for ActionRouter {
    fn default() -> Self {
        Self::new()
    }
}

//
// ================= Parameter coercion =================
//

fn lookup<'a>(params: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| params.get(*key))
        .find(|value| !value.is_null())
}

pub(crate) fn str_param(params: &Value, keys: &[&str]) -> Option<String> {
    match lookup(params, keys)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accepts `500`, `500.25`, `"500"` or `"$1,500.00"`.
pub(crate) fn decimal_param(params: &Value, keys: &[&str]) -> Option<Decimal> {
    match lookup(params, keys)? {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            Decimal::from_str(&cleaned).ok()
        }
        _ => None,
    }
}

pub(crate) fn u32_param(params: &Value, keys: &[&str]) -> Option<u32> {
    match lookup(params, keys)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s
            .split_whitespace()
            .next()
            .and_then(|token| token.parse().ok()),
        _ => None,
    }
}

pub(crate) fn bool_param(params: &Value, keys: &[&str]) -> bool {
    match lookup(params, keys) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "y"),
        _ => false,
    }
}

fn transfer_request(params: &Value) -> TransferRequest {
    TransferRequest {
        to_account: str_param(params, &["toAccount", "to_account", "recipient"]).unwrap_or_default(),
        amount: decimal_param(params, &["amount"]).unwrap_or_default(),
        description: str_param(params, &["description", "note"]),
    }
}

fn loan_query(params: &Value) -> LoanQuery {
    LoanQuery {
        amount: decimal_param(params, &["amount"]),
        tenure: u32_param(params, &["tenure", "tenureMonths"]),
        purpose: str_param(params, &["purpose"]),
        income: decimal_param(params, &["income"]),
    }
}

fn card_ref(params: &Value) -> String {
    str_param(params, &["lastFour", "last4", "cardId", "card"]).unwrap_or_default()
}

//
// ================= Handlers =================
//

/// Declares a handler struct holding the shared operations.
macro_rules! handler {
    ($name:ident) => {
        pub struct $name {
            ops: Arc<BankingOperations>,
        }

        impl $name {
            pub fn new(ops: Arc<BankingOperations>) -> Self {
                Self { ops }
            }
        }
    };
}

handler!(GetBalanceHandler);
handler!(GetTransactionsHandler);
handler!(TransferHandler);
handler!(ConfirmTransferHandler);
handler!(CardEligibilityHandler);
handler!(ApplyCardHandler);
handler!(ListCardsHandler);
handler!(LoanCreditCheckHandler);
handler!(LoanPayslipHandler);
handler!(LoanConfirmHandler);
handler!(ListLoansHandler);
handler!(CreditScoreHandler);

#[async_trait::async_trait]
impl ActionHandler for GetBalanceHandler {
    fn action(&self) -> &'static str {
        "GET_BALANCE"
    }

    fn description(&self) -> &'static str {
        "Current balance of the caller's account"
    }

    async fn handle(&self, ctx: &ActionContext, _params: &Value) -> ActionResult {
        self.ops.get_balance(&ctx.account_number).await
    }
}

#[async_trait::async_trait]
impl ActionHandler for GetTransactionsHandler {
    fn action(&self) -> &'static str {
        "GET_TRANSACTIONS"
    }

    fn description(&self) -> &'static str {
        "Recent transactions, newest first"
    }

    async fn handle(&self, ctx: &ActionContext, params: &Value) -> ActionResult {
        let limit = u32_param(params, &["limit"]).map(|n| n as usize);
        self.ops.list_transactions(&ctx.account_number, limit).await
    }
}

#[async_trait::async_trait]
impl ActionHandler for TransferHandler {
    fn action(&self) -> &'static str {
        "TRANSFER"
    }

    fn description(&self) -> &'static str {
        "Summarise a transfer for confirmation, or submit it when confirmed"
    }

    async fn handle(&self, ctx: &ActionContext, params: &Value) -> ActionResult {
        let request = transfer_request(params);
        if bool_param(params, &["confirmed"]) {
            self.ops.confirm_transfer(&ctx.account_number, request).await
        } else {
            self.ops.initiate_transfer(&ctx.account_number, request).await
        }
    }
}

#[async_trait::async_trait]
impl ActionHandler for ConfirmTransferHandler {
    fn action(&self) -> &'static str {
        "CONFIRM_TRANSFER"
    }

    fn description(&self) -> &'static str {
        "Submit a previously summarised transfer"
    }

    async fn handle(&self, ctx: &ActionContext, params: &Value) -> ActionResult {
        self.ops
            .confirm_transfer(&ctx.account_number, transfer_request(params))
            .await
    }
}

#[async_trait::async_trait]
impl ActionHandler for CardEligibilityHandler {
    fn action(&self) -> &'static str {
        "CARD_CHECK_ELIGIBILITY"
    }

    fn description(&self) -> &'static str {
        "Card tiers available for an employment status and income"
    }

    async fn handle(&self, _ctx: &ActionContext, params: &Value) -> ActionResult {
        self.ops
            .check_card_eligibility(
                str_param(params, &["employment"]),
                decimal_param(params, &["income"]).unwrap_or_default(),
            )
            .await
    }
}

#[async_trait::async_trait]
impl ActionHandler for ApplyCardHandler {
    fn action(&self) -> &'static str {
        "APPLY_CREDIT_CARD"
    }

    fn description(&self) -> &'static str {
        "Apply for a credit card tier"
    }

    async fn handle(&self, ctx: &ActionContext, params: &Value) -> ActionResult {
        self.ops
            .apply_for_card(
                &ctx.account_number,
                str_param(params, &["cardType", "card_type", "tier"]),
                bool_param(params, &["confirmed"]),
            )
            .await
    }
}

#[async_trait::async_trait]
impl ActionHandler for ListCardsHandler {
    fn action(&self) -> &'static str {
        "LIST_CARDS"
    }

    fn description(&self) -> &'static str {
        "Cards held by the caller"
    }

    async fn handle(&self, ctx: &ActionContext, _params: &Value) -> ActionResult {
        self.ops.list_cards(&ctx.account_number).await
    }
}

/// One handler per card status action.
pub struct CardStatusHandler {
    ops: Arc<BankingOperations>,
    action: CardAction,
}

impl CardStatusHandler {
    pub fn new(ops: Arc<BankingOperations>, action: CardAction) -> Self {
        Self { ops, action }
    }
}

#[async_trait::async_trait]
impl ActionHandler for CardStatusHandler {
    fn action(&self) -> &'static str {
        match self.action {
            CardAction::Freeze => "FREEZE_CARD",
            CardAction::Unfreeze => "UNFREEZE_CARD",
            CardAction::Cancel => "CANCEL_CARD",
        }
    }

    fn description(&self) -> &'static str {
        match self.action {
            CardAction::Freeze => "Temporarily block a card",
            CardAction::Unfreeze => "Reactivate a frozen card",
            CardAction::Cancel => "Permanently cancel a card",
        }
    }

    async fn handle(&self, ctx: &ActionContext, params: &Value) -> ActionResult {
        self.ops
            .set_card_status(&ctx.account_number, &card_ref(params), self.action)
            .await
    }
}

#[async_trait::async_trait]
impl ActionHandler for LoanCreditCheckHandler {
    fn action(&self) -> &'static str {
        "LOAN_CHECK_CREDIT_SCORE"
    }

    fn description(&self) -> &'static str {
        "Credit check and priced loan offer"
    }

    async fn handle(&self, ctx: &ActionContext, params: &Value) -> ActionResult {
        self.ops
            .check_loan_credit_score(&ctx.account_number, loan_query(params))
            .await
    }
}

#[async_trait::async_trait]
impl ActionHandler for LoanPayslipHandler {
    fn action(&self) -> &'static str {
        "LOAN_VERIFY_PAYSLIP"
    }

    fn description(&self) -> &'static str {
        "Payslip verification followed by a credit check"
    }

    async fn handle(&self, ctx: &ActionContext, params: &Value) -> ActionResult {
        self.ops
            .verify_payslip_and_score(&ctx.account_number, loan_query(params))
            .await
    }
}

#[async_trait::async_trait]
impl ActionHandler for LoanConfirmHandler {
    fn action(&self) -> &'static str {
        "LOAN_CONFIRM"
    }

    fn description(&self) -> &'static str {
        "Accept a loan offer"
    }

    async fn handle(&self, ctx: &ActionContext, params: &Value) -> ActionResult {
        let confirmation = LoanConfirmation {
            amount: decimal_param(params, &["amount"]),
            tenure: u32_param(params, &["tenure", "tenureMonths"]),
            purpose: str_param(params, &["purpose"]),
            score: u32_param(params, &["creditScore", "score"]),
            rate: decimal_param(params, &["interestRate", "rate"]),
            emi: decimal_param(params, &["emi"]),
            income: decimal_param(params, &["income"]),
        };
        self.ops.confirm_loan(&ctx.account_number, confirmation).await
    }
}

#[async_trait::async_trait]
impl ActionHandler for ListLoansHandler {
    fn action(&self) -> &'static str {
        "LIST_LOANS"
    }

    fn description(&self) -> &'static str {
        "Loans held by the caller"
    }

    async fn handle(&self, ctx: &ActionContext, _params: &Value) -> ActionResult {
        self.ops.list_loans(&ctx.account_number).await
    }
}

#[async_trait::async_trait]
impl ActionHandler for CreditScoreHandler {
    fn action(&self) -> &'static str {
        "GET_CREDIT_SCORE"
    }

    fn description(&self) -> &'static str {
        "Current credit score and rating"
    }

    async fn handle(&self, ctx: &ActionContext, _params: &Value) -> ActionResult {
        self.ops.get_credit_score(&ctx.account_number).await
    }
}

/// Router with every supported banking action.
pub fn create_default_router(ops: Arc<BankingOperations>) -> ActionRouter {
    let mut router = ActionRouter::new();

    router.register(Arc::new(GetBalanceHandler::new(ops.clone())));
    router.register(Arc::new(GetTransactionsHandler::new(ops.clone())));
    router.register(Arc::new(TransferHandler::new(ops.clone())));
    router.register(Arc::new(ConfirmTransferHandler::new(ops.clone())));
    router.register_alias("TRANSFER_INITIATE", "TRANSFER");
    router.register_alias("TRANSFER_CONFIRM", "CONFIRM_TRANSFER");

    router.register(Arc::new(CardEligibilityHandler::new(ops.clone())));
    router.register(Arc::new(ApplyCardHandler::new(ops.clone())));
    router.register(Arc::new(ListCardsHandler::new(ops.clone())));
    for action in [CardAction::Freeze, CardAction::Unfreeze, CardAction::Cancel] {
        router.register(Arc::new(CardStatusHandler::new(ops.clone(), action)));
    }

    router.register(Arc::new(LoanCreditCheckHandler::new(ops.clone())));
    router.register(Arc::new(LoanPayslipHandler::new(ops.clone())));
    router.register(Arc::new(LoanConfirmHandler::new(ops.clone())));
    router.register(Arc::new(ListLoansHandler::new(ops.clone())));

    router.register(Arc::new(CreditScoreHandler::new(ops)));

    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResultKind;
    use crate::operations::test_support::Harness;
    use rust_decimal_macros::dec;
    use serde_json::json;

    async fn setup() -> (Harness, ActionRouter, ActionContext, String) {
        let h = Harness::new(780).await;
        let a = h.open("Ada").await;
        let b = h.open("Grace").await;
        let router = create_default_router(h.ops_handle());
        let ctx = ActionContext::new(Uuid::new_v4(), a);
        (h, router, ctx, b)
    }

    #[test]
    fn test_param_coercion() {
        let params = json!({
            "amount": "$1,500.50",
            "tenure": "36 months",
            "limit": 3.0,
            "confirmed": "yes",
            "toAccount": 10002,
        });
        assert_eq!(decimal_param(&params, &["amount"]), Some(dec!(1500.50)));
        assert_eq!(u32_param(&params, &["tenure"]), Some(36));
        assert_eq!(u32_param(&params, &["limit"]), Some(3));
        assert!(bool_param(&params, &["confirmed"]));
        assert_eq!(str_param(&params, &["toAccount"]), Some("10002".to_string()));
        assert_eq!(decimal_param(&json!({ "amount": 250 }), &["amount"]), Some(dec!(250)));
        assert!(!bool_param(&json!({}), &["confirmed"]));
    }

    #[tokio::test]
    async fn test_every_action_is_registered() {
        let (_h, router, _ctx, _b) = setup().await;
        assert_eq!(
            router.list(),
            vec![
                "APPLY_CREDIT_CARD",
                "CANCEL_CARD",
                "CARD_CHECK_ELIGIBILITY",
                "CONFIRM_TRANSFER",
                "FREEZE_CARD",
                "GET_BALANCE",
                "GET_CREDIT_SCORE",
                "GET_TRANSACTIONS",
                "LIST_CARDS",
                "LIST_LOANS",
                "LOAN_CHECK_CREDIT_SCORE",
                "LOAN_CONFIRM",
                "LOAN_VERIFY_PAYSLIP",
                "TRANSFER",
                "TRANSFER_CONFIRM",
                "TRANSFER_INITIATE",
                "UNFREEZE_CARD",
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_action_is_unhandled() {
        let (_h, router, ctx, _b) = setup().await;
        let result = router.route(&ctx, &Intent::new("LAUNCH_ROCKET", json!({}))).await;
        assert_eq!(result.kind, ResultKind::Unhandled);
        assert_eq!(result.text, "I could not process that action. Please try again.");
    }

    #[tokio::test]
    async fn test_transfer_confirm_flag_selects_phase() {
        let (h, router, ctx, b) = setup().await;

        let summary = router
            .route(&ctx, &Intent::new("TRANSFER", json!({ "toAccount": b, "amount": 500 })))
            .await;
        assert_eq!(summary.kind, ResultKind::TransferConfirm);

        let submitted = router
            .route(
                &ctx,
                &Intent::new("TRANSFER", json!({ "toAccount": b, "amount": "500", "confirmed": true })),
            )
            .await;
        assert_eq!(submitted.kind, ResultKind::TransferSubmitted);
        h.settle().await;

        let balance = router.route(&ctx, &Intent::new("get_balance", json!({}))).await;
        assert!(balance.text.contains("$500.00"));
    }

    #[tokio::test]
    async fn test_card_actions_route_by_last_four() {
        let (_h, router, ctx, _b) = setup().await;
        let issued = router
            .route(
                &ctx,
                &Intent::new("APPLY_CREDIT_CARD", json!({ "cardType": "platinum", "confirmed": true })),
            )
            .await;
        assert_eq!(issued.kind, ResultKind::CardIssued);
        let masked = issued.data.unwrap()["card_number"].as_str().unwrap().to_string();
        let last_four = masked[masked.len() - 4..].to_string();

        let frozen = router
            .route(&ctx, &Intent::new("FREEZE_CARD", json!({ "lastFour": last_four })))
            .await;
        assert_eq!(frozen.kind, ResultKind::CardStatus);

        let listed = router.route(&ctx, &Intent::new("LIST_CARDS", json!({}))).await;
        assert!(listed.text.contains("frozen"));
    }
}
