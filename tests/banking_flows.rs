//! End-to-end flows against the in-memory ledger and in-memory bus.

use banking_orchestrator::credit::FixedScorer;
use banking_orchestrator::events::{BusMessage, InMemoryEventBus, TransferEvent, TransferEventType};
use banking_orchestrator::ledger::{InMemoryLedger, LedgerStore};
use banking_orchestrator::llm::ScriptedChatModel;
use banking_orchestrator::operations::{LoanConfirmation, LoanQuery, TransferRequest};
use banking_orchestrator::reconciliation::{ReconcileOutcome, ReconciliationConsumer};
use banking_orchestrator::{
    clean_response, extract_intent, AccountStatus, AccountType, AgentLabel, BankingConfig,
    BankingRuntime, ChatRequest, LoanStatus, ResultKind, TransactionStatus, TransactionType,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct Bank {
    rt: BankingRuntime,
    bus: Arc<InMemoryEventBus>,
    model: Arc<ScriptedChatModel>,
}

async fn bank(score: u32) -> Bank {
    let bus = Arc::new(InMemoryEventBus::default());
    let model = Arc::new(ScriptedChatModel::new(Vec::<String>::new()));
    let rt = BankingRuntime::start(
        BankingConfig::default(),
        Arc::new(InMemoryLedger::new()),
        bus.clone(),
        Arc::new(FixedScorer(score)),
        model.clone(),
    )
    .await
    .unwrap();
    Bank { rt, bus, model }
}

impl Bank {
    async fn open(&self, name: &str) -> String {
        let result = self
            .rt
            .ops
            .open_account(Uuid::new_v4(), name, AccountType::Savings)
            .await;
        assert_eq!(result.kind, ResultKind::AccountOpened);
        result.data.unwrap()["accountNumber"].as_str().unwrap().to_string()
    }

    async fn balance(&self, account: &str) -> Decimal {
        self.rt.ledger.find_account(account).await.unwrap().unwrap().balance
    }

    async fn history_len(&self, account: &str) -> usize {
        self.rt.ledger.list_transactions(account, 100).await.unwrap().len()
    }

    async fn send(&self, from: &str, to: &str, amount: Decimal) -> String {
        let result = self
            .rt
            .ops
            .confirm_transfer(
                from,
                TransferRequest {
                    to_account: to.to_string(),
                    amount,
                    description: None,
                },
            )
            .await;
        assert_eq!(result.kind, ResultKind::TransferSubmitted, "{}", result.text);
        self.rt.settle().await.unwrap();
        result.data.unwrap()["reference"].as_str().unwrap().to_string()
    }
}

fn transfer(to: &str, amount: Decimal) -> TransferRequest {
    TransferRequest {
        to_account: to.to_string(),
        amount,
        description: None,
    }
}

#[tokio::test]
async fn transfer_of_500_moves_money_and_conserves_total() {
    let b = bank(700).await;
    let a = b.open("Ada").await;
    let grace = b.open("Grace").await;
    let other = b.open("Linus").await;

    // Bring Grace down to 200.
    b.send(&grace, &other, dec!(800)).await;
    assert_eq!(b.balance(&a).await, dec!(1000));
    assert_eq!(b.balance(&grace).await, dec!(200));

    let before = b.balance(&a).await + b.balance(&grace).await;
    let reference = b.send(&a, &grace, dec!(500)).await;

    assert_eq!(b.balance(&a).await, dec!(500));
    assert_eq!(b.balance(&grace).await, dec!(700));
    assert_eq!(b.balance(&a).await + b.balance(&grace).await, before);

    let history = b.rt.ledger.list_transactions(&a, 100).await.unwrap();
    let matching: Vec<_> = history.iter().filter(|tx| tx.reference == reference).collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].status, TransactionStatus::Completed);
    assert_eq!(matching[0].amount, dec!(500));
    assert_eq!(matching[0].transaction_type, TransactionType::Transfer);
}

#[tokio::test]
async fn initiate_never_mutates_balances() {
    let b = bank(700).await;
    let a = b.open("Ada").await;
    let grace = b.open("Grace").await;

    let result = b.rt.ops.initiate_transfer(&a, transfer(&grace, dec!(300))).await;
    assert_eq!(result.kind, ResultKind::TransferConfirm);
    b.rt.settle().await.unwrap();

    assert_eq!(b.balance(&a).await, dec!(1000));
    assert_eq!(b.balance(&grace).await, dec!(1000));
    assert_eq!(b.history_len(&a).await, 1);
}

#[tokio::test]
async fn rejected_transfers_leave_ledger_untouched() {
    let b = bank(700).await;
    let a = b.open("Ada").await;
    let grace = b.open("Grace").await;
    let frozen = b.open("Frozen").await;
    b.rt
        .ledger
        .set_account_status(&frozen, AccountStatus::Frozen)
        .await
        .unwrap();

    let cases = vec![
        (transfer("OW99999", dec!(10)), "Recipient account **OW99999** not found."),
        (transfer(&a, dec!(10)), "You cannot transfer to your own account."),
        (transfer(&grace, dec!(5000)), "Insufficient balance."),
        (transfer(&frozen, dec!(10)), "Recipient account **OW10003** is not active."),
    ];

    for (request, expected) in cases {
        let result = b.rt.ops.confirm_transfer(&a, request).await;
        assert!(result.is_error());
        assert!(result.text.starts_with(expected), "{}", result.text);
    }

    let from_frozen = b.rt.ops.confirm_transfer(&frozen, transfer(&a, dec!(10))).await;
    assert_eq!(from_frozen.text, "Your account is not active.");

    b.rt.settle().await.unwrap();
    assert_eq!(b.balance(&a).await, dec!(1000));
    assert_eq!(b.balance(&grace).await, dec!(1000));
    assert_eq!(b.history_len(&a).await, 1);
    assert_eq!(b.history_len(&grace).await, 1);
}

#[tokio::test]
async fn loan_of_50000_over_36_months_is_disbursed() {
    let b = bank(780).await;
    let a = b.open("Ada").await;

    let offer = b
        .rt
        .ops
        .check_loan_credit_score(
            &a,
            LoanQuery {
                amount: Some(dec!(50000)),
                tenure: Some(36),
                purpose: Some("Car".to_string()),
                income: Some(dec!(90000)),
            },
        )
        .await;
    assert_eq!(offer.kind, ResultKind::LoanOffer);

    let result = b
        .rt
        .ops
        .confirm_loan(
            &a,
            LoanConfirmation {
                amount: Some(dec!(50000)),
                tenure: Some(36),
                purpose: Some("Car".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert_eq!(result.kind, ResultKind::LoanResult);
    b.rt.settle().await.unwrap();

    let loan = b.rt.ledger.latest_loan(&a).await.unwrap().unwrap();
    assert_eq!(loan.interest_rate, dec!(10.5));
    assert_eq!(loan.emi, dec!(1625.12));
    assert_eq!(loan.total_repayment, dec!(58504));
    assert_eq!(loan.status, LoanStatus::Disbursed);
    assert_eq!(b.balance(&a).await, dec!(51000));
}

#[tokio::test]
async fn card_application_needs_confirmation_and_rejects_duplicates() {
    let b = bank(700).await;
    let a = b.open("Ada").await;

    let prompt = b.rt.ops.apply_for_card(&a, Some("gold".to_string()), false).await;
    assert_eq!(prompt.kind, ResultKind::CardConfirm);
    let cards = b.rt.ops.list_cards(&a).await;
    assert_eq!(cards.text, "You don't have any cards yet.");

    let gold = b.rt.ops.apply_for_card(&a, Some("gold".to_string()), true).await;
    assert_eq!(gold.kind, ResultKind::CardIssued);
    let platinum = b.rt.ops.apply_for_card(&a, Some("platinum".to_string()), true).await;
    assert_eq!(platinum.kind, ResultKind::CardIssued);

    let duplicate = b.rt.ops.apply_for_card(&a, Some("gold".to_string()), true).await;
    assert!(duplicate.is_error());
    assert_eq!(duplicate.text, "You already have a **Gold** credit card.");
}

#[tokio::test]
async fn consumer_stamps_once_and_ignores_redelivery() {
    let b = bank(700).await;
    let a = b.open("Ada").await;
    let grace = b.open("Grace").await;
    let reference = b.send(&a, &grace, dec!(100)).await;

    // The live consumer runs on its own task.
    let mut stamped = None;
    for _ in 0..100 {
        let tx = b.rt.ledger.find_transaction(&reference).await.unwrap().unwrap();
        if tx.delivery_offset.is_some() {
            stamped = Some(tx);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let first = stamped.expect("transfer was never stamped");
    assert!(first.notification_sent);
    assert_eq!(first.status, TransactionStatus::Completed);

    let event = TransferEvent::new(
        TransferEventType::TransferCompleted,
        a.as_str(),
        grace.as_str(),
        dec!(100),
        reference.as_str(),
    );
    let redelivered = BusMessage {
        topic: b.rt.config.events.topic.clone(),
        key: reference.clone(),
        payload: serde_json::to_string(&event).unwrap(),
        offset: 999,
    };
    let consumer = ReconciliationConsumer::new(b.rt.ledger.clone());
    assert_eq!(
        consumer.handle(&redelivered).await.unwrap(),
        ReconcileOutcome::Unchanged
    );

    let failed = TransferEvent {
        event_type: TransferEventType::TransferFailed,
        ..event
    };
    let late_failure = BusMessage {
        payload: serde_json::to_string(&failed).unwrap(),
        offset: 1000,
        ..redelivered
    };
    assert_eq!(
        consumer.handle(&late_failure).await.unwrap(),
        ReconcileOutcome::Unchanged
    );

    let after = b.rt.ledger.find_transaction(&reference).await.unwrap().unwrap();
    assert_eq!(after.delivery_offset, first.delivery_offset);
    assert_eq!(after.status, TransactionStatus::Completed);
}

#[tokio::test]
async fn broker_outage_does_not_block_settlement() {
    let b = bank(700).await;
    let a = b.open("Ada").await;
    let grace = b.open("Grace").await;

    b.bus.set_available(false);
    let reference = b.send(&a, &grace, dec!(250)).await;

    assert_eq!(b.balance(&a).await, dec!(750));
    let tx = b.rt.ledger.find_transaction(&reference).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(tx.delivery_offset, None);
}

#[test]
fn extraction_strips_exactly_the_block() {
    let block = r#"{"action": "GET_TRANSACTIONS", "params": {"limit": 3}}"#;
    let text = format!("Here are your latest movements. {}", block);

    let intent = extract_intent(&text).unwrap();
    assert_eq!(intent.action, "GET_TRANSACTIONS");
    assert_eq!(intent.params["limit"], 3);
    assert_eq!(clean_response(&text), "Here are your latest movements.");

    assert!(extract_intent("Just chatting, no action here.").is_none());
    assert_eq!(
        clean_response("Just chatting, no action here."),
        "Just chatting, no action here."
    );
}

#[tokio::test]
async fn assistant_conversation_runs_a_loan_through() {
    let b = bank(780).await;
    let a = b.open("Ada").await;
    let caller = Uuid::new_v4();
    let ask = |message: &str| ChatRequest {
        caller_id: caller,
        account_number: a.clone(),
        holder_name: "Ada".to_string(),
        message: message.to_string(),
    };

    b.model.push("Happy to help with a loan. How much would you like to borrow, and for how long?");
    let prompt = b.rt.assistant.chat(ask("I need a loan")).await;
    assert_eq!(prompt.action_type.as_deref(), Some("loan_prompt"));
    assert_eq!(prompt.agent, AgentLabel::Loan);

    b.model.push(
        r#"Let me check. {"action": "LOAN_CHECK_CREDIT_SCORE", "params": {"amount": "50,000", "tenure": "36 months", "purpose": "Car", "income": 90000}}"#,
    );
    let offer = b.rt.assistant.chat(ask("50000 over 36 months for a car")).await;
    assert_eq!(offer.action_type.as_deref(), Some("loan_offer"));

    b.model.push(
        r#"{"action": "LOAN_CONFIRM", "params": {"amount": 50000, "tenure": 36, "purpose": "Car"}}"#,
    );
    let confirmed = b.rt.assistant.chat(ask("yes, accept it")).await;
    assert_eq!(confirmed.action_type.as_deref(), Some("loan_result"));
    assert_eq!(confirmed.agent, AgentLabel::Loan);
    b.rt.settle().await.unwrap();

    let balance = b.rt.assistant.chat(ask("what's my balance now?")).await;
    assert_eq!(balance.action_type.as_deref(), Some("balance"));
    assert!(balance.response.contains("$51,000.00"));

    b.rt.shutdown().await;
}
