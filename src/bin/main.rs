use banking_orchestrator::{
    credit::SimulatedScorer,
    events::InMemoryEventBus,
    ledger::InMemoryLedger,
    llm::ScriptedChatModel,
    AccountType, BankingConfig, BankingRuntime, ChatRequest,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Banking assistant demo starting");

    let config = BankingConfig::default();
    let model = Arc::new(ScriptedChatModel::new(Vec::<String>::new()));
    let runtime = BankingRuntime::start(
        config.clone(),
        Arc::new(InMemoryLedger::new()),
        Arc::new(InMemoryEventBus::default()),
        Arc::new(SimulatedScorer::new(&config.scoring)),
        model.clone(),
    )
    .await?;

    // Two customers
    let ada = Uuid::new_v4();
    let opened = runtime.ops.open_account(ada, "Ada Lovelace", AccountType::Savings).await;
    println!("{}\n", opened.text);
    let grace = runtime
        .ops
        .open_account(Uuid::new_v4(), "Grace Hopper", AccountType::Checking)
        .await;
    println!("{}\n", grace.text);

    let ada_account = account_number(&opened.data).ok_or("account not opened")?;
    let grace_account = account_number(&grace.data).ok_or("account not opened")?;

    // What the model would say for each user message
    let script: Vec<(&str, String)> = vec![
        (
            "What's my balance?",
            r#"Let me check that for you. {"action": "GET_BALANCE"}"#.to_string(),
        ),
        (
            "Send 250 to Grace for dinner",
            format!(
                r#"Here is the summary. {{"action": "TRANSFER", "params": {{"toAccount": "{}", "amount": 250, "description": "Dinner"}}}}"#,
                grace_account
            ),
        ),
        (
            "Yes, go ahead",
            format!(
                r#"{{"action": "CONFIRM_TRANSFER", "params": {{"toAccount": "{}", "amount": 250, "description": "Dinner"}}}}"#,
                grace_account
            ),
        ),
        ("Show my transaction history", "Sure, here you go.".to_string()),
        (
            "I'd like a credit card",
            "Of course! Which card would you like: Standard, Gold or Platinum?".to_string(),
        ),
        (
            "Gold please",
            r#"{"action": "APPLY_CREDIT_CARD", "params": {"cardType": "gold", "confirmed": false}}"#.to_string(),
        ),
        (
            "Confirm",
            r#"{"action": "APPLY_CREDIT_CARD", "params": {"cardType": "gold", "confirmed": true}}"#.to_string(),
        ),
        (
            "I need a 50000 loan over 36 months for a car",
            r#"Let me run a credit check. {"action": "LOAN_CHECK_CREDIT_SCORE", "params": {"amount": 50000, "tenure": 36, "purpose": "Car", "income": 90000}}"#.to_string(),
        ),
        (
            "Accept the offer",
            r#"{"action": "LOAN_CONFIRM", "params": {"amount": 50000, "tenure": 36, "purpose": "Car"}}"#.to_string(),
        ),
        ("Tell me a joke", String::new()),
    ];

    for (message, model_reply) in script {
        if !model_reply.is_empty() {
            model.push(model_reply);
        }

        let reply = runtime
            .assistant
            .chat(ChatRequest {
                caller_id: ada,
                account_number: ada_account.clone(),
                holder_name: "Ada Lovelace".to_string(),
                message: message.to_string(),
            })
            .await;

        println!("> {}", message);
        println!(
            "[{:?}{}]\n{}\n",
            reply.agent,
            reply
                .action_type
                .as_deref()
                .map(|t| format!(" · {}", t))
                .unwrap_or_default(),
            reply.response
        );

        // Let background settlement land before the next turn reads the ledger.
        runtime.settle().await?;
    }

    println!("=== FINAL LEDGER ===");
    for account in [&ada_account, &grace_account] {
        println!("{}\n", runtime.ops.get_balance(account).await.text);
        println!("{}\n", runtime.ops.list_transactions(account, Some(10)).await.text);
    }
    println!("{}", runtime.ops.list_loans(&ada_account).await.text);
    println!("{}", runtime.ops.list_cards(&ada_account).await.text);

    runtime.shutdown().await;
    Ok(())
}

fn account_number(data: &Option<serde_json::Value>) -> Option<String> {
    data.as_ref()?
        .get("accountNumber")?
        .as_str()
        .map(str::to_string)
}
