use banking_orchestrator::{api::start_server, BankingRuntime};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if std::env::var("GEMINI_API_KEY").is_err() {
        eprintln!("⚠️  GEMINI_API_KEY not set in .env, chat replies come from the scripted model");
    }

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("🚀 Banking Orchestrator - API Server");
    info!("📍 Port: {}", api_port);

    let runtime = BankingRuntime::from_env().await?;

    info!(
        currency = %runtime.config.currency.code,
        ledger = runtime.ledger.backend(),
        "✅ Banking runtime initialized"
    );
    info!("📡 Starting API server...");

    let served = start_server(runtime.ops.clone(), runtime.assistant.clone(), api_port).await;

    runtime.shutdown().await;
    served
}
