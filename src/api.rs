//! REST API Server for the Banking Orchestrator
//!
//! Exposes the banking operations and the chat assistant via HTTP endpoints.
//! Integrates with frontend UI

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::assistant::{BankingAssistant, ChatRequest as AssistantRequest};
use crate::models::{AccountType, ActionResult, CardAction};
use crate::operations::{BankingOperations, LoanConfirmation, LoanQuery, TransferRequest};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub chat_id: Option<String>,
    pub user_id: Option<String>,
    pub account_number: String,
    #[serde(default)]
    pub holder_name: Option<String>,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAccountRequest {
    pub user_id: Option<String>,
    pub holder_name: String,
    #[serde(default)]
    pub account_type: Option<AccountType>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct EligibilityRequest {
    pub employment: Option<String>,
    #[serde(default)]
    pub income: rust_decimal::Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardApplication {
    pub card_type: Option<String>,
    #[serde(default)]
    pub confirmed: bool,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiReply = (StatusCode, Json<ApiResponse>);

/// Operation results carry their own error kind; map it to a status code.
fn reply(result: ActionResult) -> ApiReply {
    if !result.is_error() {
        return (StatusCode::OK, Json(ApiResponse::success(result)));
    }

    let status = match result
        .data
        .as_ref()
        .and_then(|data| data.get("error"))
        .and_then(|kind| kind.as_str())
    {
        Some("Validation") => StatusCode::UNPROCESSABLE_ENTITY,
        Some("NotFound") => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiResponse::error(result.text)))
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub ops: Arc<BankingOperations>,
    pub assistant: Arc<BankingAssistant>,
}

/// =============================
/// Helpers: Stable Owner Ids
/// =============================

fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

fn parse_or_stable_uuid(value: Option<&str>, fallback_seed: &str) -> uuid::Uuid {
    match value {
        Some(v) if !v.trim().is_empty() => {
            uuid::Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => stable_uuid_from_string(fallback_seed),
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "ledger": state.ops.ledger().backend(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(State(state): State<ApiState>, Json(req): Json<ChatRequest>) -> ApiReply {
    let Some(user_msg) = req.messages.iter().rev().find(|m| m.role == "user") else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("No user message found".into())),
        );
    };

    let caller_id = parse_or_stable_uuid(
        req.user_id.as_deref(),
        req.chat_id.as_deref().unwrap_or(&req.account_number),
    );
    info!(
        caller = %caller_id,
        account = %req.account_number,
        "chat_handler"
    );

    // Only the current user turn is forwarded; the session store holds the history.
    let reply = state
        .assistant
        .chat(AssistantRequest {
            caller_id,
            account_number: req.account_number.clone(),
            holder_name: req.holder_name.clone().unwrap_or_default(),
            message: user_msg.content.clone(),
        })
        .await;

    let mut response = ApiResponse::success(&reply);
    if let Some(data) = response.data.as_mut() {
        data["userId"] = serde_json::json!(caller_id.to_string());
        if let Some(chat_id) = &req.chat_id {
            data["chatId"] = serde_json::json!(chat_id);
        }
    }
    (StatusCode::OK, Json(response))
}

/// =============================
/// Account Endpoints
/// =============================

async fn open_account(State(state): State<ApiState>, Json(req): Json<OpenAccountRequest>) -> ApiReply {
    let owner_id = parse_or_stable_uuid(req.user_id.as_deref(), &req.holder_name);
    let result = state
        .ops
        .open_account(
            owner_id,
            &req.holder_name,
            req.account_type.unwrap_or(AccountType::Savings),
        )
        .await;

    let (status, Json(mut response)) = reply(result);
    if response.success {
        if let Some(data) = response.data.as_mut().and_then(|d| d.get_mut("data")) {
            data["ownerId"] = serde_json::json!(owner_id.to_string());
        }
        return (StatusCode::CREATED, Json(response));
    }
    (status, Json(response))
}

async fn balance(State(state): State<ApiState>, Path(account): Path<String>) -> ApiReply {
    reply(state.ops.get_balance(&account).await)
}

async fn transactions(
    State(state): State<ApiState>,
    Path(account): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiReply {
    reply(state.ops.list_transactions(&account, query.limit).await)
}

async fn credit_score(State(state): State<ApiState>, Path(account): Path<String>) -> ApiReply {
    reply(state.ops.get_credit_score(&account).await)
}

/// =============================
/// Transfer Endpoints
/// =============================

async fn initiate_transfer(
    State(state): State<ApiState>,
    Path(account): Path<String>,
    Json(req): Json<TransferRequest>,
) -> ApiReply {
    reply(state.ops.initiate_transfer(&account, req).await)
}

async fn confirm_transfer(
    State(state): State<ApiState>,
    Path(account): Path<String>,
    Json(req): Json<TransferRequest>,
) -> ApiReply {
    let (status, response) = reply(state.ops.confirm_transfer(&account, req).await);
    if status == StatusCode::OK {
        return (StatusCode::ACCEPTED, response);
    }
    (status, response)
}

/// =============================
/// Card Endpoints
/// =============================

async fn card_eligibility(State(state): State<ApiState>, Json(req): Json<EligibilityRequest>) -> ApiReply {
    reply(state.ops.check_card_eligibility(req.employment, req.income).await)
}

async fn apply_card(
    State(state): State<ApiState>,
    Path(account): Path<String>,
    Json(req): Json<CardApplication>,
) -> ApiReply {
    reply(
        state
            .ops
            .apply_for_card(&account, req.card_type, req.confirmed)
            .await,
    )
}

async fn list_cards(State(state): State<ApiState>, Path(account): Path<String>) -> ApiReply {
    reply(state.ops.list_cards(&account).await)
}

async fn card_status(
    State(state): State<ApiState>,
    Path((account, card_ref, action)): Path<(String, String, CardAction)>,
) -> ApiReply {
    reply(state.ops.set_card_status(&account, &card_ref, action).await)
}

/// =============================
/// Loan Endpoints
/// =============================

async fn loan_credit_check(
    State(state): State<ApiState>,
    Path(account): Path<String>,
    Json(req): Json<LoanQuery>,
) -> ApiReply {
    reply(state.ops.check_loan_credit_score(&account, req).await)
}

async fn loan_payslip(
    State(state): State<ApiState>,
    Path(account): Path<String>,
    Json(req): Json<LoanQuery>,
) -> ApiReply {
    reply(state.ops.verify_payslip_and_score(&account, req).await)
}

async fn confirm_loan(
    State(state): State<ApiState>,
    Path(account): Path<String>,
    Json(req): Json<LoanConfirmation>,
) -> ApiReply {
    reply(state.ops.confirm_loan(&account, req).await)
}

async fn list_loans(State(state): State<ApiState>, Path(account): Path<String>) -> ApiReply {
    reply(state.ops.list_loans(&account).await)
}

/// =============================
/// Router
/// =============================

pub fn create_router(ops: Arc<BankingOperations>, assistant: Arc<BankingAssistant>) -> Router {
    let state = ApiState { ops, assistant };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/accounts", post(open_account))
        .route("/api/accounts/:account/balance", get(balance))
        .route("/api/accounts/:account/transactions", get(transactions))
        .route("/api/accounts/:account/credit-score", get(credit_score))
        .route("/api/accounts/:account/transfers/initiate", post(initiate_transfer))
        .route("/api/accounts/:account/transfers/confirm", post(confirm_transfer))
        .route("/api/cards/eligibility", post(card_eligibility))
        .route("/api/accounts/:account/cards", get(list_cards).post(apply_card))
        .route("/api/accounts/:account/cards/:card/:action", post(card_status))
        .route("/api/accounts/:account/loans", get(list_loans).post(confirm_loan))
        .route("/api/accounts/:account/loans/credit-check", post(loan_credit_check))
        .route("/api/accounts/:account/loans/payslip", post(loan_payslip))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    ops: Arc<BankingOperations>,
    assistant: Arc<BankingAssistant>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(ops, assistant);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BankingConfig;
    use crate::credit::FixedScorer;
    use crate::events::InMemoryEventBus;
    use crate::ledger::InMemoryLedger;
    use crate::llm::ScriptedChatModel;
    use crate::runtime::BankingRuntime;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn runtime() -> BankingRuntime {
        BankingRuntime::start(
            BankingConfig::default(),
            Arc::new(InMemoryLedger::new()),
            Arc::new(InMemoryEventBus::default()),
            Arc::new(FixedScorer(780)),
            Arc::new(ScriptedChatModel::new(Vec::<String>::new())),
        )
        .await
        .unwrap()
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[test]
    fn test_stable_uuid_is_deterministic() {
        let a = parse_or_stable_uuid(Some("user-42"), "x");
        let b = parse_or_stable_uuid(Some("user-42"), "y");
        assert_eq!(a, b);
        assert_eq!(a.get_version_num(), 4);

        let fallback = parse_or_stable_uuid(Some("  "), "seed");
        assert_eq!(fallback, stable_uuid_from_string("seed"));

        let real = uuid::Uuid::new_v4();
        assert_eq!(parse_or_stable_uuid(Some(&real.to_string()), "seed"), real);
    }

    #[tokio::test]
    async fn test_open_account_then_balance() {
        let rt = runtime().await;
        let router = create_router(rt.ops.clone(), rt.assistant.clone());

        let (status, body) = send(
            &router,
            "POST",
            "/api/accounts",
            Some(json!({ "userId": "ada", "holderName": "Ada" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["type"], "account_opened");
        assert_eq!(body["data"]["data"]["accountNumber"], "OW10001");
        assert!(body["data"]["data"]["ownerId"].is_string());

        let (status, body) = send(&router, "GET", "/api/accounts/OW10001/balance", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["type"], "balance");

        let (status, body) = send(&router, "GET", "/api/accounts/OW99999/balance", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Your account was not found.");
    }

    #[tokio::test]
    async fn test_transfer_endpoints() {
        let rt = runtime().await;
        let router = create_router(rt.ops.clone(), rt.assistant.clone());
        for name in ["Ada", "Grace"] {
            send(&router, "POST", "/api/accounts", Some(json!({ "holderName": name }))).await;
        }

        let (status, _) = send(
            &router,
            "POST",
            "/api/accounts/OW10001/transfers/confirm",
            Some(json!({ "toAccount": "OW10001", "amount": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = send(
            &router,
            "POST",
            "/api/accounts/OW10001/transfers/confirm",
            Some(json!({ "toAccount": "OW10002", "amount": 250 })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["data"]["type"], "transfer_submitted");
        rt.settle().await.unwrap();

        let (_, body) = send(&router, "GET", "/api/accounts/OW10002/transactions?limit=1", None).await;
        assert!(body["data"]["text"].as_str().unwrap().contains("+$250.00"));
    }

    #[tokio::test]
    async fn test_card_status_route() {
        let rt = runtime().await;
        let router = create_router(rt.ops.clone(), rt.assistant.clone());
        send(&router, "POST", "/api/accounts", Some(json!({ "holderName": "Ada" }))).await;

        let (_, body) = send(
            &router,
            "POST",
            "/api/accounts/OW10001/cards",
            Some(json!({ "cardType": "gold", "confirmed": true })),
        )
        .await;
        let card_id = body["data"]["data"]["card_id"].as_str().unwrap().to_string();

        let uri = format!("/api/accounts/OW10001/cards/{}/freeze", card_id);
        let (status, body) = send(&router, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["type"], "card_status");

        let uri = format!("/api/accounts/OW10001/cards/{}/explode", card_id);
        let (status, _) = send(&router, "POST", &uri, None).await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn test_chat_requires_user_message() {
        let rt = runtime().await;
        let router = create_router(rt.ops.clone(), rt.assistant.clone());

        let (status, body) = send(
            &router,
            "POST",
            "/api/chat",
            Some(json!({
                "accountNumber": "OW10001",
                "messages": [{ "role": "assistant", "content": "hi" }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No user message found");
    }

    #[tokio::test]
    async fn test_chat_runs_keyword_fallback() {
        let rt = runtime().await;
        let router = create_router(rt.ops.clone(), rt.assistant.clone());
        send(&router, "POST", "/api/accounts", Some(json!({ "holderName": "Ada" }))).await;

        let (status, body) = send(
            &router,
            "POST",
            "/api/chat",
            Some(json!({
                "chatId": "chat-1",
                "accountNumber": "OW10001",
                "messages": [{ "role": "user", "content": "what's my balance" }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["actionType"], "balance");
        assert_eq!(body["data"]["chatId"], "chat-1");
        assert!(body["data"]["response"].as_str().unwrap().contains("$1,000.00"));
    }
}
