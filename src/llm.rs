//! Chat model clients
//!
//! The assistant talks to a model through [`ChatModel`]. `GeminiChatModel`
//! calls the Gemini REST API over a pooled reqwest client;
//! `ScriptedChatModel` replays canned replies for demos and tests.

use crate::config::BankingConfig;
use crate::error::BankingError;
use crate::memory::{ConversationTurn, MessageRole};
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Only this many prior turns are sent with each request.
const HISTORY_WINDOW: usize = 6;

const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;
    async fn reply(
        &self,
        system_prompt: &str,
        history: &[ConversationTurn],
        message: &str,
    ) -> Result<String>;
}

/// Reusable Gemini client (connection-pooled)
pub struct GeminiChatModel {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiChatModel {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ChatModel for GeminiChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn reply(
        &self,
        system_prompt: &str,
        history: &[ConversationTurn],
        message: &str,
    ) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(BankingError::LlmError("GEMINI_API_KEY not configured".to_string()));
        }

        let url = format!(
            "{}/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let window = history.len().saturating_sub(HISTORY_WINDOW);
        let mut contents: Vec<Content> = history[window..]
            .iter()
            .map(|turn| Content {
                role: match turn.role {
                    MessageRole::User => "user",
                    MessageRole::Model => "model",
                }
                .to_string(),
                parts: vec![Part {
                    text: turn.text.clone(),
                }],
            })
            .collect();
        contents.push(Content {
            role: "user".to_string(),
            parts: vec![Part {
                text: message.to_string(),
            }],
        });

        let request = GeminiRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 1024,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system_prompt.to_string(),
                }],
            },
        };

        debug!(model = %self.model, turns = request.contents.len(), "Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                BankingError::LlmError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, "Gemini API error response: {}", error_text);
            return Err(BankingError::LlmError(format!("Gemini API returned {}", status)));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            BankingError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        let answer = gemini_response
            .candidates
            .first()
            .and_then(|candidate| candidate.content.parts.first())
            .map(|part| part.text.clone())
            .ok_or_else(|| BankingError::LlmError("Empty response from Gemini".to_string()))?;

        info!(chars = answer.len(), "Gemini response received");
        Ok(answer)
    }
}

/// Replays queued replies in order, then a fixed fallback.
pub struct ScriptedChatModel {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
}

impl ScriptedChatModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            fallback: "I'm here to help! Ask me about your balance, transactions, or apply for cards and loans."
                .to_string(),
        }
    }

    pub fn push(&self, reply: impl Into<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply.into());
        }
    }
}

#[async_trait::async_trait]
impl ChatModel for ScriptedChatModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn reply(
        &self,
        _system_prompt: &str,
        _history: &[ConversationTurn],
        _message: &str,
    ) -> Result<String> {
        let next = self
            .replies
            .lock()
            .map_err(|_| BankingError::LlmError("scripted model lock poisoned".to_string()))?
            .pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Gemini when `GEMINI_API_KEY` is set, else an empty script.
pub fn build_chat_model() -> Arc<dyn ChatModel> {
    match env::var("GEMINI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => match GeminiChatModel::new(key) {
            Ok(model) => {
                info!(model = %model.name(), "Chat model: gemini");
                return Arc::new(model);
            }
            Err(e) => warn!("Failed to build Gemini client, using scripted model: {}", e),
        },
        _ => info!("GEMINI_API_KEY not set, using scripted chat model"),
    }
    Arc::new(ScriptedChatModel::new(Vec::<String>::new()))
}

/// System prompt listing the actions the router understands.
pub fn build_system_prompt(config: &BankingConfig, holder_name: &str, account_number: &str) -> String {
    let sym = &config.currency.symbol;
    format!(
        r#"You are a friendly banking assistant. Currency: {sym} ({code}).
User: {holder_name}, account {account_number}.

RULES:
- Include EXACTLY ONE JSON action block for any banking operation
- NEVER make up balances, transactions or offers; use an action to fetch real data
- Keep conversational text to one or two sentences before the action
- Banking only. Politely redirect anything else.
- Transfers are two steps: TRANSFER to show the summary, CONFIRM_TRANSFER only after the user says yes
- Cards: ask employment and annual income, run CARD_CHECK_ELIGIBILITY, then APPLY_CREDIT_CARD and confirm
- Loans: ask amount ({min}-{max}), tenure in months and purpose, then LOAN_CHECK_CREDIT_SCORE or LOAN_VERIFY_PAYSLIP, then LOAN_CONFIRM

ACTIONS:
{{"action": "GET_BALANCE"}}
{{"action": "GET_TRANSACTIONS", "params": {{"limit": 5}}}}
{{"action": "TRANSFER", "params": {{"toAccount": "{prefix}10002", "amount": 100, "description": "..."}}}}
{{"action": "CONFIRM_TRANSFER", "params": {{"toAccount": "{prefix}10002", "amount": 100, "description": "..."}}}}
{{"action": "CARD_CHECK_ELIGIBILITY", "params": {{"employment": "employed", "income": 60000}}}}
{{"action": "APPLY_CREDIT_CARD", "params": {{"cardType": "gold", "confirmed": false}}}}
{{"action": "LIST_CARDS"}}
{{"action": "FREEZE_CARD", "params": {{"lastFour": "1234"}}}}
{{"action": "UNFREEZE_CARD", "params": {{"lastFour": "1234"}}}}
{{"action": "CANCEL_CARD", "params": {{"lastFour": "1234"}}}}
{{"action": "LOAN_CHECK_CREDIT_SCORE", "params": {{"amount": 10000, "tenure": 12, "purpose": "Car", "income": 60000}}}}
{{"action": "LOAN_VERIFY_PAYSLIP", "params": {{"amount": 10000, "tenure": 12, "purpose": "Car", "income": 60000}}}}
{{"action": "LOAN_CONFIRM", "params": {{"amount": 10000, "tenure": 12, "purpose": "Car", "creditScore": 760, "interestRate": 10.5, "emi": 881.44}}}}
{{"action": "LIST_LOANS"}}
{{"action": "GET_CREDIT_SCORE"}}"#,
        sym = sym,
        code = config.currency.code,
        holder_name = holder_name,
        account_number = account_number,
        prefix = config.account_prefix,
        min = config.money(config.loans.min_amount),
        max = config.money(config.loans.max_amount),
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}
