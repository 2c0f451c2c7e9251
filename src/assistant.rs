//! Banking assistant - one conversational turn end to end
//!
//! GUARD → MODEL → EXTRACT → (FALLBACK) → ROUTE → LABEL → REMEMBER

use crate::classifier::{AgentLabel, MessageClassifier};
use crate::config::BankingConfig;
use crate::intent::{clean_response, extract_intent};
use crate::llm::{build_system_prompt, ChatModel};
use crate::memory::{ConversationTurn, SessionStore};
use crate::router::{ActionContext, ActionRouter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

const OFF_TOPIC_REPLY: &str = "I'm your banking assistant and can only help with banking services \
such as balances, transfers, cards and loans. What can I do for your account today?";

const EMPTY_REPLY: &str = "How can I help you with your banking today?";

const MODEL_UNAVAILABLE_REPLY: &str =
    "I'm having trouble answering right now. Please try again in a moment.";

/// One inbound chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub caller_id: Uuid,
    pub account_number: String,
    #[serde(default)]
    pub holder_name: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantReply {
    pub response: String,
    pub agent: AgentLabel,
    pub action_type: Option<String>,
    pub action_data: Option<Value>,
}

pub struct BankingAssistant {
    config: Arc<BankingConfig>,
    router: ActionRouter,
    model: Arc<dyn ChatModel>,
    sessions: Arc<dyn SessionStore>,
}

impl BankingAssistant {
    pub fn new(
        config: Arc<BankingConfig>,
        router: ActionRouter,
        model: Arc<dyn ChatModel>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            config,
            router,
            model,
            sessions,
        }
    }

    pub fn router(&self) -> &ActionRouter {
        &self.router
    }

    /// Handle one user message and remember the exchange.
    pub async fn chat(&self, request: ChatRequest) -> AssistantReply {
        let start = Instant::now();
        let message = request.message.trim();

        info!(
            caller = %request.caller_id,
            account = %request.account_number,
            model = %self.model.name(),
            "Assistant: message received"
        );

        if MessageClassifier::is_non_banking(message) {
            debug!("Non-banking topic, declining");
            return AssistantReply {
                response: OFF_TOPIC_REPLY.to_string(),
                agent: AgentLabel::Manager,
                action_type: None,
                action_data: None,
            };
        }

        let history: Vec<ConversationTurn> = self
            .sessions
            .load(request.caller_id)
            .await
            .map(|session| session.turns().cloned().collect())
            .unwrap_or_default();

        let system_prompt =
            build_system_prompt(&self.config, &request.holder_name, &request.account_number);

        let (raw_reply, model_failed) = match self.model.reply(&system_prompt, &history, message).await {
            Ok(text) => (text, false),
            Err(e) => {
                warn!(error = %e, "Chat model unavailable, continuing without it");
                (String::new(), true)
            }
        };

        let intent = extract_intent(&raw_reply).or_else(|| {
            let fallback = MessageClassifier::fallback_intent(message);
            if let Some(intent) = &fallback {
                debug!(action = %intent.action, "No action block, using keyword fallback");
            }
            fallback
        });
        let prose = clean_response(&raw_reply);

        let (mut response, action_type, action_data) = match intent {
            Some(intent) => {
                let ctx = ActionContext::new(request.caller_id, request.account_number.as_str());
                let result = self.router.route(&ctx, &intent).await;

                let response = if prose.is_empty() {
                    result.text.clone()
                } else if MessageClassifier::looks_hallucinated(&prose) {
                    warn!(action = %intent.action, "Dropping model prose with invented figures");
                    result.text.clone()
                } else {
                    format!("{}\n\n{}", prose, result.text)
                };

                (response, Some(result.kind.as_str().to_string()), result.data)
            }
            None => {
                let follow_up = MessageClassifier::infer_action_type(&prose).map(str::to_string);
                (prose, follow_up, None)
            }
        };

        if response.trim().is_empty() {
            response = if model_failed {
                MODEL_UNAVAILABLE_REPLY.to_string()
            } else {
                EMPTY_REPLY.to_string()
            };
        }

        let agent = MessageClassifier::classify_agent(&response, action_type.as_deref());

        self.sessions
            .append(
                request.caller_id,
                vec![
                    ConversationTurn::user(message),
                    ConversationTurn::model(
                        response.as_str(),
                        action_type.clone(),
                        Some(format!("{:?}", agent)),
                    ),
                ],
            )
            .await;

        info!(
            agent = ?agent,
            action_type = ?action_type,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Assistant: reply ready"
        );

        AssistantReply {
            response,
            agent,
            action_type,
            action_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BankingError;
    use crate::llm::ScriptedChatModel;
    use crate::memory::InMemorySessionStore;
    use crate::operations::test_support::Harness;
    use crate::router::create_default_router;

    struct FailingModel;

    #[async_trait::async_trait]
    impl ChatModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        async fn reply(&self, _: &str, _: &[ConversationTurn], _: &str) -> crate::Result<String> {
            Err(BankingError::LlmError("offline".to_string()))
        }
    }

    async fn setup(
        model: Arc<dyn ChatModel>,
    ) -> (Harness, BankingAssistant, Arc<InMemorySessionStore>, String, String) {
        let h = Harness::new(780).await;
        let a = h.open("Ada").await;
        let b = h.open("Grace").await;
        let sessions = Arc::new(InMemorySessionStore::new(20));
        let assistant = BankingAssistant::new(
            Arc::new(BankingConfig::default()),
            create_default_router(h.ops_handle()),
            model,
            sessions.clone(),
        );
        (h, assistant, sessions, a, b)
    }

    fn request(caller: Uuid, account: &str, message: &str) -> ChatRequest {
        ChatRequest {
            caller_id: caller,
            account_number: account.to_string(),
            holder_name: "Ada".to_string(),
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn test_action_block_is_routed() {
        let model = Arc::new(ScriptedChatModel::new([
            r#"Let me check that for you. {"action": "GET_BALANCE"}"#,
        ]));
        let (_h, assistant, sessions, a, _b) = setup(model).await;
        let caller = Uuid::new_v4();

        let reply = assistant.chat(request(caller, &a, "what do I have?")).await;

        assert!(reply.response.starts_with("Let me check that for you."));
        assert!(reply.response.contains("$1,000.00"));
        assert_eq!(reply.action_type.as_deref(), Some("balance"));
        assert_eq!(reply.agent, AgentLabel::Manager);

        let session = sessions.load(caller).await.unwrap();
        assert_eq!(session.len(), 2);
        assert_eq!(session.last_action_type(), Some("balance"));
    }

    #[tokio::test]
    async fn test_off_topic_skips_model() {
        let model = Arc::new(ScriptedChatModel::new([r#"{"action": "GET_BALANCE"}"#]));
        let (_h, assistant, sessions, a, _b) = setup(model.clone()).await;
        let caller = Uuid::new_v4();

        let reply = assistant.chat(request(caller, &a, "tell me a joke")).await;

        assert!(reply.response.starts_with("I'm your banking assistant"));
        assert_eq!(reply.agent, AgentLabel::Manager);
        assert!(reply.action_type.is_none());
        assert!(sessions.load(caller).await.is_none());
        // The scripted reply was never consumed.
        assert_eq!(model.reply("", &[], "").await.unwrap(), r#"{"action": "GET_BALANCE"}"#);
    }

    #[tokio::test]
    async fn test_keyword_fallback_when_model_emits_no_action() {
        let model = Arc::new(ScriptedChatModel::new(["Sure thing."]));
        let (_h, assistant, _sessions, a, _b) = setup(model).await;

        let reply = assistant
            .chat(request(Uuid::new_v4(), &a, "show my transaction history"))
            .await;

        assert_eq!(reply.action_type.as_deref(), Some("transactions"));
        assert!(reply.response.contains("Welcome bonus"));
        assert_eq!(reply.agent, AgentLabel::Transaction);
    }

    #[tokio::test]
    async fn test_invented_figures_are_dropped() {
        let invented = format!(
            "{}\nDate: 2024-02-01\nAmount: 9,999.00\nStatus: completed\n{}",
            "Here is everything that happened on your account over the last few weeks. ".repeat(3),
            r#"{"action": "GET_BALANCE"}"#
        );
        let model = Arc::new(ScriptedChatModel::new([invented]));
        let (_h, assistant, _sessions, a, _b) = setup(model).await;

        let reply = assistant.chat(request(Uuid::new_v4(), &a, "balance please")).await;

        assert!(!reply.response.contains("9,999"));
        assert!(reply.response.starts_with("Your **savings** account"));
    }

    #[tokio::test]
    async fn test_follow_up_inferred_without_action() {
        let model = Arc::new(ScriptedChatModel::new([
            "Happy to help with a transfer. What's the account number and how much?",
        ]));
        let (_h, assistant, _sessions, a, _b) = setup(model).await;

        let reply = assistant.chat(request(Uuid::new_v4(), &a, "I want to send money")).await;

        assert_eq!(reply.action_type.as_deref(), Some("transfer_prompt"));
        assert_eq!(reply.agent, AgentLabel::Transaction);
        assert!(reply.action_data.is_none());
    }

    #[tokio::test]
    async fn test_transfer_through_conversation() {
        let model = Arc::new(ScriptedChatModel::new(Vec::<String>::new()));
        let (h, assistant, _sessions, a, b) = setup(model.clone()).await;
        model.push(format!(
            r#"Here's the summary. {{"action": "TRANSFER", "params": {{"toAccount": "{}", "amount": 500}}}}"#,
            b
        ));
        model.push(format!(
            r#"Done! {{"action": "CONFIRM_TRANSFER", "params": {{"toAccount": "{}", "amount": 500}}}}"#,
            b
        ));
        let caller = Uuid::new_v4();

        let summary = assistant.chat(request(caller, &a, "send 500 to Grace")).await;
        assert_eq!(summary.action_type.as_deref(), Some("transfer_confirm"));

        let submitted = assistant.chat(request(caller, &a, "yes")).await;
        assert_eq!(submitted.action_type.as_deref(), Some("transfer_submitted"));
        assert_eq!(submitted.agent, AgentLabel::Transaction);
        h.settle().await;

        let sender = h.ops.get_balance(&a).await;
        assert!(sender.text.contains("$500.00"));
    }

    #[tokio::test]
    async fn test_model_failure_degrades() {
        let (_h, assistant, _sessions, a, _b) = setup(Arc::new(FailingModel)).await;

        let with_keyword = assistant.chat(request(Uuid::new_v4(), &a, "my balance?")).await;
        assert_eq!(with_keyword.action_type.as_deref(), Some("balance"));

        let without = assistant.chat(request(Uuid::new_v4(), &a, "hello")).await;
        assert_eq!(without.response, MODEL_UNAVAILABLE_REPLY);
    }
}
