//! Conversation session storage
//!
//! Keeps the last N turns per owner along with the action each reply ran.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Model,
}

/// A single turn in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: MessageRole,
    pub text: String,
    /// Result kind or inferred follow-up, model turns only.
    pub action_type: Option<String>,
    pub agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            text: text.into(),
            action_type: None,
            agent: None,
            timestamp: Utc::now(),
        }
    }

    pub fn model(text: impl Into<String>, action_type: Option<String>, agent: Option<String>) -> Self {
        Self {
            role: MessageRole::Model,
            text: text.into(),
            action_type,
            agent,
            timestamp: Utc::now(),
        }
    }
}

/// Bounded conversation for one owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub session_id: Uuid,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
    capacity: usize,
    turns: VecDeque<ConversationTurn>,
}

impl ConversationSession {
    pub fn new(owner_id: Uuid, capacity: usize) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            owner_id,
            created_at: now,
            updated_at: now,
            message_count: 0,
            capacity: capacity.max(1),
            turns: VecDeque::new(),
        }
    }

    /// Append a turn, evicting the oldest beyond capacity.
    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
        }
        self.message_count += 1;
        self.updated_at = Utc::now();
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    /// The `count` most recent turns, oldest first.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter().skip(self.turns.len().saturating_sub(count))
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_action_type(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find_map(|turn| turn.action_type.as_deref())
    }
}

/// Trait for session persistence
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, owner_id: Uuid) -> Option<ConversationSession>;
    /// Append turns to the owner's session, creating it on first use.
    async fn append(&self, owner_id: Uuid, turns: Vec<ConversationTurn>) -> ConversationSession;
}

/// In-memory session store
pub struct InMemorySessionStore {
    capacity: usize,
    sessions: Arc<RwLock<HashMap<Uuid, ConversationSession>>>,
}

impl InMemorySessionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, owner_id: Uuid) -> Option<ConversationSession> {
        let sessions = self.sessions.read().await;
        sessions.get(&owner_id).cloned()
    }

    async fn append(&self, owner_id: Uuid, turns: Vec<ConversationTurn>) -> ConversationSession {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(owner_id)
            .or_insert_with(|| ConversationSession::new(owner_id, self.capacity));
        for turn in turns {
            session.push(turn);
        }
        session.clone()
    }
}
