//! Conversation memory
//!
//! Bounded per-owner sessions so the assistant can hand recent turns to the model.

pub mod store;

pub use store::{
    ConversationSession, ConversationTurn, InMemorySessionStore, MessageRole, SessionStore,
};
