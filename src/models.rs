//! Core data types that flow through the chat pipeline.
//!
//! The transcript is owned by the caller; the core reads it and builds a
//! fresh [`GenerationRequest`] per reply.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Speaker of a transcript turn.
///
/// Anything other than `user` or `assistant` is kept as [`Role::Other`] so
/// it can be dropped by an exhaustive match instead of a string comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    Other(String),
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::Other(value),
        }
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Role::from(value.to_string())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::User => "user".to_string(),
            Role::Assistant => "assistant".to_string(),
            Role::Other(other) => other,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
            Role::Other(other) => f.write_str(other),
        }
    }
}

/// One turn of a conversation, as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: impl Into<Role>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Roles accepted by the completion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A role-tagged message in a [`GenerationRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Messages sent to the completion service for a single reply.
///
/// Always starts with exactly one system message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Product the grounding was retrieved for.
    pub product: String,
    pub messages: Vec<ChatMessage>,
}

/// A fragment returned by similarity search, before tagging.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedFragment {
    pub product: String,
    /// Position of the fragment in the product's fragment store.
    pub position: usize,
    /// Squared Euclidean distance from the query vector.
    pub distance: f32,
    pub text: String,
}

impl RetrievedFragment {
    /// Format as `[PRODUCT] text`, the form consumed by the context assembler.
    pub fn tagged(&self) -> String {
        format!("[{}] {}", self.product.to_uppercase(), self.text)
    }
}
