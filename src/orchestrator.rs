//! The chat entry point.
//!
//! [`ChatOrchestrator::reply`] takes the caller's whole transcript and a
//! product key and returns the reply text. It holds no conversation state:
//! the caller owns the transcript and threads it through every call.

use std::sync::Arc;

use tracing::debug;

use crate::assembler::{Assembly, ContextAssembler};
use crate::catalog::RetrievalCatalog;
use crate::config::Config;
use crate::generation::GenerationClient;
use crate::models::{ConversationTurn, Role};

/// Reply when the transcript contains no user turn.
pub const EMPTY_MESSAGE_REPLY: &str = "Please enter a message.";

/// Number of fragments retrieved per reply unless configured otherwise.
pub const DEFAULT_TOP_K: usize = 3;

/// Which path produced a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    /// No user turn; nothing else was consulted.
    NoUserMessage,
    /// Retrieval found no grounding; the canned introduction was returned.
    Introduction,
    /// The completion service was called.
    Generated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

pub struct ChatOrchestrator {
    catalog: Arc<RetrievalCatalog>,
    assembler: ContextAssembler,
    client: Arc<dyn GenerationClient>,
    top_k: usize,
}

impl ChatOrchestrator {
    pub fn new(
        catalog: Arc<RetrievalCatalog>,
        assembler: ContextAssembler,
        client: Arc<dyn GenerationClient>,
    ) -> Self {
        Self {
            catalog,
            assembler,
            client,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Wire the pieces together using `[assistant]` and `[retrieval]` settings.
    pub fn from_config(
        config: &Config,
        catalog: Arc<RetrievalCatalog>,
        client: Arc<dyn GenerationClient>,
    ) -> Self {
        Self::new(catalog, ContextAssembler::from_config(&config.assistant), client)
            .with_top_k(config.retrieval.top_k)
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn catalog(&self) -> &RetrievalCatalog {
        &self.catalog
    }

    /// Reply text for `transcript` about `product`.
    pub async fn reply(&self, transcript: &[ConversationTurn], product: &str) -> String {
        self.respond(transcript, product).await.text
    }

    /// Like [`reply`](Self::reply), but also reports which path answered.
    pub async fn respond(&self, transcript: &[ConversationTurn], product: &str) -> Reply {
        let Some(query) = latest_user_message(transcript) else {
            return Reply {
                text: EMPTY_MESSAGE_REPLY.to_string(),
                source: ReplySource::NoUserMessage,
            };
        };

        let fragments = self
            .catalog
            .search_similar_chunks(query, product, self.top_k)
            .await;
        debug!("retrieved {} fragments for {}", fragments.len(), product);

        match self.assembler.build(transcript, &fragments, product) {
            Assembly::Canned(text) => Reply {
                text,
                source: ReplySource::Introduction,
            },
            Assembly::Request(request) => Reply {
                text: self.client.send(&request).await,
                source: ReplySource::Generated,
            },
        }
    }
}

/// Content of the most recent `user` turn.
///
/// An empty user message counts as no message.
pub fn latest_user_message(transcript: &[ConversationTurn]) -> Option<&str> {
    transcript
        .iter()
        .rev()
        .find(|turn| turn.role == Role::User)
        .map(|turn| turn.content.as_str())
        .filter(|content| !content.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_user_message_scans_backwards() {
        let transcript = vec![
            ConversationTurn::user("first"),
            ConversationTurn::assistant("reply"),
            ConversationTurn::user("second"),
            ConversationTurn::assistant("another reply"),
        ];
        assert_eq!(latest_user_message(&transcript), Some("second"));
    }

    #[test]
    fn test_latest_user_message_none() {
        let transcript = vec![
            ConversationTurn::assistant("Welcome!"),
            ConversationTurn::new("system", "x"),
        ];
        assert_eq!(latest_user_message(&transcript), None);
        assert_eq!(latest_user_message(&[]), None);
    }

    #[test]
    fn test_latest_user_message_empty_content() {
        let transcript = vec![ConversationTurn::user("earlier"), ConversationTurn::user("")];
        assert_eq!(latest_user_message(&transcript), None);
    }
}
