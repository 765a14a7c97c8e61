//! Grounded prompt assembly.
//!
//! Turns retrieved fragments and the caller's transcript into the message
//! list sent to the completion service. With no fragments there is nothing
//! to ground an answer on, so the assembler returns the organization's
//! canned introduction as the final reply instead of a request.

use crate::config::AssistantConfig;
use crate::models::{ChatMessage, ConversationTurn, GenerationRequest, MessageRole, Role};

/// Line that introduces the grounding fragments in the system message.
pub const GROUNDING_HEADER: &str = "Always use the following context for your answers (if relevant):";

/// Outcome of [`ContextAssembler::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembly {
    /// No grounding: return this text to the user; do not call the model.
    Canned(String),
    Request(GenerationRequest),
}

#[derive(Debug, Clone)]
pub struct ContextAssembler {
    persona: String,
    intro: String,
}

impl ContextAssembler {
    pub fn new(persona: impl Into<String>, intro: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            intro: intro.into(),
        }
    }

    pub fn from_config(config: &AssistantConfig) -> Self {
        Self::new(config.persona.clone(), config.intro.clone())
    }

    /// Build the request for one reply.
    ///
    /// `fragments` are already tagged (`[PRODUCT] text`) and are placed in
    /// the system message one per line, in retrieval order. The transcript
    /// follows in its given order with every turn that is not `user` or
    /// `assistant` removed. Nothing is truncated.
    pub fn build(
        &self,
        transcript: &[ConversationTurn],
        fragments: &[String],
        product: &str,
    ) -> Assembly {
        if fragments.is_empty() {
            return Assembly::Canned(self.intro.clone());
        }

        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(ChatMessage {
            role: MessageRole::System,
            content: self.system_prompt(fragments),
        });
        messages.extend(transcript.iter().filter_map(history_message));

        Assembly::Request(GenerationRequest {
            product: product.to_string(),
            messages,
        })
    }

    fn system_prompt(&self, fragments: &[String]) -> String {
        let mut prompt = self.persona.clone();
        if !prompt.is_empty() && !prompt.ends_with('\n') {
            prompt.push('\n');
        }
        prompt.push_str(GROUNDING_HEADER);
        prompt.push('\n');
        prompt.push_str(&fragments.join("\n"));
        prompt
    }
}

fn history_message(turn: &ConversationTurn) -> Option<ChatMessage> {
    let role = match &turn.role {
        Role::User => MessageRole::User,
        Role::Assistant => MessageRole::Assistant,
        Role::Other(_) => return None,
    };
    Some(ChatMessage {
        role,
        content: turn.content.clone(),
    })
}
