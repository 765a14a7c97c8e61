//! Remote text generation.
//!
//! The [`GenerationClient`] trait splits the call in two:
//! [`complete`](GenerationClient::complete) returns a typed
//! [`GenerationError`], and [`send`](GenerationClient::send) collapses any
//! error into one of two fixed, user-facing strings after logging the cause.
//! Callers of `send` never see a transport or protocol error.
//!
//! No retries and no timeout are applied here; a boundary that needs a
//! deadline wraps the call itself (see [`crate::server`]).

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::error;

use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::models::{ChatMessage, GenerationRequest};

/// Reply when the service answers with a non-success status.
pub const GENERATION_ISSUE_REPLY: &str = "Sorry, I faced an issue while generating the response.";
/// Reply when the call fails before a usable response arrives.
pub const INTERRUPTION_REPLY: &str = "System interruption detected. Please try again shortly.";

#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Run the completion and return the first choice's content.
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Run the completion, mapping every failure to a fixed reply.
    async fn send(&self, request: &GenerationRequest) -> String {
        match self.complete(request).await {
            Ok(content) => content,
            Err(GenerationError::Status { status, body }) => {
                error!("completion service error {}: {}", status, body);
                GENERATION_ISSUE_REPLY.to_string()
            }
            Err(e) => {
                error!("error generating response: {}", e);
                INTERRUPTION_REPLY.to_string()
            }
        }
    }
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

/// Client for an OpenAI-compatible `chat/completions` endpoint
/// (OpenRouter by default).
pub struct OpenRouterClient {
    endpoint: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenRouterClient {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from config, reading the key from `generation.api_key_env`.
    pub fn from_config(config: &GenerationConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;
        Ok(Self::new(
            config.endpoint.clone(),
            config.model.clone(),
            api_key,
        ))
    }
}

#[async_trait]
impl GenerationClient for OpenRouterClient {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = CompletionBody {
            model: &self.model,
            messages: &request.messages,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let json: serde_json::Value = response.json().await?;
        parse_completion(&json)
    }
}

/// Extract `choices[0].message.content`.
fn parse_completion(json: &serde_json::Value) -> Result<String, GenerationError> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            GenerationError::MalformedResponse("missing choices[0].message.content".to_string())
        })
}
