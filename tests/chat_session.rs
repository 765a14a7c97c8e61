use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use product_chat::assembler::ContextAssembler;
use product_chat::catalog::RetrievalCatalog;
use product_chat::chat::chat_loop;
use product_chat::embedding::{EmbeddingEncoder, HashingEncoder};
use product_chat::error::GenerationError;
use product_chat::generation::GenerationClient;
use product_chat::index::{FlatIndex, ProductIndex};
use product_chat::models::{GenerationRequest, Role};
use product_chat::orchestrator::ChatOrchestrator;

const GREETING: &str = "Hi! Ask me about Acme.";

/// Echoes the latest user message back.
struct Echo;

#[async_trait]
impl GenerationClient for Echo {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let last = request.messages.last().map(|m| m.content.clone());
        Ok(format!("echo: {}", last.unwrap_or_default()))
    }
}

async fn orchestrator() -> ChatOrchestrator {
    let encoder = HashingEncoder::new(32);
    let text = "Acme builds mobile apps.";
    let rows = vec![encoder.encode(text).await.unwrap()];
    let mut products = BTreeMap::new();
    products.insert(
        "Acme".to_string(),
        ProductIndex::new(Some(FlatIndex::from_rows(&rows).unwrap()), vec![text.to_string()]),
    );
    ChatOrchestrator::new(
        Arc::new(RetrievalCatalog::from_indexes(Arc::new(encoder), products)),
        ContextAssembler::new("Persona.", "Welcome to Acme!"),
        Arc::new(Echo),
    )
}

#[tokio::test]
async fn test_chat_loop_threads_transcript() {
    let orch = orchestrator().await;
    let input: &[u8] = b"mobile apps?\n\nand brands?\n";
    let mut output = Vec::new();

    let transcript = chat_loop(&orch, "Acme", GREETING, input, &mut output)
        .await
        .unwrap();

    assert_eq!(transcript.len(), 5);
    assert_eq!(transcript[0].role, Role::Assistant);
    assert_eq!(transcript[0].content, GREETING);
    assert_eq!(transcript[1].content, "mobile apps?");
    assert_eq!(transcript[2].content, "echo: mobile apps?");
    assert_eq!(transcript[3].role, Role::User);
    assert_eq!(transcript[4].content, "echo: and brands?");

    let printed = String::from_utf8(output).unwrap();
    assert!(printed.starts_with(&format!("assistant> {}", GREETING)));
    assert!(printed.contains("assistant> echo: and brands?"));
}

#[tokio::test]
async fn test_chat_loop_clear_and_quit() {
    let orch = orchestrator().await;
    let input: &[u8] = b"mobile apps?\n/clear\nsecond question\n/quit\nnever read\n";
    let mut output = Vec::new();

    let transcript = chat_loop(&orch, "Acme", GREETING, input, &mut output)
        .await
        .unwrap();

    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[0].content, GREETING);
    assert_eq!(transcript[1].content, "second question");
    assert_eq!(transcript[2].content, "echo: second question");

    let printed = String::from_utf8(output).unwrap();
    assert_eq!(printed.matches(GREETING).count(), 2);
    assert!(!printed.contains("never read"));
}

#[tokio::test]
async fn test_chat_loop_unknown_product_gets_intro() {
    let orch = orchestrator().await;
    let input: &[u8] = b"hello\n";
    let mut output = Vec::new();

    let transcript = chat_loop(&orch, "Other", GREETING, input, &mut output)
        .await
        .unwrap();

    assert_eq!(transcript.last().unwrap().content, "Welcome to Acme!");
}

#[tokio::test]
async fn test_chat_loop_keeps_message_text_verbatim() {
    let orch = orchestrator().await;
    let input: &[u8] = b"  indented question  \n   /quit  \n";
    let mut output = Vec::new();

    let transcript = chat_loop(&orch, "Acme", GREETING, input, &mut output)
        .await
        .unwrap();

    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[1].content, "  indented question  ");
    assert_eq!(transcript[2].content, "echo:   indented question  ");
}
