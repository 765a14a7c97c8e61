//! Terminal chat: one-shot `pchat ask` and interactive `pchat chat`.
//!
//! The interactive loop keeps the transcript in memory for the life of the
//! session, starting from the assistant greeting. It is never written to
//! disk.

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::models::ConversationTurn;
use crate::orchestrator::ChatOrchestrator;

/// Session commands recognized by [`chat_loop`].
pub const CLEAR_COMMAND: &str = "/clear";
pub const QUIT_COMMAND: &str = "/quit";

/// Reply to a single user message and print it.
pub async fn run_ask(orchestrator: &ChatOrchestrator, product: &str, message: &str) -> Result<()> {
    let transcript = vec![ConversationTurn::user(message)];
    let reply = orchestrator.reply(&transcript, product).await;
    println!("{}", reply);
    Ok(())
}

/// Interactive chat on stdin/stdout.
pub async fn run_chat(orchestrator: &ChatOrchestrator, product: &str, greeting: &str) -> Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    chat_loop(orchestrator, product, greeting, stdin, &mut stdout).await?;
    Ok(())
}

fn fresh_transcript(greeting: &str) -> Vec<ConversationTurn> {
    vec![ConversationTurn::assistant(greeting)]
}

/// Read user lines from `input` until EOF or `/quit`, writing each reply to
/// `output`. Returns the transcript as it stood when the session ended.
pub async fn chat_loop<R, W>(
    orchestrator: &ChatOrchestrator,
    product: &str,
    greeting: &str,
    input: R,
    output: &mut W,
) -> Result<Vec<ConversationTurn>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut transcript = fresh_transcript(greeting);
    writeln!(output, "assistant> {}", greeting)?;

    let mut lines = input.lines();
    loop {
        write!(output, "you> ")?;
        output.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            QUIT_COMMAND => break,
            CLEAR_COMMAND => {
                transcript = fresh_transcript(greeting);
                writeln!(output, "assistant> {}", greeting)?;
                continue;
            }
            _ => {}
        }

        transcript.push(ConversationTurn::user(line.as_str()));
        let reply = orchestrator.reply(&transcript, product).await;
        writeln!(output, "assistant> {}", reply)?;
        transcript.push(ConversationTurn::assistant(reply));
    }

    writeln!(output)?;
    Ok(transcript)
}
