//! `ghost ask`: one turn, answer on stdout.

use crate::error::{GhostError, Result};
use crate::runtime::{TurnEvent, TURN_CHANNEL_CAPACITY};
use crate::state::{ConversationManager, TurnInput};
use crate::util::title_from;
use serde::Serialize;
use std::io::{IsTerminal, Read, Write};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

const TITLE_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct AskRequest {
    pub query: String,
    pub images: Vec<PathBuf>,
    pub format: OutputFormat,
    pub filter_think: bool,
    /// Piped stdin, if any.
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
struct JsonAnswer<'a> {
    model: &'a str,
    response: &'a str,
    thread_id: &'a str,
}

/// Read stdin when it is a pipe or file; `None` for an interactive terminal
/// or empty input.
pub fn read_piped_stdin() -> Result<Option<String>> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }
    let mut buffer = String::new();
    stdin
        .read_to_string(&mut buffer)
        .map_err(|e| GhostError::io("reading stdin", e))?;
    if buffer.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(buffer))
    }
}

/// Piped input goes first as a fenced block, the question after it.
pub fn compose_query(query: &str, context: Option<&str>) -> String {
    let query = query.trim();
    match context.map(str::trim_end).filter(|c| !c.trim().is_empty()) {
        Some(context) if query.is_empty() => format!("```\n{context}\n```"),
        Some(context) => format!("```\n{context}\n```\n\n{query}"),
        None => query.to_string(),
    }
}

/// Run the turn and write the answer to `out`. Markdown streams as chunks
/// arrive; JSON is written once the turn is done.
pub async fn run_ask<W: Write>(
    manager: &mut ConversationManager,
    request: AskRequest,
    out: &mut W,
    cancel: CancellationToken,
) -> Result<()> {
    let text = compose_query(&request.query, request.context.as_deref());
    if text.is_empty() && request.images.is_empty() {
        return Err(GhostError::NoInput(
            "pass a query, pipe input on stdin, or attach an --image".to_string(),
        ));
    }

    let title = if request.query.trim().is_empty() {
        title_from(&text, TITLE_CHARS)
    } else {
        title_from(&request.query, TITLE_CHARS)
    };
    manager.start_new_thread();
    manager.set_filter_think(request.filter_think);
    let model = manager.settings().model.clone();
    let input = TurnInput::text(text)
        .with_images(request.images)
        .with_title(title);

    let (events, receiver) = mpsc::channel(TURN_CHANNEL_CAPACITY);
    let stream_markdown = request.format == OutputFormat::Markdown;

    let consume = async {
        // Owned here so a failed write closes the channel and the driver
        // stops instead of waiting on a reader that is gone.
        let mut receiver = receiver;
        let mut failure = None;
        let mut wrote_any = false;
        let mut last_char = None;
        while let Some(event) = receiver.recv().await {
            match event {
                TurnEvent::Chunk(text) if stream_markdown => {
                    write_flush(&mut *out, text.as_bytes())?;
                    wrote_any |= !text.is_empty();
                    last_char = text.chars().last().or(last_char);
                }
                TurnEvent::Chunk(_) => {}
                TurnEvent::Activity(text) => info!(activity = %text, "ask"),
                TurnEvent::Done => {}
                TurnEvent::Error(error) => failure = Some(error),
            }
        }
        if wrote_any && last_char != Some('\n') {
            write_flush(&mut *out, b"\n")?;
        }
        Ok::<_, GhostError>(failure)
    };

    let (outcome, consumed) = tokio::join!(manager.run_turn(input, events, cancel), consume);
    if let Some(error) = consumed? {
        return Err(error);
    }
    let Some(outcome) = outcome else {
        return Err(GhostError::ProtocolViolation(
            "turn ended without a result".to_string(),
        ));
    };

    if request.format == OutputFormat::Json {
        let answer = JsonAnswer {
            model: &model,
            response: &outcome.response,
            thread_id: &outcome.thread_id,
        };
        let mut body = serde_json::to_vec(&answer)
            .map_err(|e| GhostError::ProtocolViolation(format!("encoding answer: {e}")))?;
        body.push(b'\n');
        write_flush(out, &body)?;
    }
    Ok(())
}

fn write_flush<W: Write>(out: &mut W, bytes: &[u8]) -> Result<()> {
    out.write_all(bytes)
        .and_then(|()| out.flush())
        .map_err(|e| GhostError::io("writing answer", e))
}
