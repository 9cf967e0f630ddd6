use super::streaming::emit;
use super::ConversationManager;
use crate::error::{GhostError, Result};
use crate::runtime::TurnEvent;
use crate::types::{ChatMessage, ToolCall};
use crate::util::excerpt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

const ACTIVITY_ARGS_CHARS: usize = 120;

impl ConversationManager {
    /// Alternate non-streaming completions and tool executions until the
    /// model answers without tool calls. Returns the number of tool rounds.
    ///
    /// The final tool-less completion is discarded; the answer the user sees
    /// comes from the streaming phase.
    #[instrument(skip_all, fields(thread_id = %thread_id))]
    pub(super) async fn run_tool_loop(
        &mut self,
        thread_id: &str,
        events: &mpsc::Sender<TurnEvent>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let max_rounds = self.settings.max_tool_rounds;
        let mut rounds = 0usize;

        loop {
            let request = self.tool_loop_request();
            let reply = self.backend.complete(&request, cancel).await?;
            if !reply.has_tool_calls() {
                debug!(rounds, "tool loop resolved");
                return Ok(rounds);
            }
            if rounds >= max_rounds {
                warn!(max_rounds, "tool loop cap reached");
                return Err(GhostError::ToolLoopLimit(max_rounds));
            }
            rounds += 1;

            let calls = assign_call_ids(reply.tool_calls, rounds);
            self.record(
                thread_id,
                ChatMessage::assistant_with_tool_calls(reply.content, calls.clone()),
            )?;

            for call in calls {
                let output = self.dispatch(&call, events, cancel).await?;
                let call_id = call.id.unwrap_or_default();
                self.record(thread_id, ChatMessage::tool_result(call_id, output))?;
            }
        }
    }

    /// Execute one call. Argument and execution failures become the tool's
    /// textual result; anything else ends the turn.
    async fn dispatch(
        &self,
        call: &ToolCall,
        events: &mpsc::Sender<TurnEvent>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let name = call.name();
        let args = call.function.arguments.to_string();
        emit(
            events,
            cancel,
            TurnEvent::Activity(format!("{name} {}", excerpt(&args, ACTIVITY_ARGS_CHARS))),
        )
        .await?;

        match self
            .tools
            .execute(name, call.function.arguments.clone(), cancel)
            .await
        {
            Ok(output) => {
                info!(tool = name, "tool call succeeded");
                Ok(output)
            }
            Err(error) if error.is_recoverable_tool_error() => {
                emit(events, cancel, TurnEvent::Activity(format!("{name} failed: {error}")))
                    .await?;
                Ok(format!("error: {error}"))
            }
            Err(error) => Err(error),
        }
    }
}

/// Give every call an id so each tool result can reference its call.
pub(super) fn assign_call_ids(calls: Vec<ToolCall>, round: usize) -> Vec<ToolCall> {
    calls
        .into_iter()
        .enumerate()
        .map(|(idx, mut call)| {
            if call.id.as_deref().map_or(true, str::is_empty) {
                call.id = Some(format!("call_{round}_{idx}"));
            }
            call
        })
        .collect()
}
