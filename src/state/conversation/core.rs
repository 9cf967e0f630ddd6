use super::streaming::emit;
use super::{ConversationManager, TurnInput, TurnOutcome};
use crate::error::{GhostError, Result};
use crate::runtime::TurnEvent;
use crate::types::ChatMessage;
use crate::vision::VisionPreprocessor;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

impl ConversationManager {
    /// Run one turn and report it on `events`: any number of `Chunk` /
    /// `Activity` events, then exactly one `Done` or `Error`. The channel
    /// closes when this returns. The outcome is `None` when the turn failed;
    /// the error itself travels on the channel. Once cancelled, the terminal
    /// event is only delivered if the channel has room.
    pub async fn run_turn(
        &mut self,
        input: TurnInput,
        events: mpsc::Sender<TurnEvent>,
        cancel: CancellationToken,
    ) -> Option<TurnOutcome> {
        let (last, outcome) = match self.send_message(input, &events, &cancel).await {
            Ok(outcome) => (TurnEvent::Done, Some(outcome)),
            Err(error) => {
                if error.is_cancelled() {
                    info!("turn cancelled");
                } else {
                    error!(%error, "turn failed");
                }
                (TurnEvent::Error(error), None)
            }
        };
        // After a cancel the receiver may have stopped reading; never wait
        // on a full channel then.
        if cancel.is_cancelled() {
            if events.try_send(last).is_err() {
                debug!("terminal event dropped; receiver is not reading");
            }
        } else {
            let _ = events.send(last).await;
        }
        outcome
    }

    /// Vision pre-processing, the tool loop, then the streamed answer.
    /// Everything appended to the history is persisted as it happens.
    #[instrument(skip_all, fields(images = input.images.len()))]
    pub async fn send_message(
        &mut self,
        input: TurnInput,
        events: &mpsc::Sender<TurnEvent>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let text = input.text.trim_end().to_string();
        if text.trim().is_empty() && input.images.is_empty() {
            return Err(GhostError::Usage("empty message".to_string()));
        }

        let analyses = if input.images.is_empty() {
            Vec::new()
        } else {
            emit(
                events,
                cancel,
                TurnEvent::Activity(format!("analyzing {} image(s)", input.images.len())),
            )
            .await?;
            let vision = VisionPreprocessor::new(
                self.backend.as_ref(),
                self.settings.vision_model.clone(),
                self.settings.image_types.clone(),
            );
            vision.analyze(&input.images, cancel).await?
        };

        let title_source = match input.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ if text.trim().is_empty() => "Image analysis",
            _ => text.as_str(),
        };
        let thread = self.ensure_thread(title_source)?;
        for analysis in analyses {
            self.record(&thread.id, analysis)?;
        }
        self.record(&thread.id, ChatMessage::user(text))?;

        let tool_rounds = self.run_tool_loop(&thread.id, events, cancel).await?;
        let response = self.stream_response(events, cancel).await?;
        self.record(&thread.id, ChatMessage::assistant(response.clone()))?;

        info!(thread_id = %thread.id, tool_rounds, "turn complete");
        Ok(TurnOutcome {
            thread_id: thread.id,
            response,
            tool_rounds,
        })
    }
}
