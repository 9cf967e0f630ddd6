use super::ConversationManager;
use crate::error::{GhostError, Result};
use crate::runtime::TurnEvent;
use crate::state::think_filter::ThinkFilter;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Send one event, giving up if the turn is cancelled while the view is
/// not keeping up. A closed channel means nobody is listening any more.
pub(super) async fn emit(
    events: &mpsc::Sender<TurnEvent>,
    cancel: &CancellationToken,
    event: TurnEvent,
) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GhostError::Cancelled),
        sent = events.send(event) => sent.map_err(|_| GhostError::Cancelled),
    }
}

impl ConversationManager {
    /// Stream the final answer through the think filter into the view.
    /// Returns the cleaned response text.
    #[instrument(skip_all, fields(model = %self.settings.model))]
    pub(super) async fn stream_response(
        &self,
        events: &mpsc::Sender<TurnEvent>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let request = self.streaming_request();
        let mut stream = self.backend.stream(&request, cancel).await?;
        let mut filter = ThinkFilter::new();
        let mut cleaned = String::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GhostError::Cancelled),
                next = stream.next() => next,
            };
            let token = match next {
                None => break,
                Some(token) => token?,
            };
            let display = if self.settings.filter_think {
                filter.push(&token)
            } else {
                (!token.is_empty()).then_some(token)
            };
            if let Some(text) = display {
                cleaned.push_str(&text);
                emit(events, cancel, TurnEvent::Chunk(text)).await?;
            }
        }

        if let Some(rest) = filter.flush() {
            cleaned.push_str(&rest);
            emit(events, cancel, TurnEvent::Chunk(rest)).await?;
        }
        debug!(
            raw_len = filter.full_text().len(),
            cleaned_len = cleaned.len(),
            "stream finished"
        );
        Ok(cleaned)
    }
}
