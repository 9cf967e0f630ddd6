use super::ConversationManager;
use crate::error::Result;
use crate::store::Thread;
use crate::types::{ChatMessage, ChatRequest};
use crate::util::title_from;
use tracing::debug;

pub(super) const THREAD_TITLE_CHARS: usize = 60;

impl ConversationManager {
    /// The active thread, created from the first user message when there is
    /// none yet.
    pub(super) fn ensure_thread(&mut self, first_message: &str) -> Result<Thread> {
        if let Some(thread) = &self.thread {
            return Ok(thread.clone());
        }
        let mut title = title_from(first_message, THREAD_TITLE_CHARS);
        if title.is_empty() {
            title = "Untitled".to_string();
        }
        let thread = self.store.create_thread(&title)?;
        debug!(thread_id = %thread.id, %title, "started thread");
        self.thread = Some(thread.clone());
        Ok(thread)
    }

    /// Write-through append: the store first, then the in-memory history.
    pub(super) fn record(&mut self, thread_id: &str, message: ChatMessage) -> Result<()> {
        self.store.add_message(thread_id, &message)?;
        self.messages.push(message);
        Ok(())
    }

    pub(super) fn tool_loop_request(&self) -> ChatRequest {
        ChatRequest {
            model: self.settings.model.clone(),
            messages: self.messages.clone(),
            tools: self.tools.specs(),
            stream: false,
            think: self.settings.think,
        }
    }

    pub(super) fn streaming_request(&self) -> ChatRequest {
        ChatRequest {
            model: self.settings.model.clone(),
            messages: self.messages.clone(),
            tools: Vec::new(),
            stream: true,
            think: self.settings.think,
        }
    }
}
