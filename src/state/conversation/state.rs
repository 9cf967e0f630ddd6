use crate::api::ChatBackend;
use crate::config::Config;
use crate::error::Result;
use crate::store::{Thread, ThreadStore};
use crate::tools::ToolRegistry;
use crate::types::ChatMessage;
use std::path::PathBuf;
use std::sync::Arc;

/// Per-session knobs the driver reads on every turn.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub model: String,
    pub vision_model: String,
    pub think: bool,
    pub max_tool_rounds: usize,
    pub image_types: Vec<String>,
    /// When false the raw stream (think blocks included) reaches the view.
    pub filter_think: bool,
}

impl TurnSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model.clone(),
            vision_model: config.vision_model.clone(),
            think: config.think,
            max_tool_rounds: config.max_tool_rounds,
            image_types: config.image_types.clone(),
            filter_think: true,
        }
    }
}

/// One user turn as typed (or piped) by the operator.
#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    pub text: String,
    pub images: Vec<PathBuf>,
    /// Title for the thread this turn creates; defaults to the text.
    pub title: Option<String>,
}

impl TurnInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_images(mut self, images: Vec<PathBuf>) -> Self {
        self.images = images;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub thread_id: String,
    /// Filtered assistant response as persisted.
    pub response: String,
    pub tool_rounds: usize,
}

pub struct ConversationManager {
    pub(super) backend: Arc<dyn ChatBackend>,
    pub(super) tools: Arc<ToolRegistry>,
    pub(super) store: ThreadStore,
    pub(super) settings: TurnSettings,
    pub(super) thread: Option<Thread>,
    pub(super) messages: Vec<ChatMessage>,
}

impl ConversationManager {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        tools: Arc<ToolRegistry>,
        store: ThreadStore,
        settings: TurnSettings,
    ) -> Self {
        Self {
            backend,
            tools,
            store,
            settings,
            thread: None,
            messages: Vec::new(),
        }
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    pub fn set_filter_think(&mut self, enabled: bool) {
        self.settings.filter_think = enabled;
    }

    pub fn thread(&self) -> Option<&Thread> {
        self.thread.as_ref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn store(&self) -> &ThreadStore {
        &self.store
    }

    /// Continue an existing thread; its stored messages become the history.
    pub fn open_thread(&mut self, thread_id: &str) -> Result<&Thread> {
        let conversation = self.store.get_conversation(thread_id)?;
        self.messages = conversation.chat_messages();
        let thread = self.thread.insert(conversation.thread);
        Ok(&*thread)
    }

    /// Forget the active thread; the next user message starts a new one.
    pub fn start_new_thread(&mut self) {
        self.thread = None;
        self.messages.clear();
    }
}
