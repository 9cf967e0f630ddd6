use crate::types::{ChatMessage, Role, ToolCall};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub(super) const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub thread_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
            images: self.images.clone(),
            tool_calls: self.tool_calls.clone(),
            tool_call_id: self.tool_call_id.clone(),
        }
    }
}

/// A thread together with its messages in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub thread: Thread,
    pub messages: Vec<StoredMessage>,
}

impl Conversation {
    pub fn chat_messages(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .map(StoredMessage::to_chat_message)
            .collect()
    }
}

/// On-disk form of one thread: `threads/<id>.json`.
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct ThreadDocument {
    pub version: u32,
    pub thread: Thread,
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

impl ThreadDocument {
    pub fn new(thread: Thread) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            thread,
            messages: Vec::new(),
        }
    }

    pub fn into_conversation(self) -> Conversation {
        Conversation {
            thread: self.thread,
            messages: self.messages,
        }
    }
}
