use super::client::{ChatBackend, TokenStream};
use crate::error::{GhostError, Result};
use crate::types::{ChatMessage, ChatRequest};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// One scripted answer for a streaming call.
pub enum MockStream {
    Tokens(Vec<String>),
    /// Yields the tokens, then fails with the error.
    TokensThenError(Vec<String>, GhostError),
    /// Yields the tokens, then never finishes (until cancelled by the caller).
    TokensThenHang(Vec<String>),
}

/// One scripted answer for a non-streaming call.
pub enum MockCompletion {
    Message(ChatMessage),
    Error(GhostError),
    /// Never answers; resolves to `Cancelled` once the token fires.
    Hang,
}

/// Scripted [`ChatBackend`] that records every request it receives.
#[derive(Clone, Default)]
pub struct MockChatBackend {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    completions: VecDeque<MockCompletion>,
    streams: VecDeque<MockStream>,
    complete_requests: Vec<ChatRequest>,
    stream_requests: Vec<ChatRequest>,
}

impl MockChatBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_completion(&self, message: ChatMessage) -> &Self {
        self.state()
            .completions
            .push_back(MockCompletion::Message(message));
        self
    }

    pub fn push_completion_result(&self, completion: MockCompletion) -> &Self {
        self.state().completions.push_back(completion);
        self
    }

    pub fn push_stream<I, S>(&self, tokens: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens = tokens.into_iter().map(Into::into).collect();
        self.state().streams.push_back(MockStream::Tokens(tokens));
        self
    }

    pub fn push_stream_result(&self, stream: MockStream) -> &Self {
        self.state().streams.push_back(stream);
        self
    }

    pub fn complete_requests(&self) -> Vec<ChatRequest> {
        self.state().complete_requests.clone()
    }

    pub fn stream_requests(&self) -> Vec<ChatRequest> {
        self.state().stream_requests.clone()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ChatBackend for MockChatBackend {
    async fn complete(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatMessage> {
        let next = {
            let mut state = self.state();
            state.complete_requests.push(request.clone());
            state.completions.pop_front()
        };
        match next {
            Some(MockCompletion::Message(message)) => {
                if cancel.is_cancelled() {
                    return Err(GhostError::Cancelled);
                }
                Ok(message)
            }
            Some(MockCompletion::Error(error)) => Err(error),
            Some(MockCompletion::Hang) => {
                cancel.cancelled().await;
                Err(GhostError::Cancelled)
            }
            None => Err(GhostError::ProtocolViolation(
                "mock backend: no completion scripted".to_string(),
            )),
        }
    }

    async fn stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<TokenStream> {
        let next = {
            let mut state = self.state();
            state.stream_requests.push(request.clone());
            state.streams.pop_front()
        };
        if cancel.is_cancelled() {
            return Err(GhostError::Cancelled);
        }
        let tokens = |tokens: Vec<String>| stream::iter(tokens.into_iter().map(Ok));
        match next {
            Some(MockStream::Tokens(items)) => Ok(Box::pin(tokens(items))),
            Some(MockStream::TokensThenError(items, error)) => Ok(Box::pin(
                tokens(items).chain(stream::once(async move { Err(error) })),
            )),
            Some(MockStream::TokensThenHang(items)) => {
                Ok(Box::pin(tokens(items).chain(stream::pending())))
            }
            None => Err(GhostError::ProtocolViolation(
                "mock backend: no stream scripted".to_string(),
            )),
        }
    }
}
