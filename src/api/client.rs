use super::logging::{debug_payload_enabled, emit_debug_payload};
use super::stream::StreamParser;
use crate::config::Config;
use crate::error::{GhostError, Result};
use crate::types::{ChatMessage, ChatRequest, ChatResponse};
use crate::util::{excerpt, is_local_endpoint_url};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;
/// Raw content tokens of a streaming completion, in arrival order.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const ERROR_BODY_EXCERPT: usize = 300;

/// The remote chat service as seen by the driver and the vision
/// pre-processor.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Non-streaming completion; the returned message may carry tool calls.
    async fn complete(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatMessage>;

    async fn stream(&self, request: &ChatRequest, cancel: &CancellationToken)
        -> Result<TokenStream>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub version: String,
    pub models: Vec<String>,
}

impl HealthReport {
    /// Ollama reports tags like `qwen3:latest`; a bare name matches its
    /// `:latest` tag.
    pub fn has_model(&self, model: &str) -> bool {
        self.models
            .iter()
            .any(|name| name == model || name.strip_suffix(":latest") == Some(model))
    }
}

#[derive(Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    host: String,
    request_timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GhostError::InvalidConfig(format!("building HTTP client: {e}")))?;
        Ok(Self {
            http,
            host: config.host.clone(),
            request_timeout: config.request_timeout,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.host)
    }

    /// Server version plus installed model names.
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn health(&self) -> Result<HealthReport> {
        #[derive(Deserialize)]
        struct VersionBody {
            version: String,
        }
        #[derive(Deserialize)]
        struct TagsBody {
            #[serde(default)]
            models: Vec<TagEntry>,
        }
        #[derive(Deserialize)]
        struct TagEntry {
            name: String,
        }

        let version: VersionBody = self.get_json(&format!("{}/api/version", self.host)).await?;
        let tags: TagsBody = self.get_json(&format!("{}/api/tags", self.host)).await?;
        Ok(HealthReport {
            version: version.version,
            models: tags.models.into_iter().map(|entry| entry.name).collect(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| map_request_error(e, url))?;
        let response = check_status(response, url).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| GhostError::ProtocolViolation(format!("decoding {url}: {e}")))
    }

    async fn post_chat(&self, body: &ChatRequest, timeout: Option<Duration>) -> Result<reqwest::Response> {
        let url = self.chat_url();
        if debug_payload_enabled() {
            emit_debug_payload(&url, body);
        }
        let mut request = self.http.post(&url).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await.map_err(|e| map_request_error(e, &url))?;
        check_status(response, &url).await
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    #[instrument(skip_all, fields(model = %request.model, messages = request.messages.len()))]
    async fn complete(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatMessage> {
        let mut body = request.clone();
        body.stream = false;
        let url = self.chat_url();

        let exchange = async {
            let response = self.post_chat(&body, Some(self.request_timeout)).await?;
            let bytes = response.bytes().await.map_err(|e| map_request_error(e, &url))?;
            serde_json::from_slice::<ChatResponse>(&bytes).map_err(|e| {
                GhostError::ProtocolViolation(format!(
                    "undecodable completion from {url}: {e}: {}",
                    excerpt(&String::from_utf8_lossy(&bytes), ERROR_BODY_EXCERPT)
                ))
            })
        };

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GhostError::Cancelled),
            response = exchange => response?,
        };
        debug!(
            tool_calls = response.message.tool_calls.len(),
            content_len = response.message.content.len(),
            "completion received"
        );
        Ok(response.message)
    }

    #[instrument(skip_all, fields(model = %request.model, messages = request.messages.len()))]
    async fn stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<TokenStream> {
        let mut body = request.clone();
        body.stream = true;
        let url = self.chat_url();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GhostError::Cancelled),
            response = self.post_chat(&body, None) => response?,
        };

        let bytes: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(move |item| item.map_err(|e| map_request_error(e, &url))),
        );
        Ok(ndjson_token_stream(bytes))
    }
}

async fn check_status(response: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.as_u16() < 400 {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GhostError::ProtocolViolation(format!(
        "{url} returned HTTP {status}: {}",
        excerpt(body.trim(), ERROR_BODY_EXCERPT)
    )))
}

fn map_request_error(error: reqwest::Error, url: &str) -> GhostError {
    let reason = if error.is_connect() && is_local_endpoint_url(url) {
        format!("{error}. Is the local Ollama server running?")
    } else if error.is_timeout() {
        format!("request timed out: {error}")
    } else if error.is_decode() || error.is_body() {
        return GhostError::ProtocolViolation(format!("reading response from {url}: {error}"));
    } else {
        error.to_string()
    };
    GhostError::RemoteUnavailable {
        url: url.to_string(),
        reason,
    }
}

struct NdjsonState {
    bytes: ByteStream,
    parser: StreamParser,
    queued: VecDeque<Result<String>>,
    finished: bool,
}

impl NdjsonState {
    fn accept(&mut self, chunks: Vec<crate::types::StreamChunk>) {
        for chunk in chunks {
            if self.finished {
                break;
            }
            if let Some(delta) = chunk.message {
                if !delta.content.is_empty() {
                    self.queued.push_back(Ok(delta.content));
                }
            }
            if chunk.done {
                self.finished = true;
            }
        }
    }

    fn fail(&mut self, error: GhostError) {
        self.finished = true;
        self.queued.push_back(Err(error));
    }
}

/// Turn an Ollama NDJSON byte stream into content tokens. The stream ends
/// at the first `done` chunk; a body that ends without one is a protocol
/// violation.
pub fn ndjson_token_stream(bytes: ByteStream) -> TokenStream {
    let state = NdjsonState {
        bytes,
        parser: StreamParser::new(),
        queued: VecDeque::new(),
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.queued.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => match state.parser.process(&chunk) {
                    Ok(chunks) => state.accept(chunks),
                    Err(error) => state.fail(error),
                },
                Some(Err(error)) => state.fail(error),
                None => match state.parser.finish() {
                    Ok(Some(chunk)) if chunk.done => state.accept(vec![chunk]),
                    Ok(_) => state.fail(GhostError::ProtocolViolation(
                        "stream ended before the final chunk".to_string(),
                    )),
                    Err(error) => state.fail(error),
                },
            }
        }
    }))
}
