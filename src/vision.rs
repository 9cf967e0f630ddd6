//! Turns image attachments into textual analyses before the main turn.

use crate::api::ChatBackend;
use crate::error::{GhostError, Result};
use crate::types::{ChatMessage, ChatRequest};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

pub const VISION_SYSTEM_PROMPT: &str = "You are an image analysis assistant. Describe images \
accurately and concisely so that another assistant, who cannot see the image, can answer \
questions about it. Transcribe any visible text verbatim.";

pub const VISION_PROMPT: &str = "Describe this image in detail: the main subject, notable \
objects, any text, and anything unusual.";

pub struct VisionPreprocessor<'a> {
    backend: &'a dyn ChatBackend,
    model: String,
    accepted_types: Vec<String>,
}

impl<'a> VisionPreprocessor<'a> {
    pub fn new(backend: &'a dyn ChatBackend, model: impl Into<String>, accepted_types: Vec<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            accepted_types,
        }
    }

    /// Reject unsupported extensions before any file is read or request
    /// sent.
    pub fn check_types(&self, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            let extension = path
                .extension()
                .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default();
            if !self.accepted_types.iter().any(|accepted| *accepted == extension) {
                return Err(GhostError::UnsupportedImage {
                    extension: if extension.is_empty() {
                        "<none>".to_string()
                    } else {
                        extension
                    },
                    accepted: self.accepted_types.join(", "),
                });
            }
        }
        Ok(())
    }

    /// One analysis message per image, in input order. The first failure
    /// aborts the rest.
    #[instrument(skip_all, fields(images = paths.len(), model = %self.model))]
    pub async fn analyze(
        &self,
        paths: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<Vec<ChatMessage>> {
        self.check_types(paths)?;
        let mut analyses = Vec::with_capacity(paths.len());
        for path in paths {
            let analysis = self
                .analyze_one(path, cancel)
                .await
                .map_err(|source| GhostError::ImageAnalysis {
                    path: path.clone(),
                    source: Box::new(source),
                })?;
            analyses.push(analysis);
        }
        Ok(analyses)
    }

    async fn analyze_one(&self, path: &Path, cancel: &CancellationToken) -> Result<ChatMessage> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| GhostError::io(format!("reading image {}", path.display()), e))?;
        let encoded = STANDARD.encode(&bytes);
        let file_name = display_name(path);

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vision_prompt(&file_name, encoded),
            tools: Vec::new(),
            stream: false,
            think: false,
        };
        let reply = self.backend.complete(&request, cancel).await?;
        info!(image = %file_name, analysis_len = reply.content.len(), "image analyzed");
        Ok(analysis_message(&file_name, reply.content.trim()))
    }
}

pub fn vision_prompt(file_name: &str, encoded_image: String) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(VISION_SYSTEM_PROMPT),
        ChatMessage::user(format!("Image: {file_name}\n\n{VISION_PROMPT}"))
            .with_images(vec![encoded_image]),
    ]
}

pub fn analysis_message(file_name: &str, analysis: &str) -> ChatMessage {
    ChatMessage::user(format!("[Image analysis: {file_name}]\n{analysis}"))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockChatBackend, MockCompletion};
    use crate::types::Role;
    use tempfile::TempDir;

    fn types() -> Vec<String> {
        vec!["png".to_string(), "jpg".to_string()]
    }

    #[tokio::test]
    async fn test_analyses_preserve_order_and_encode_images() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("a.png");
        let second = temp.path().join("b.JPG");
        std::fs::write(&first, b"one").unwrap();
        std::fs::write(&second, b"two").unwrap();

        let backend = MockChatBackend::new();
        backend
            .push_completion(ChatMessage::assistant("a cat"))
            .push_completion(ChatMessage::assistant(" a dog\n"));
        let vision = VisionPreprocessor::new(&backend, "llava", types());
        let out = vision
            .analyze(&[first, second], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].role, Role::User);
        assert_eq!(out[0].content, "[Image analysis: a.png]\na cat");
        assert_eq!(out[1].content, "[Image analysis: b.JPG]\na dog");

        let requests = backend.complete_requests();
        assert_eq!(requests[0].model, "llava");
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(requests[0].messages[1].images, vec![STANDARD.encode(b"one")]);
        assert!(requests[1].messages[1].content.starts_with("Image: b.JPG"));
    }

    #[tokio::test]
    async fn test_missing_file_wraps_io_error() {
        let temp = TempDir::new().unwrap();
        let backend = MockChatBackend::new();
        let vision = VisionPreprocessor::new(&backend, "llava", types());
        let err = vision
            .analyze(&[temp.path().join("gone.png")], &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            GhostError::ImageAnalysis { source, .. } => {
                assert!(matches!(*source, GhostError::Io { .. }))
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(backend.complete_requests().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_type_rejected_before_any_request() {
        let temp = TempDir::new().unwrap();
        let ok = temp.path().join("a.png");
        let svg = temp.path().join("b.svg");
        std::fs::write(&ok, b"x").unwrap();
        std::fs::write(&svg, b"<svg/>").unwrap();

        let backend = MockChatBackend::new();
        let vision = VisionPreprocessor::new(&backend, "llava", types());
        let err = vision
            .analyze(&[ok, svg], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GhostError::UnsupportedImage { extension, .. } if extension == "svg"));
        assert!(backend.complete_requests().is_empty());
    }

    #[tokio::test]
    async fn test_remote_failure_aborts_remaining_images() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("a.png");
        let second = temp.path().join("b.png");
        std::fs::write(&first, b"1").unwrap();
        std::fs::write(&second, b"2").unwrap();

        let backend = MockChatBackend::new();
        backend.push_completion_result(MockCompletion::Error(GhostError::ProtocolViolation(
            "HTTP 500".to_string(),
        )));
        let vision = VisionPreprocessor::new(&backend, "llava", types());
        let err = vision
            .analyze(&[first, second], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GhostError::ImageAnalysis { .. }));
        assert_eq!(backend.complete_requests().len(), 1);
    }
}
