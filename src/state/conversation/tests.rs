use super::*;
use crate::api::{MockChatBackend, MockCompletion, MockStream};
use crate::error::{GhostError, Result};
use crate::runtime::{TurnEvent, TURN_CHANNEL_CAPACITY};
use crate::store::ThreadStore;
use crate::tools::{parse_arguments, Tool, ToolParameters, ToolRegistry};
use crate::types::{ChatMessage, Role, ToolCall};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct EchoTool;

#[derive(Deserialize)]
struct EchoArgs {
    x: String,
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return x"
    }

    fn parameters(&self) -> ToolParameters {
        ToolParameters::new().required("x", "string", "value to return")
    }

    async fn execute(&self, arguments: Value) -> Result<String> {
        let args: EchoArgs = parse_arguments(self.name(), arguments)?;
        Ok(args.x)
    }
}

fn settings(max_tool_rounds: usize) -> TurnSettings {
    TurnSettings {
        model: "chat-model".to_string(),
        vision_model: "vision-model".to_string(),
        think: false,
        max_tool_rounds,
        image_types: vec!["png".to_string()],
        filter_think: true,
    }
}

fn manager_with(backend: &MockChatBackend, temp: &TempDir, max_rounds: usize) -> ConversationManager {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool).expect("register echo");
    let store = ThreadStore::open(temp.path()).expect("open store");
    ConversationManager::new(
        Arc::new(backend.clone()),
        Arc::new(registry),
        store,
        settings(max_rounds),
    )
}

fn echo_call(x: &str) -> ChatMessage {
    ChatMessage::assistant_with_tool_calls("", vec![ToolCall::new("echo", json!({ "x": x }))])
}

async fn run(
    manager: &mut ConversationManager,
    input: TurnInput,
    cancel: CancellationToken,
) -> (Option<TurnOutcome>, Vec<TurnEvent>) {
    let (tx, mut rx) = mpsc::channel(TURN_CHANNEL_CAPACITY);
    let collect = async {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    };
    tokio::join!(manager.run_turn(input, tx, cancel), collect)
}

fn chunks(events: &[TurnEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            TurnEvent::Chunk(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_cancel_returns_while_receiver_is_not_reading() {
    let temp = TempDir::new().unwrap();
    let backend = MockChatBackend::new();
    let tokens: Vec<String> = (0..100).map(|idx| format!("t{idx} ")).collect();
    backend
        .push_completion(ChatMessage::assistant(""))
        .push_stream_result(MockStream::TokensThenHang(tokens));
    let mut manager = manager_with(&backend, &temp, 16);

    let (tx, mut rx) = mpsc::channel(TURN_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move { manager.run_turn(TurnInput::text("hi"), tx, cancel).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(3), task)
        .await
        .expect("turn finishes after cancel")
        .expect("turn task");
    assert!(outcome.is_none());
    let mut buffered = Vec::new();
    while let Ok(event) = rx.try_recv() {
        buffered.push(event);
    }
    assert_eq!(buffered.len(), TURN_CHANNEL_CAPACITY);
    assert!(buffered.iter().all(|event| matches!(event, TurnEvent::Chunk(_))));
}

#[tokio::test]
async fn test_tool_loop_two_echo_rounds_then_single_stream() {
    let temp = TempDir::new().unwrap();
    let backend = MockChatBackend::new();
    backend
        .push_completion(echo_call("a"))
        .push_completion(echo_call("b"))
        .push_completion(ChatMessage::assistant("done with tools"))
        .push_stream(["<think>plan</think>", "The answer", " is ab."]);
    let mut manager = manager_with(&backend, &temp, 16);

    let (outcome, events) = run(&mut manager, TurnInput::text("echo twice"), CancellationToken::new()).await;
    let outcome = outcome.expect("turn succeeds");

    assert_eq!(outcome.tool_rounds, 2);
    assert_eq!(outcome.response, "The answer is ab.");
    assert_eq!(chunks(&events), "The answer is ab.");
    assert!(matches!(events.last(), Some(TurnEvent::Done)));

    assert_eq!(backend.complete_requests().len(), 3);
    let streams = backend.stream_requests();
    assert_eq!(streams.len(), 1);
    assert!(streams[0].tools.is_empty());
    assert!(streams[0].stream);

    let stored = manager.store().get_messages(&outcome.thread_id).unwrap();
    let shape: Vec<(Role, String)> = stored.iter().map(|m| (m.role, m.content.clone())).collect();
    assert_eq!(
        shape,
        vec![
            (Role::User, "echo twice".to_string()),
            (Role::Assistant, String::new()),
            (Role::Tool, "a".to_string()),
            (Role::Assistant, String::new()),
            (Role::Tool, "b".to_string()),
            (Role::Assistant, "The answer is ab.".to_string()),
        ]
    );
    assert_eq!(stored[1].tool_calls[0].name(), "echo");
    assert_eq!(stored[2].tool_call_id, stored[1].tool_calls[0].id);
}

#[tokio::test]
async fn test_tool_loop_history_sent_to_each_completion() {
    let temp = TempDir::new().unwrap();
    let backend = MockChatBackend::new();
    backend
        .push_completion(echo_call("a"))
        .push_completion(ChatMessage::assistant(""))
        .push_stream(["ok"]);
    let mut manager = manager_with(&backend, &temp, 16);

    run(&mut manager, TurnInput::text("hi"), CancellationToken::new()).await;

    let requests = backend.complete_requests();
    assert_eq!(requests[0].messages.len(), 1);
    assert_eq!(requests[0].tools.len(), 1);
    assert!(!requests[0].stream);
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(requests[1].messages[2].role, Role::Tool);
    assert_eq!(backend.stream_requests()[0].messages.len(), 3);
}

#[tokio::test]
async fn test_bad_tool_arguments_are_fed_back_to_model() {
    let temp = TempDir::new().unwrap();
    let backend = MockChatBackend::new();
    backend
        .push_completion(ChatMessage::assistant_with_tool_calls(
            "",
            vec![ToolCall::new("echo", json!({ "y": 1 }))],
        ))
        .push_completion(ChatMessage::assistant(""))
        .push_stream(["recovered"]);
    let mut manager = manager_with(&backend, &temp, 16);

    let (outcome, _) = run(&mut manager, TurnInput::text("go"), CancellationToken::new()).await;
    assert!(outcome.is_some());
    let tool_message = &manager.messages()[2];
    assert_eq!(tool_message.role, Role::Tool);
    assert!(tool_message.content.starts_with("error: "));
}

#[tokio::test]
async fn test_unregistered_tool_ends_the_turn() {
    let temp = TempDir::new().unwrap();
    let backend = MockChatBackend::new();
    backend.push_completion(ChatMessage::assistant_with_tool_calls(
        "",
        vec![ToolCall::new("rm_rf", json!({}))],
    ));
    let mut manager = manager_with(&backend, &temp, 16);

    let (outcome, events) = run(&mut manager, TurnInput::text("go"), CancellationToken::new()).await;
    assert!(outcome.is_none());
    assert!(matches!(
        events.last(),
        Some(TurnEvent::Error(GhostError::ToolNotRegistered(name))) if name == "rm_rf"
    ));
    assert!(backend.stream_requests().is_empty());
}

#[tokio::test]
async fn test_tool_loop_cap_is_a_distinct_error() {
    let temp = TempDir::new().unwrap();
    let backend = MockChatBackend::new();
    for _ in 0..3 {
        backend.push_completion(echo_call("again"));
    }
    let mut manager = manager_with(&backend, &temp, 2);

    let (_, events) = run(&mut manager, TurnInput::text("loop"), CancellationToken::new()).await;
    assert!(matches!(
        events.last(),
        Some(TurnEvent::Error(GhostError::ToolLoopLimit(2)))
    ));
    assert_eq!(backend.complete_requests().len(), 3);
}

#[tokio::test]
async fn test_done_is_last_and_no_chunk_follows() {
    let temp = TempDir::new().unwrap();
    let backend = MockChatBackend::new();
    backend
        .push_completion(ChatMessage::assistant(""))
        .push_stream(["  ", "one ", "two ", "three"]);
    let mut manager = manager_with(&backend, &temp, 16);

    let (_, events) = run(&mut manager, TurnInput::text("count"), CancellationToken::new()).await;
    let done_at = events
        .iter()
        .position(|event| matches!(event, TurnEvent::Done))
        .expect("done event");
    assert_eq!(done_at, events.len() - 1);
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert_eq!(chunks(&events), "one two three");
}

#[tokio::test]
async fn test_stream_error_emits_error_and_skips_persisting_answer() {
    let temp = TempDir::new().unwrap();
    let backend = MockChatBackend::new();
    backend
        .push_completion(ChatMessage::assistant(""))
        .push_stream_result(MockStream::TokensThenError(
            vec!["partial".to_string()],
            GhostError::ProtocolViolation("connection reset".to_string()),
        ));
    let mut manager = manager_with(&backend, &temp, 16);

    let (outcome, events) = run(&mut manager, TurnInput::text("hi"), CancellationToken::new()).await;
    assert!(outcome.is_none());
    assert_eq!(chunks(&events), "partial");
    assert!(matches!(
        events.last(),
        Some(TurnEvent::Error(GhostError::ProtocolViolation(_)))
    ));
    let thread_id = manager.thread().unwrap().id.clone();
    assert_eq!(manager.store().get_messages(&thread_id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_during_stream_emits_cancelled() {
    let temp = TempDir::new().unwrap();
    let backend = MockChatBackend::new();
    backend
        .push_completion(ChatMessage::assistant(""))
        .push_stream_result(MockStream::TokensThenHang(vec!["start".to_string()]));
    let mut manager = manager_with(&backend, &temp, 16);

    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        }
    };
    let ((outcome, events), ()) = tokio::join!(
        run(&mut manager, TurnInput::text("hi"), cancel.clone()),
        canceller
    );
    assert!(outcome.is_none());
    assert!(matches!(events.last(), Some(TurnEvent::Error(GhostError::Cancelled))));
}

#[tokio::test]
async fn test_cancel_during_tool_loop_completion() {
    let temp = TempDir::new().unwrap();
    let backend = MockChatBackend::new();
    backend.push_completion_result(MockCompletion::Hang);
    let mut manager = manager_with(&backend, &temp, 16);

    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        }
    };
    let ((_, events), ()) = tokio::join!(
        run(&mut manager, TurnInput::text("hi"), cancel.clone()),
        canceller
    );
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], TurnEvent::Error(GhostError::Cancelled)));
}

#[tokio::test]
async fn test_images_are_analyzed_before_user_message() {
    let temp = TempDir::new().unwrap();
    let image = temp.path().join("cat.png");
    std::fs::write(&image, b"png-bytes").unwrap();

    let backend = MockChatBackend::new();
    backend
        .push_completion(ChatMessage::assistant("a sleeping cat"))
        .push_completion(ChatMessage::assistant(""))
        .push_stream(["It is a cat."]);
    let mut manager = manager_with(&backend, &temp, 16);

    let input = TurnInput::text("what is this?").with_images(vec![image]);
    let (outcome, _) = run(&mut manager, input, CancellationToken::new()).await;
    assert!(outcome.is_some());

    let requests = backend.complete_requests();
    assert_eq!(requests[0].model, "vision-model");
    assert_eq!(requests[1].model, "chat-model");
    let history = manager.messages();
    assert_eq!(history[0].content, "[Image analysis: cat.png]\na sleeping cat");
    assert_eq!(history[1].content, "what is this?");
}

#[tokio::test]
async fn test_vision_failure_aborts_before_main_completion() {
    let temp = TempDir::new().unwrap();
    let backend = MockChatBackend::new();
    let mut manager = manager_with(&backend, &temp, 16);

    let input = TurnInput::text("look").with_images(vec![temp.path().join("missing.png")]);
    let (_, events) = run(&mut manager, input, CancellationToken::new()).await;
    assert!(matches!(
        events.last(),
        Some(TurnEvent::Error(GhostError::ImageAnalysis { .. }))
    ));
    assert!(backend.complete_requests().is_empty());
    assert!(manager.thread().is_none());
}

#[tokio::test]
async fn test_followup_turn_reuses_thread_and_history() {
    let temp = TempDir::new().unwrap();
    let backend = MockChatBackend::new();
    backend
        .push_completion(ChatMessage::assistant(""))
        .push_stream(["pong"])
        .push_completion(ChatMessage::assistant(""))
        .push_stream(["pong again"]);
    let mut manager = manager_with(&backend, &temp, 16);

    let (first, _) = run(&mut manager, TurnInput::text("ping"), CancellationToken::new()).await;
    let (second, _) = run(&mut manager, TurnInput::text("ping again"), CancellationToken::new()).await;
    assert_eq!(first.unwrap().thread_id, second.unwrap().thread_id);
    assert_eq!(backend.complete_requests()[1].messages.len(), 3);

    let thread_id = manager.thread().unwrap().id.clone();
    let mut reopened = manager_with(&backend, &temp, 16);
    reopened.open_thread(&thread_id).unwrap();
    assert_eq!(reopened.messages().len(), 4);
    assert_eq!(reopened.thread().unwrap().title, "ping");

    manager.start_new_thread();
    assert!(manager.thread().is_none());
    assert!(manager.messages().is_empty());
}

#[tokio::test]
async fn test_raw_stream_when_think_filter_disabled() {
    let temp = TempDir::new().unwrap();
    let backend = MockChatBackend::new();
    backend
        .push_completion(ChatMessage::assistant(""))
        .push_stream(["<think>x</think>", "y"]);
    let mut manager = manager_with(&backend, &temp, 16);
    manager.set_filter_think(false);

    let (outcome, _) = run(&mut manager, TurnInput::text("raw"), CancellationToken::new()).await;
    assert_eq!(outcome.unwrap().response, "<think>x</think>y");
}

#[tokio::test]
async fn test_empty_message_is_rejected() {
    let temp = TempDir::new().unwrap();
    let backend = MockChatBackend::new();
    let mut manager = manager_with(&backend, &temp, 16);

    let (_, events) = run(&mut manager, TurnInput::text("   \n"), CancellationToken::new()).await;
    assert!(matches!(events.last(), Some(TurnEvent::Error(GhostError::Usage(_)))));
    assert!(manager.thread().is_none());
}
