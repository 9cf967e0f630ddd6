use bytes::Bytes;
use futures::StreamExt;
use ghost::api::client::ByteStream;
use ghost::api::ndjson_token_stream;
use ghost::api::stream::StreamParser;
use ghost::error::{GhostError, Result};

fn line(content: &str, done: bool) -> String {
    format!(
        "{{\"model\":\"m\",\"message\":{{\"role\":\"assistant\",\"content\":{}}},\"done\":{done}}}\n",
        serde_json::to_string(content).expect("encode content")
    )
}

fn byte_stream(parts: Vec<Result<Bytes>>) -> ByteStream {
    Box::pin(futures::stream::iter(parts))
}

#[test]
fn test_fragmented_lines() {
    let mut parser = StreamParser::new();
    let body = format!("{}{}", line("Hel", false), line("lo", false));
    let (head, tail) = body.as_bytes().split_at(30);

    let first = parser.process(head).expect("first chunk");
    assert!(first.is_empty());
    let rest = parser.process(tail).expect("second chunk");
    assert_eq!(rest.len(), 2);
    let text: String = rest
        .iter()
        .filter_map(|chunk| chunk.message.as_ref().map(|m| m.content.as_str()))
        .collect();
    assert_eq!(text, "Hello");
}

#[test]
fn test_bad_line_is_skipped() {
    let mut parser = StreamParser::new();
    let body = format!("{{not json}}\n{}", line("ok", true));
    let chunks = parser.process(body.as_bytes()).expect("bad line tolerated");
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].done);
}

#[test]
fn test_server_error_line_is_protocol_violation() {
    let mut parser = StreamParser::new();
    let err = parser
        .process(b"{\"error\":\"model not found\"}\n")
        .expect_err("error line");
    assert!(matches!(err, GhostError::ProtocolViolation(ref msg) if msg == "model not found"));
}

#[test]
fn test_blank_lines_are_ignored() {
    let mut parser = StreamParser::new();
    let body = format!("\n\r\n{}\n", line("x", false));
    assert_eq!(parser.process(body.as_bytes()).expect("parse").len(), 1);
    assert!(parser.finish().expect("finish").is_none());
}

#[tokio::test]
async fn test_token_stream_yields_content_until_done() {
    let body = format!(
        "{}{}{}{}",
        line("<think>", false),
        line("Hi", false),
        line("", true),
        line("ignored after done", false)
    );
    let bytes: Vec<Result<Bytes>> = body
        .as_bytes()
        .chunks(7)
        .map(|part| Ok(Bytes::copy_from_slice(part)))
        .collect();

    let tokens: Vec<String> = ndjson_token_stream(byte_stream(bytes))
        .map(|item| item.expect("token"))
        .collect()
        .await;
    assert_eq!(tokens.concat(), "<think>Hi");
}

#[tokio::test]
async fn test_token_stream_without_done_is_protocol_violation() {
    let bytes = vec![Ok(Bytes::from(line("partial", false)))];
    let items: Vec<Result<String>> = ndjson_token_stream(byte_stream(bytes)).collect().await;

    assert!(matches!(items.first(), Some(Ok(token)) if token == "partial"));
    assert!(matches!(
        items.last(),
        Some(Err(GhostError::ProtocolViolation(_)))
    ));
}

#[tokio::test]
async fn test_transport_error_ends_stream() {
    let bytes = vec![
        Ok(Bytes::from(line("a", false))),
        Err(GhostError::RemoteUnavailable {
            url: "http://localhost:11434".to_string(),
            reason: "connection reset".to_string(),
        }),
    ];
    let items: Vec<Result<String>> = ndjson_token_stream(byte_stream(bytes)).collect().await;
    assert_eq!(items.len(), 2);
    assert!(matches!(
        items[1],
        Err(GhostError::RemoteUnavailable { .. })
    ));
}
