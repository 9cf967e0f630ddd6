pub mod client;
pub mod logging;
pub mod mock_client;
pub mod stream;

pub use client::{ndjson_token_stream, ChatBackend, HealthReport, OllamaClient, TokenStream};
pub use mock_client::{MockChatBackend, MockCompletion, MockStream};
