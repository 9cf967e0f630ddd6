mod api;

pub use api::{
    ChatMessage, ChatRequest, ChatResponse, Role, StreamChunk, StreamDelta, ToolCall,
    ToolCallFunction, ToolFunctionSpec, ToolSpec,
};
