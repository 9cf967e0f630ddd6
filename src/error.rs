use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = GhostError> = std::result::Result<T, E>;

/// sysexits(3) codes used by the binary.
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const SOFTWARE: i32 = 1;
    pub const USAGE: i32 = 64;
    pub const DATAERR: i32 = 65;
    pub const NOINPUT: i32 = 66;
    pub const NOHOST: i32 = 68;
    pub const UNAVAILABLE: i32 = 69;
    pub const IOERR: i32 = 74;
    pub const CONFIG: i32 = 78;
}

#[derive(Debug, Error)]
pub enum GhostError {
    #[error("missing required configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Usage(String),

    #[error("nothing to send: {0}")]
    NoInput(String),

    #[error("thread storage error at {}: {source}", .path.display())]
    StorageAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    #[error("corrupt thread document {}: {reason}", .path.display())]
    DataCorruption { path: PathBuf, reason: String },

    #[error("tool not registered: {0}")]
    ToolNotRegistered(String),

    #[error("invalid arguments for tool {tool}: {reason}")]
    ToolArgumentParse { tool: String, reason: String },

    #[error("tool {tool} failed: {reason}")]
    ToolExecution { tool: String, reason: String },

    #[error("tool loop did not converge after {0} rounds")]
    ToolLoopLimit(usize),

    #[error("cannot reach chat host '{url}': {reason}")]
    RemoteUnavailable { url: String, reason: String },

    #[error("model '{0}' is not installed on the chat host")]
    ModelUnavailable(String),

    #[error("chat host protocol error: {0}")]
    ProtocolViolation(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("image analysis failed for {}: {source}", .path.display())]
    ImageAnalysis {
        path: PathBuf,
        #[source]
        source: Box<GhostError>,
    },

    #[error("unsupported image type '{extension}' (accepted: {accepted})")]
    UnsupportedImage { extension: String, accepted: String },
}

impl GhostError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StorageAccess {
            path: path.into(),
            source,
        }
    }

    pub fn tool_execution(tool: &str, reason: impl ToString) -> Self {
        Self::ToolExecution {
            tool: tool.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Argument and execution failures go back to the model as tool output;
    /// everything else ends the turn.
    pub fn is_recoverable_tool_error(&self) -> bool {
        matches!(
            self,
            Self::ToolArgumentParse { .. } | Self::ToolExecution { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::ImageAnalysis { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigMissing(_) | Self::InvalidConfig(_) => exit_code::CONFIG,
            Self::Usage(_) => exit_code::USAGE,
            Self::DataCorruption { .. } | Self::ProtocolViolation(_) => exit_code::DATAERR,
            Self::ThreadNotFound(_) | Self::UnsupportedImage { .. } | Self::NoInput(_) => {
                exit_code::NOINPUT
            }
            Self::RemoteUnavailable { .. } => exit_code::NOHOST,
            Self::StorageAccess { .. } | Self::Io { .. } => exit_code::IOERR,
            Self::ImageAnalysis { source, .. } => match source.as_ref() {
                Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                    exit_code::NOINPUT
                }
                other => other.exit_code(),
            },
            Self::ToolLoopLimit(_) | Self::ModelUnavailable(_) => exit_code::UNAVAILABLE,
            Self::ToolNotRegistered(_)
            | Self::ToolArgumentParse { .. }
            | Self::ToolExecution { .. }
            | Self::Cancelled => exit_code::SOFTWARE,
        }
    }
}
