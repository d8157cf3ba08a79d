use thiserror::Error;

/// Coarse failure category, independent of the concrete variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing credential, empty history on continuation, bad config
    Config,
    /// Network failure after retries, non-2xx status, broken stream
    Transport,
    /// Response body could not be decoded or carried no choices
    Protocol,
    /// Aborted through the caller's cancellation token
    Cancellation,
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("API error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Error reading stream: {message}")]
    StreamInterrupted { partial: String, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Operation cancelled")]
    Cancelled { partial: String },
}

impl LlmError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn cancelled() -> Self {
        Self::Cancelled {
            partial: String::new(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Transport { .. } | Self::Status { .. } | Self::StreamInterrupted { .. } => {
                ErrorKind::Transport
            }
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Cancelled { .. } => ErrorKind::Cancellation,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancellation
    }

    /// Text that had already streamed in before the failure, if any
    pub fn partial_text(&self) -> Option<&str> {
        match self {
            Self::StreamInterrupted { partial, .. } | Self::Cancelled { partial } => {
                Some(partial.as_str()).filter(|p| !p.is_empty())
            }
            _ => None,
        }
    }

    /// HTTP status carried by a non-2xx response
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
