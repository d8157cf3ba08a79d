pub mod buffer_utils;
pub mod completions;
pub mod config;
pub mod conversation;
pub mod credentials;
pub mod error;
pub mod history;
pub mod prompt;
pub mod retry;
pub mod settings;
pub mod streaming;
pub mod think;
pub mod traits;
pub mod types;

pub use traits::{
    ByteStream,
    ChatSession,
    CompletionTransport,
    TokenCallback,
    TransportCall,
};

pub use completions::{HttpTransport, HttpTransportBuilder, StopReason, DEFAULT_COMPLETIONS_URL};
pub use config::ClientConfig;
pub use conversation::{Conversation, Incomplete, Reply};
pub use credentials::discover_api_key;
pub use error::{ErrorKind, LlmError, Result};
pub use history::History;
pub use prompt::{PromptFormatter, PromptTemplate};
pub use retry::RetryPolicy;
pub use settings::GenerationSettings;
pub use streaming::{decode_sse_stream, DecodedStream, SseDecoder};
pub use think::ThinkModePolicy;
pub use types::{Message, Role, Usage};
