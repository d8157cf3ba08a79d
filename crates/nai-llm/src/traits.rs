use crate::completions::{CompletionRequest, CompletionResponse};
use crate::conversation::{Incomplete, Reply};
use crate::error::{LlmError, Result};
use crate::types::{Message, Role, Usage};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Raw SSE body of a streaming response
pub type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, LlmError>> + Send>>;

/// Per-token sink: `(increment, done)`. Runs inline with the stream read, so
/// it must return promptly.
pub type TokenCallback<'a> = &'a mut (dyn FnMut(&str, bool) + Send);

/// Everything a transport needs for one exchange
#[derive(Debug, Clone, Copy)]
pub struct TransportCall<'a> {
    pub endpoint: &'a str,
    pub api_key: &'a str,
    pub request: &'a CompletionRequest,
    pub cancel: &'a CancellationToken,
}

/// A single HTTP exchange against a completions endpoint
///
/// Implementations own retry on transport-level failures and must surface
/// cancellation as [`LlmError::Cancelled`] rather than retrying it.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Buffered exchange, decoded into the JSON response schema
    async fn complete(&self, call: TransportCall<'_>) -> Result<CompletionResponse>;

    /// Streaming exchange; the returned stream yields the raw SSE body
    async fn complete_stream(&self, call: TransportCall<'_>) -> Result<ByteStream>;
}

/// Multi-turn session over a flat-prompt completion service
#[async_trait]
pub trait ChatSession: Send {
    /// Single request; empty input responds to or continues the last turn
    async fn send(&mut self, input: &str) -> Result<Reply>;

    /// Single streaming request
    async fn send_streaming(&mut self, input: &str, on_token: TokenCallback<'_>) -> Result<Reply>;

    /// Keep continuing while the provider stops at its token limit
    async fn send_until_done(&mut self, input: &str) -> std::result::Result<Reply, Incomplete>;

    /// Streaming variant of [`ChatSession::send_until_done`]
    async fn send_streaming_until_done(
        &mut self,
        input: &str,
        on_token: TokenCallback<'_>,
    ) -> std::result::Result<Reply, Incomplete>;

    fn add_message(&mut self, role: Role, content: &str);

    fn messages(&self) -> &[Message];

    fn usage(&self) -> Usage;

    fn system(&self) -> &str;

    fn clear(&mut self);

    fn set_model(&mut self, model: &str);
}
