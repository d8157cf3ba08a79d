use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::completions::{CompletionRequest, CompletionResponse, HttpTransport, StopReason, DEFAULT_COMPLETIONS_URL};
use crate::config::ClientConfig;
use crate::error::{LlmError, Result};
use crate::history::History;
use crate::prompt::PromptFormatter;
use crate::settings::GenerationSettings;
use crate::streaming::{decode_sse_stream, DecodedStream};
use crate::think::ThinkModePolicy;
use crate::traits::{ChatSession, CompletionTransport, TokenCallback, TransportCall};
use crate::types::{Message, Role, Usage};

/// Characters per token used when a stream reports no usage.
/// A rough approximation, never an exact count.
const ESTIMATED_CHARS_PER_TOKEN: usize = 4;

/// Outcome of one send operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub text: String,
    pub stop_reason: StopReason,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Reply {
    pub fn usage(&self) -> Usage {
        Usage::new(self.input_tokens, self.output_tokens)
    }

    /// Append a continuation step; its stop reason replaces ours
    fn absorb(&mut self, step: Reply) {
        self.text.push_str(&step.text);
        self.input_tokens = self.input_tokens.saturating_add(step.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(step.output_tokens);
        self.stop_reason = step.stop_reason;
    }

    fn from_response(response: CompletionResponse) -> Result<Self> {
        let usage = response.usage;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::protocol("No choices in response"))?;

        Ok(Self {
            text: choice.text,
            stop_reason: StopReason::normalize(choice.finish_reason.as_deref().unwrap_or_default()),
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        })
    }

    fn from_stream(decoded: DecodedStream) -> Self {
        let (input_tokens, reported) = decoded
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();
        let output_tokens = if reported > 0 {
            reported
        } else {
            estimate_output_tokens(&decoded.text)
        };

        Self {
            stop_reason: StopReason::normalize(&decoded.stop_reason),
            text: decoded.text,
            input_tokens,
            output_tokens,
        }
    }
}

/// A continuation loop that failed part way.
///
/// `partial` holds everything accumulated by the steps that succeeded.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct Incomplete {
    pub partial: Reply,
    #[source]
    pub error: LlmError,
}

/// Fallback output-token estimate for streamed replies
pub fn estimate_output_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    let estimate = (text.chars().count() / ESTIMATED_CHARS_PER_TOKEN).max(1);
    u32::try_from(estimate).unwrap_or(u32::MAX)
}

/// Multi-turn conversation against a flat-prompt completions endpoint.
///
/// History and usage are mutated in place without locking; use one
/// `Conversation` per task or serialize access.
pub struct Conversation {
    system: String,
    history: History,
    usage: Usage,
    settings: GenerationSettings,
    transport: Arc<dyn CompletionTransport>,
    api_key: Option<String>,
    endpoint: Option<String>,
    cancel: CancellationToken,
}

impl Conversation {
    pub fn new(system: impl Into<String>, transport: Arc<dyn CompletionTransport>) -> Self {
        Self {
            system: system.into(),
            history: History::new(),
            usage: Usage::default(),
            settings: GenerationSettings::default(),
            transport,
            api_key: None,
            endpoint: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Build an HTTP-backed conversation from loaded configuration
    pub fn from_config(system: impl Into<String>, config: &ClientConfig) -> Result<Self> {
        let transport = HttpTransport::from_config(config)?;
        let mut conversation = Self::new(system, Arc::new(transport)).with_settings(config.generation.clone());
        conversation.api_key = config.api_key.clone();
        conversation.endpoint = config.endpoint.clone();
        Ok(conversation)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn set_api_key(&mut self, api_key: Option<String>) {
        self.api_key = api_key;
    }

    /// Override the completions URL; `None` restores the default
    pub fn set_endpoint(&mut self, endpoint: Option<String>) {
        self.endpoint = endpoint;
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_COMPLETIONS_URL)
    }

    pub fn set_think_mode(&mut self, policy: Option<ThinkModePolicy>) {
        self.settings.think_mode = policy;
    }

    pub fn set_cancellation(&mut self, cancel: CancellationToken) {
        self.cancel = cancel;
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut GenerationSettings {
        &mut self.settings
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn messages(&self) -> &[Message] {
        self.history.messages()
    }

    pub fn add_message(&mut self, role: Role, content: impl Into<String>) {
        self.history.append(role, content);
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    /// Accumulated token usage across every successful call
    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.settings.model = model.into();
    }

    /// Drop history and usage; the system prompt and settings stay
    pub fn clear(&mut self) {
        self.history.clear();
        self.usage = Usage::default();
    }

    /// Single buffered request.
    ///
    /// Non-empty `input` is appended as a user turn first. Empty input asks
    /// the model to answer the standing last turn, or to continue a truncated
    /// assistant turn. A user turn appended before a failed call stays in the
    /// history, so retry with empty input rather than resending it.
    pub async fn send(&mut self, input: &str) -> Result<Reply> {
        let request = self.prepare(input, false)?;
        let response = self.transport.complete(self.transport_call(&request)).await?;
        let reply = Reply::from_response(response)?;
        self.record(&reply);
        Ok(reply)
    }

    /// Single streaming request; `on_token` sees every text increment and a
    /// final `("", true)` once the stream signals completion.
    pub async fn send_streaming(&mut self, input: &str, on_token: TokenCallback<'_>) -> Result<Reply> {
        let request = self.prepare(input, true)?;
        let stream = self
            .transport
            .complete_stream(self.transport_call(&request))
            .await?;
        let decoded = decode_sse_stream(stream, &self.cancel, on_token).await?;
        let reply = Reply::from_stream(decoded);
        self.record(&reply);
        Ok(reply)
    }

    /// Send, then keep continuing while the model stops at its token limit.
    ///
    /// The returned text is the concatenation of every step; the history
    /// ends with a single merged assistant turn. There is no step limit: a
    /// provider that keeps reporting its token limit is only stopped by
    /// cancelling this conversation's token.
    pub async fn send_until_done(&mut self, input: &str) -> std::result::Result<Reply, Incomplete> {
        self.until_done(input, None).await
    }

    pub async fn send_streaming_until_done(
        &mut self,
        input: &str,
        on_token: TokenCallback<'_>,
    ) -> std::result::Result<Reply, Incomplete> {
        self.until_done(input, Some(on_token)).await
    }

    async fn until_done(
        &mut self,
        input: &str,
        mut on_token: Option<TokenCallback<'_>>,
    ) -> std::result::Result<Reply, Incomplete> {
        let mut total = Reply::default();
        let mut input = input;
        let mut iteration: u32 = 0;

        loop {
            iteration += 1;
            let step = match on_token.as_mut() {
                Some(on_token) => self.send_streaming(input, &mut **on_token).await,
                None => self.send(input).await,
            };

            match step {
                Ok(step) => total.absorb(step),
                Err(error) => {
                    return Err(Incomplete {
                        partial: total,
                        error,
                    })
                }
            }
            self.history.merge_trailing_assistant_pair();

            debug!(
                iteration,
                stop_reason = %total.stop_reason,
                text_len = total.text.len(),
                "Completion step finished"
            );
            if !total.stop_reason.is_max_tokens() {
                return Ok(total);
            }
            input = "";
        }
    }

    /// Validate, append the user turn and build the wire request
    fn prepare(&mut self, input: &str, stream: bool) -> Result<CompletionRequest> {
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(LlmError::config("API token not set"));
        }
        if self.cancel.is_cancelled() {
            return Err(LlmError::cancelled());
        }
        if input.is_empty() && self.history.is_empty() {
            return Err(LlmError::config("Empty input with no history to continue"));
        }

        if !input.is_empty() {
            self.history.append(Role::User, input);
        }

        let prompt = PromptFormatter::new(
            &self.settings.template,
            self.settings.effective_think_mode(),
            self.settings.thinking,
        )
        .format(&self.system, self.history.messages());

        Ok(CompletionRequest::new(&self.settings, prompt, stream))
    }

    fn transport_call<'a>(&'a self, request: &'a CompletionRequest) -> TransportCall<'a> {
        TransportCall {
            endpoint: self.endpoint(),
            api_key: self.api_key.as_deref().unwrap_or_default(),
            request,
            cancel: &self.cancel,
        }
    }

    fn record(&mut self, reply: &Reply) {
        self.history.append(Role::Assistant, reply.text.clone());
        self.usage += reply.usage();
    }
}

impl fmt::Debug for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("system", &self.system)
            .field("history", &self.history)
            .field("usage", &self.usage)
            .field("settings", &self.settings)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatSession for Conversation {
    async fn send(&mut self, input: &str) -> Result<Reply> {
        Conversation::send(self, input).await
    }

    async fn send_streaming(&mut self, input: &str, on_token: TokenCallback<'_>) -> Result<Reply> {
        Conversation::send_streaming(self, input, on_token).await
    }

    async fn send_until_done(&mut self, input: &str) -> std::result::Result<Reply, Incomplete> {
        Conversation::send_until_done(self, input).await
    }

    async fn send_streaming_until_done(
        &mut self,
        input: &str,
        on_token: TokenCallback<'_>,
    ) -> std::result::Result<Reply, Incomplete> {
        Conversation::send_streaming_until_done(self, input, on_token).await
    }

    fn add_message(&mut self, role: Role, content: &str) {
        Conversation::add_message(self, role, content);
    }

    fn messages(&self) -> &[Message] {
        Conversation::messages(self)
    }

    fn usage(&self) -> Usage {
        Conversation::usage(self)
    }

    fn system(&self) -> &str {
        Conversation::system(self)
    }

    fn clear(&mut self) {
        Conversation::clear(self);
    }

    fn set_model(&mut self, model: &str) {
        Conversation::set_model(self, model);
    }
}

const _: fn() = || {
    fn assert_session<T: ChatSession>() {}
    assert_session::<Conversation>();
};
