// HTTP transport for the completions endpoint (reqwest, no SDK)

use crate::config::ClientConfig;
use crate::completions::wire::CompletionResponse;
use crate::error::{LlmError, Result};
use crate::retry::{with_retry, RetryPolicy};
use crate::traits::{ByteStream, CompletionTransport, TransportCall};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderValue, ACCEPT};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// NovelAI's OpenAI-compatible completions endpoint
pub const DEFAULT_COMPLETIONS_URL: &str = "https://text.novelai.net/oa/v1/completions";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Completions transport over HTTPS with bounded retry
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    request_timeout: Duration,
    retry: RetryPolicy,
}

impl HttpTransport {
    /// Transport with default timeouts and retry policy
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::builder()
            .request_timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .retry(config.retry)
            .build()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fresh request per attempt; the body is re-serialized every time
    fn build_http_request(&self, call: &TransportCall<'_>, streaming: bool) -> reqwest::RequestBuilder {
        let builder = self
            .http_client
            .post(call.endpoint)
            .bearer_auth(call.api_key)
            .json(call.request);

        if streaming {
            // No total deadline while tokens are still arriving
            builder.header(ACCEPT, HeaderValue::from_static("text/event-stream"))
        } else {
            builder.timeout(self.request_timeout)
        }
    }

    /// Send with retry and reject non-2xx statuses
    async fn execute(&self, call: TransportCall<'_>, streaming: bool) -> Result<(reqwest::Response, u32)> {
        if call.api_key.is_empty() {
            return Err(LlmError::config("API token not set"));
        }

        debug!(
            endpoint = call.endpoint,
            model = %call.request.model,
            stream = streaming,
            prompt_len = call.request.prompt.len(),
            "Dispatching completion request"
        );

        let (response, attempts) = with_retry(&self.retry, call.cancel, |attempt| {
            let request = self.build_http_request(&call, streaming);
            async move {
                tokio::select! {
                    _ = call.cancel.cancelled() => Err(LlmError::cancelled()),
                    result = request.send() => match result {
                        Ok(response) => Ok((response, attempt)),
                        Err(source) if source.is_builder() => {
                            Err(LlmError::config(format!("Invalid request: {}", source)))
                        }
                        Err(source) => Err(LlmError::Transport { attempts: attempt, source }),
                    },
                }
            }
        })
        .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = read_body(response, call.cancel, attempts).await;
            return Err(status_error(status, body));
        }

        Ok((response, attempts))
    }
}

/// Non-2xx outcome. An unreadable body is reported as empty, but
/// cancellation during the read stays a cancellation.
fn status_error(status: u16, body: Result<String>) -> LlmError {
    match body {
        Ok(body) => LlmError::Status { status, body },
        Err(e) if e.is_cancelled() => e,
        Err(e) => {
            debug!(status, error = %e, "Failed to read error response body");
            LlmError::Status {
                status,
                body: String::new(),
            }
        }
    }
}

async fn read_body(response: reqwest::Response, cancel: &CancellationToken, attempts: u32) -> Result<String> {
    tokio::select! {
        _ = cancel.cancelled() => Err(LlmError::cancelled()),
        body = response.text() => body.map_err(|source| LlmError::Transport { attempts, source }),
    }
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn complete(&self, call: TransportCall<'_>) -> Result<CompletionResponse> {
        let (response, attempts) = self.execute(call, false).await?;
        let body = read_body(response, call.cancel, attempts).await?;

        serde_json::from_str(&body)
            .map_err(|e| LlmError::protocol(format!("Error parsing response: {}", e)))
    }

    async fn complete_stream(&self, call: TransportCall<'_>) -> Result<ByteStream> {
        let (response, _) = self.execute(call, true).await?;

        let stream = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| LlmError::StreamInterrupted {
                partial: String::new(),
                message: e.to_string(),
            })
        });
        Ok(Box::pin(stream))
    }
}

/// Builder for [`HttpTransport`]
#[derive(Debug, Default)]
pub struct HttpTransportBuilder {
    http_client: Option<reqwest::Client>,
    request_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
}

impl HttpTransportBuilder {
    /// Use a preconfigured client (proxies, custom TLS, ...)
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Deadline for buffered requests; streaming requests have none
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn build(self) -> Result<HttpTransport> {
        let http_client = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
                .build()
                .map_err(|e| LlmError::config(format!("Failed to create HTTP client: {}", e)))?,
        };

        Ok(HttpTransport {
            http_client,
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            retry: self.retry.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let transport = HttpTransport::new().unwrap();
        assert_eq!(transport.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(*transport.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_builder_overrides() {
        let transport = HttpTransport::builder()
            .request_timeout(Duration::from_secs(5))
            .retry(RetryPolicy::none())
            .build()
            .unwrap();
        assert_eq!(transport.request_timeout, Duration::from_secs(5));
        assert_eq!(transport.retry_policy().max_attempts(), 1);
    }

    #[test]
    fn test_status_error_keeps_body() {
        let err = status_error(503, Ok("overloaded".to_string()));
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.to_string(), "API error (status 503): overloaded");
    }

    #[test]
    fn test_status_error_propagates_cancellation() {
        let err = status_error(500, Err(LlmError::cancelled()));
        assert!(err.is_cancelled());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_status_error_unreadable_body_is_empty() {
        let err = status_error(502, Err(LlmError::protocol("truncated")));
        match err {
            LlmError::Status { status, body } => {
                assert_eq!(status, 502);
                assert!(body.is_empty());
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }
}
