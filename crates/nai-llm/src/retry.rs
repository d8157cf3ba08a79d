//! Fixed-delay retry for transport-level failures
//!
//! Each attempt rebuilds its request through the supplied closure, so request
//! bodies never need to be rewindable.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::LlmError;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    /// Pause between attempts, in milliseconds
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_ms: 3_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay_ms: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Trait for errors that may be retried
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for LlmError {
    /// Only raw network failures qualify; statuses, decode errors and
    /// cancellation are final.
    fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Transport { .. })
    }
}

/// Execute an async operation, retrying retryable failures.
///
/// The operation receives the 1-based attempt number. Cancellation is checked
/// before every attempt and interrupts the delay between attempts.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, LlmError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 1;

    loop {
        if cancel.is_cancelled() {
            return Err(LlmError::cancelled());
        }

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt <= policy.max_retries && !cancel.is_cancelled() => {
                warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = policy.delay_ms,
                    "Retrying after error: {}",
                    e
                );

                tokio::select! {
                    _ = cancel.cancelled() => return Err(LlmError::cancelled()),
                    _ = tokio::time::sleep(policy.delay()) => {}
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.delay(), Duration::from_secs(3));
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(!LlmError::cancelled().is_retryable());
        assert!(!LlmError::config("no key").is_retryable());
        assert!(!LlmError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(!LlmError::protocol("bad json").is_retryable());
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_returned_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let cancel = CancellationToken::new();

        let result: Result<(), _> = with_retry(&policy, &cancel, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::Status { status: 500, body: "boom".into() }) }
        })
        .await;

        assert_eq!(result.unwrap_err().status(), Some(500));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_skips_operation() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), _> = with_retry(&RetryPolicy::default(), &cancel, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_passes_attempt_number() {
        let cancel = CancellationToken::new();
        let value = with_retry(&RetryPolicy::none(), &cancel, |attempt| async move { Ok(attempt) })
            .await
            .unwrap();
        assert_eq!(value, 1);
    }
}
