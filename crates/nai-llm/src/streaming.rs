use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::buffer_utils::CircularLineBuffer;
use crate::completions::{StreamChunk, WireUsage};
use crate::error::{LlmError, Result};
use crate::traits::{ByteStream, TokenCallback};

/// Payload that terminates the event stream
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &str = "data:";

/// Result of consuming a whole SSE body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedStream {
    /// Concatenation of every text increment
    pub text: String,
    /// Last non-empty `finish_reason` seen, not yet normalized
    pub stop_reason: String,
    /// Token counts, if the provider sent them on the terminal chunk
    pub usage: Option<WireUsage>,
    /// Whether the `[DONE]` sentinel was reached
    pub completed: bool,
}

/// Incremental SSE line decoder for completion chunks
#[derive(Debug, Default)]
pub struct SseDecoder {
    text: String,
    stop_reason: String,
    usage: Option<WireUsage>,
    completed: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one complete line. Returns `true` once the sentinel is seen.
    ///
    /// Non-data lines (comments, keep-alives) and undecodable payloads are
    /// skipped.
    pub fn feed_line(&mut self, line: &str, on_token: TokenCallback<'_>) -> bool {
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            return false;
        };
        let data = data.strip_prefix(' ').unwrap_or(data);

        if data.trim() == DONE_SENTINEL {
            self.completed = true;
            on_token("", true);
            return true;
        }

        let chunk: StreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(error = %e, "Skipping malformed stream chunk");
                return false;
            }
        };

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        if let Some(text) = chunk.text() {
            self.text.push_str(text);
            on_token(text, false);
        }

        // Last writer wins: the terminal chunk's reason is authoritative
        if let Some(reason) = chunk.finish_reason() {
            self.stop_reason = reason.to_string();
        }

        false
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn finish(self) -> DecodedStream {
        DecodedStream {
            text: self.text,
            stop_reason: self.stop_reason,
            usage: self.usage,
            completed: self.completed,
        }
    }

    /// Attach the text accumulated so far to an interrupting error
    fn interrupt(self, error: LlmError) -> LlmError {
        match error {
            LlmError::StreamInterrupted { message, .. } => LlmError::StreamInterrupted {
                partial: self.text,
                message,
            },
            LlmError::Cancelled { .. } => LlmError::Cancelled { partial: self.text },
            other => other,
        }
    }
}

/// Consume an SSE body, forwarding each text increment to `on_token`.
///
/// Read errors end the stream and come back as
/// [`LlmError::StreamInterrupted`]; cancellation comes back as
/// [`LlmError::Cancelled`]. Both carry the text received so far.
pub async fn decode_sse_stream(
    mut stream: ByteStream,
    cancel: &CancellationToken,
    on_token: TokenCallback<'_>,
) -> Result<DecodedStream> {
    let mut buffer = CircularLineBuffer::with_capacity(4096);
    let mut decoder = SseDecoder::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(decoder.interrupt(LlmError::cancelled())),
            next = stream.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                buffer.extend(&bytes);
                while let Some(line) = buffer.next_line() {
                    let Ok(line) = line else {
                        debug!("Skipping stream line with invalid UTF-8");
                        continue;
                    };
                    if decoder.feed_line(&line, on_token) {
                        return Ok(decoder.finish());
                    }
                }
            }
            Some(Err(e)) => return Err(decoder.interrupt(e)),
            None => break,
        }
    }

    if let Some(Ok(line)) = buffer.take_remainder() {
        decoder.feed_line(&line, on_token);
    }

    Ok(decoder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn feed_all(lines: &[&str]) -> (DecodedStream, Vec<(String, bool)>) {
        let mut seen = Vec::new();
        let mut decoder = SseDecoder::new();
        {
            let mut on_token = |text: &str, done: bool| seen.push((text.to_string(), done));
            for line in lines {
                if decoder.feed_line(line, &mut on_token) {
                    break;
                }
            }
        }
        (decoder.finish(), seen)
    }

    #[test]
    fn test_two_chunks_then_done() {
        let (decoded, seen) = feed_all(&[
            r#"data: {"choices":[{"text":"Hel"}]}"#,
            r#"data: {"choices":[{"text":"lo","finish_reason":"stop"}]}"#,
            "data: [DONE]",
        ]);

        assert_eq!(decoded.text, "Hello");
        assert_eq!(decoded.stop_reason, "stop");
        assert!(decoded.completed);
        assert_eq!(
            seen,
            vec![
                ("Hel".to_string(), false),
                ("lo".to_string(), false),
                (String::new(), true),
            ]
        );
    }

    #[test]
    fn test_decoder_reports_progress() {
        let mut decoder = SseDecoder::new();
        let mut sink = |_: &str, _: bool| {};

        assert!(!decoder.feed_line(r#"data: {"choices":[{"text":"Hel"}]}"#, &mut sink));
        assert_eq!(decoder.text(), "Hel");
        assert!(!decoder.is_completed());

        assert!(decoder.feed_line("data: [DONE]", &mut sink));
        assert!(decoder.is_completed());
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_keeps_partial() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let first: std::result::Result<Bytes, LlmError> =
            Ok(Bytes::from_static(b"data: {\"choices\":[{\"text\":\"Hel\"}]}\n\n"));
        let stream: ByteStream = Box::pin(futures::stream::iter(vec![first]).chain(
            futures::stream::once(async move {
                trigger.cancel();
                futures::future::pending::<std::result::Result<Bytes, LlmError>>().await
            }),
        ));

        let mut seen = Vec::new();
        let mut on_token = |text: &str, done: bool| seen.push((text.to_string(), done));
        let err = decode_sse_stream(stream, &cancel, &mut on_token).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.partial_text(), Some("Hel"));
        assert_eq!(seen, vec![("Hel".to_string(), false)]);
    }

    #[test]
    fn test_ignores_comments_and_blank_lines() {
        let (decoded, seen) = feed_all(&[
            ": keep-alive",
            "",
            "event: message",
            r#"data: {"choices":[{"text":"ok"}]}"#,
        ]);
        assert_eq!(decoded.text, "ok");
        assert!(!decoded.completed);
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_malformed_chunk_is_skipped() {
        let (decoded, _) = feed_all(&[
            r#"data: {"choices":[{"text":"a"}]}"#,
            r#"data: {"choices":[{"text":"#,
            r#"data: {"choices":[{"text":"b"}]}"#,
        ]);
        assert_eq!(decoded.text, "ab");
    }

    #[test]
    fn test_stop_reason_last_writer_wins() {
        let (decoded, _) = feed_all(&[
            r#"data: {"choices":[{"text":"a","finish_reason":"length"}]}"#,
            r#"data: {"choices":[{"text":"","finish_reason":null}]}"#,
            r#"data: {"choices":[{"text":"","finish_reason":"stop"}]}"#,
        ]);
        assert_eq!(decoded.stop_reason, "stop");
    }

    #[test]
    fn test_usage_only_chunk_is_recorded() {
        let (decoded, _) = feed_all(&[
            r#"data: {"choices":[{"text":"hi","finish_reason":"stop"}]}"#,
            r#"data: {"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":3,"total_tokens":15}}"#,
            "data: [DONE]",
        ]);
        assert_eq!(decoded.usage.map(|u| u.completion_tokens), Some(3));
        assert_eq!(decoded.text, "hi");
    }

    #[test]
    fn test_data_prefix_without_space() {
        let (decoded, _) = feed_all(&[r#"data:{"choices":[{"text":"x"}]}"#, "data:[DONE]"]);
        assert_eq!(decoded.text, "x");
        assert!(decoded.completed);
    }
}
