// Request/response bodies for the completions endpoint

use crate::settings::GenerationSettings;
use crate::types::Usage;
use serde::{Deserialize, Serialize};
use std::fmt;

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Request body. Zero-valued numbers and empty lists are left out so the
/// server keeps its own defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    pub top_p: f32,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub top_k: u32,
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    pub min_p: f32,
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    pub frequency_penalty: f32,
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    pub presence_penalty: f32,
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    pub repetition_penalty: f32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOptions {
    pub include_usage: bool,
}

impl CompletionRequest {
    pub fn new(settings: &GenerationSettings, prompt: String, stream: bool) -> Self {
        Self {
            model: settings.model.clone(),
            prompt,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            top_p: settings.top_p,
            top_k: settings.top_k,
            min_p: settings.min_p,
            frequency_penalty: settings.frequency_penalty,
            presence_penalty: settings.presence_penalty,
            repetition_penalty: settings.repetition_penalty,
            stream,
            stream_options: stream.then_some(StreamOptions { include_usage: true }),
            stop: settings.stop_sequences.clone(),
        }
    }
}

/// Non-streaming response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub usage: WireUsage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub text: String,
    /// "stop", "length", ...
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(usage: WireUsage) -> Self {
        Usage::new(usage.prompt_tokens, usage.completion_tokens)
    }
}

/// One SSE `data:` payload while streaming
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    /// Only present on the terminal chunk, if at all
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl StreamChunk {
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .map(|c| c.text.as_str())
            .filter(|t| !t.is_empty())
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.finish_reason.as_deref())
            .filter(|r| !r.is_empty())
    }
}

/// Provider-neutral stop reason
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    /// Anything unmapped, including the empty string
    Other(String),
}

impl StopReason {
    /// Map an OpenAI-style `finish_reason` onto the common vocabulary
    pub fn normalize(reason: &str) -> Self {
        match reason {
            "stop" => Self::EndTurn,
            "length" => Self::MaxTokens,
            "tool_calls" => Self::ToolUse,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::EndTurn => "end_turn",
            Self::MaxTokens => "max_tokens",
            Self::ToolUse => "tool_use",
            Self::Other(s) => s.as_str(),
        }
    }

    /// True for a truncated generation, whether mapped or passed through
    pub fn is_max_tokens(&self) -> bool {
        self.as_str() == "max_tokens"
    }
}

impl Default for StopReason {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_table() {
        let cases = [
            ("stop", "end_turn"),
            ("length", "max_tokens"),
            ("tool_calls", "tool_use"),
            ("content_filter", "content_filter"),
            ("end_turn", "end_turn"),
            ("max_tokens", "max_tokens"),
            ("", ""),
        ];
        for (input, expected) in cases {
            assert_eq!(StopReason::normalize(input).as_str(), expected, "input {:?}", input);
        }
    }

    #[test]
    fn test_passthrough_max_tokens_still_continues() {
        assert!(StopReason::normalize("length").is_max_tokens());
        assert!(StopReason::normalize("max_tokens").is_max_tokens());
        assert!(!StopReason::normalize("stop").is_max_tokens());
        assert!(!StopReason::default().is_max_tokens());
    }

    #[test]
    fn test_sparse_request_encoding() {
        let settings = GenerationSettings {
            stop_sequences: vec![],
            ..GenerationSettings::default()
        };
        let request = CompletionRequest::new(&settings, "p".to_string(), false);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({
                "model": "glm-4-6",
                "prompt": "p",
                "max_tokens": 2048,
                "temperature": 1.0,
            })
        );
    }

    #[test]
    fn test_streaming_request_includes_usage_option() {
        let settings = GenerationSettings::default();
        let request = CompletionRequest::new(&settings, "p".to_string(), true);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["stream"], json!(true));
        assert_eq!(value["stream_options"]["include_usage"], json!(true));
        assert_eq!(value["stop"], json!(["<|user|>", "<|system|>"]));
        assert!(value.get("top_k").is_none());
    }

    #[test]
    fn test_response_decoding() {
        let body = r#"{
            "id": "cmpl-123",
            "object": "text_completion",
            "created": 1677652288,
            "model": "glm-4-6",
            "choices": [{"index": 0, "text": " Hello!", "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 8, "total_tokens": 18}
        }"#;
        let response: CompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.choices[0].text, " Hello!");
        assert_eq!(Usage::from(response.usage), Usage::new(10, 8));
    }

    #[test]
    fn test_stream_chunk_accessors() {
        let chunk: StreamChunk =
            serde_json::from_str(r#"{"choices":[{"text":"lo","finish_reason":null}]}"#).unwrap();
        assert_eq!(chunk.text(), Some("lo"));
        assert_eq!(chunk.finish_reason(), None);

        let chunk: StreamChunk =
            serde_json::from_str(r#"{"choices":[{"text":"","finish_reason":"stop"}]}"#).unwrap();
        assert_eq!(chunk.text(), None);
        assert_eq!(chunk.finish_reason(), Some("stop"));
    }
}
