use crate::prompt::PromptTemplate;
use crate::think::ThinkModePolicy;
use serde::{Deserialize, Serialize};

/// Generation parameters for a conversation.
///
/// Numeric fields left at zero are not sent, so the server-side default
/// applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Model to use for generation (e.g. "glm-4-6")
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Nucleus sampling
    pub top_p: f32,
    pub top_k: u32,
    pub min_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub repetition_penalty: f32,
    pub stop_sequences: Vec<String>,
    /// Enables the model's extended reasoning phase
    pub thinking: bool,
    /// Falls back to [`ThinkModePolicy::GLM46`] when unset
    pub think_mode: Option<ThinkModePolicy>,
    pub template: PromptTemplate,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "glm-4-6".to_string(),
            max_tokens: 2048,
            temperature: 1.0,
            top_p: 0.0,
            top_k: 0,
            min_p: 0.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            repetition_penalty: 0.0,
            stop_sequences: vec!["<|user|>".to_string(), "<|system|>".to_string()],
            thinking: false,
            think_mode: Some(ThinkModePolicy::GLM46),
            template: PromptTemplate::GLM4,
        }
    }
}

impl GenerationSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Policy to use for this call; unset resolves to GLM-4.6
    pub fn effective_think_mode(&self) -> &ThinkModePolicy {
        const FALLBACK: &ThinkModePolicy = &ThinkModePolicy::GLM46;
        self.think_mode.as_ref().unwrap_or(FALLBACK)
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_thinking(mut self, enabled: bool) -> Self {
        self.thinking = enabled;
        self
    }

    pub fn with_think_mode(mut self, policy: ThinkModePolicy) -> Self {
        self.think_mode = Some(policy);
        self
    }

    pub fn with_stop_sequences(mut self, stops: Vec<String>) -> Self {
        self.stop_sequences = stops;
        self
    }
}
