use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// How "disable extended reasoning" is spelled for a model family.
///
/// When reasoning is disabled, `user_suffix` is appended to the final user
/// turn and `assistant_prefix` prefills the assistant turn so the model skips
/// its thinking phase. Both are ignored when reasoning is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkModePolicy {
    #[serde(default)]
    pub user_suffix: Cow<'static, str>,
    #[serde(default)]
    pub assistant_prefix: Cow<'static, str>,
}

impl ThinkModePolicy {
    /// GLM-4.6: `/nothink` plus an empty think block
    pub const GLM46: Self = Self {
        user_suffix: Cow::Borrowed("/nothink"),
        assistant_prefix: Cow::Borrowed("<think></think>\n"),
    };

    /// GLM-4.7: `/nothink` plus a bare closing tag
    pub const GLM47: Self = Self {
        user_suffix: Cow::Borrowed("/nothink"),
        assistant_prefix: Cow::Borrowed("</think>"),
    };

    /// Models without a reasoning phase
    pub const NONE: Self = Self {
        user_suffix: Cow::Borrowed(""),
        assistant_prefix: Cow::Borrowed(""),
    };

    pub fn custom(user_suffix: impl Into<String>, assistant_prefix: impl Into<String>) -> Self {
        Self {
            user_suffix: Cow::Owned(user_suffix.into()),
            assistant_prefix: Cow::Owned(assistant_prefix.into()),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.user_suffix.is_empty() && self.assistant_prefix.is_empty()
    }
}

impl Default for ThinkModePolicy {
    fn default() -> Self {
        Self::GLM46
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_policies() {
        assert_eq!(ThinkModePolicy::GLM46.user_suffix, "/nothink");
        assert_eq!(ThinkModePolicy::GLM46.assistant_prefix, "<think></think>\n");
        assert_eq!(ThinkModePolicy::GLM47.user_suffix, "/nothink");
        assert_eq!(ThinkModePolicy::GLM47.assistant_prefix, "</think>");
        assert!(ThinkModePolicy::NONE.is_noop());
        assert!(!ThinkModePolicy::GLM47.is_noop());
    }

    #[test]
    fn test_default_is_glm46() {
        assert_eq!(ThinkModePolicy::default(), ThinkModePolicy::GLM46);
    }

    #[test]
    fn test_custom_from_toml_style_json() {
        let policy: ThinkModePolicy =
            serde_json::from_str(r#"{"user_suffix":"/custom","assistant_prefix":"<custom/>"}"#)
                .unwrap();
        assert_eq!(policy, ThinkModePolicy::custom("/custom", "<custom/>"));
    }
}
