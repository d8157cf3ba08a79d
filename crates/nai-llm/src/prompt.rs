// Flat prompt construction for completion-style endpoints

use crate::think::ThinkModePolicy;
use crate::types::{Message, Role};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Structural delimiters of a model family's chat template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Emitted once at the very start of the prompt
    pub prefix: Cow<'static, str>,
    pub system: Cow<'static, str>,
    pub user: Cow<'static, str>,
    pub assistant: Cow<'static, str>,
}

impl PromptTemplate {
    /// GLM-4 family special tokens
    pub const GLM4: Self = Self {
        prefix: Cow::Borrowed("[gMASK]<sop>"),
        system: Cow::Borrowed("<|system|>"),
        user: Cow::Borrowed("<|user|>"),
        assistant: Cow::Borrowed("<|assistant|>"),
    };

    fn marker(&self, role: Role) -> &str {
        match role {
            Role::System => self.system.as_ref(),
            Role::User => self.user.as_ref(),
            Role::Assistant => self.assistant.as_ref(),
        }
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::GLM4
    }
}

/// Renders a system prompt plus history into a single prompt string.
///
/// Pure: no I/O, and identical inputs always give an identical string.
#[derive(Debug, Clone, Copy)]
pub struct PromptFormatter<'a> {
    template: &'a PromptTemplate,
    think_mode: &'a ThinkModePolicy,
    thinking: bool,
}

impl<'a> PromptFormatter<'a> {
    pub fn new(template: &'a PromptTemplate, think_mode: &'a ThinkModePolicy, thinking: bool) -> Self {
        Self {
            template,
            think_mode,
            thinking,
        }
    }

    pub fn format(&self, system: &str, messages: &[Message]) -> String {
        let mut out = String::with_capacity(
            self.template.prefix.len()
                + system.len()
                + messages.iter().map(|m| m.content.len() + 16).sum::<usize>()
                + 64,
        );

        out.push_str(&self.template.prefix);

        if !system.is_empty() {
            self.push_turn(&mut out, Role::System, system, None);
        }

        let last = messages.len().checked_sub(1);
        for (i, msg) in messages.iter().enumerate() {
            // Only a user turn that is still the final entry gets the suffix;
            // a continuation after an assistant turn must not re-frame it.
            let suffix = (!self.thinking && msg.role == Role::User && Some(i) == last)
                .then_some(self.think_mode.user_suffix.as_ref());
            self.push_turn(&mut out, msg.role, &msg.content, suffix);
        }

        out.push_str(&self.template.assistant);
        out.push('\n');

        if !self.thinking {
            out.push_str(&self.think_mode.assistant_prefix);
        }

        out
    }

    fn push_turn(&self, out: &mut String, role: Role, content: &str, suffix: Option<&str>) {
        out.push_str(self.template.marker(role));
        out.push('\n');
        out.push_str(content);
        if let Some(suffix) = suffix {
            out.push_str(suffix);
        }
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(system: &str, messages: &[Message], policy: &ThinkModePolicy, thinking: bool) -> String {
        PromptFormatter::new(&PromptTemplate::GLM4, policy, thinking).format(system, messages)
    }

    #[test]
    fn test_exact_layout_thinking_enabled() {
        let messages = vec![
            Message::user("Hi"),
            Message::assistant("Hello!"),
            Message::user("How are you?"),
        ];
        let prompt = format("sys", &messages, &ThinkModePolicy::GLM46, true);
        assert_eq!(
            prompt,
            "[gMASK]<sop><|system|>\nsys\n<|user|>\nHi\n<|assistant|>\nHello!\n<|user|>\nHow are you?\n<|assistant|>\n"
        );
    }

    #[test]
    fn test_exact_layout_thinking_disabled() {
        let messages = vec![Message::user("Hello")];
        let prompt = format("sys", &messages, &ThinkModePolicy::GLM46, false);
        assert_eq!(
            prompt,
            "[gMASK]<sop><|system|>\nsys\n<|user|>\nHello/nothink\n<|assistant|>\n<think></think>\n"
        );
    }

    #[test]
    fn test_suffix_and_prefix_appear_once() {
        let policy = ThinkModePolicy::custom("/nothink", "</think>\n");
        let messages = vec![Message::user("Hello")];

        let disabled = format("sys", &messages, &policy, false);
        assert_eq!(disabled.matches("/nothink").count(), 1);
        assert_eq!(disabled.matches("</think>").count(), 1);

        let enabled = format("sys", &messages, &policy, true);
        assert!(!enabled.contains("/nothink"));
        assert!(!enabled.contains("</think>"));
    }

    #[test]
    fn test_no_suffix_when_assistant_is_last() {
        let messages = vec![Message::user("Write a story"), Message::assistant("Once upon")];
        let prompt = format("", &messages, &ThinkModePolicy::GLM47, false);
        assert!(!prompt.contains("/nothink"));
        assert!(prompt.ends_with("<|assistant|>\n</think>"));
    }

    #[test]
    fn test_suffix_only_on_final_user_turn() {
        let messages = vec![
            Message::user("first"),
            Message::assistant("reply"),
            Message::user("second"),
        ];
        let prompt = format("", &messages, &ThinkModePolicy::GLM46, false);
        assert_eq!(prompt.matches("/nothink").count(), 1);
        assert!(prompt.contains("second/nothink\n"));
        assert!(prompt.contains("first\n"));
    }

    #[test]
    fn test_empty_system_prompt_is_skipped() {
        let prompt = format("", &[Message::user("x")], &ThinkModePolicy::NONE, false);
        assert!(!prompt.contains("<|system|>"));
        assert!(prompt.starts_with("[gMASK]<sop><|user|>\n"));
    }

    #[test]
    fn test_mid_history_system_turns_each_delimited() {
        let messages = vec![
            Message::user("a"),
            Message::system("note one"),
            Message::system("note two"),
        ];
        let prompt = format("sys", &messages, &ThinkModePolicy::NONE, true);
        assert_eq!(prompt.matches("<|system|>").count(), 3);
        assert!(prompt.contains("<|system|>\nnote one\n<|system|>\nnote two\n"));
    }

    #[test]
    fn test_deterministic() {
        let messages = vec![Message::user("same")];
        let a = format("s", &messages, &ThinkModePolicy::GLM46, false);
        let b = format("s", &messages, &ThinkModePolicy::GLM46, false);
        assert_eq!(a, b);
    }

    #[test]
    fn test_custom_template() {
        let template = PromptTemplate {
            prefix: Cow::Borrowed("<s>"),
            system: Cow::Borrowed("[SYS]"),
            user: Cow::Borrowed("[U]"),
            assistant: Cow::Borrowed("[A]"),
        };
        let prompt = PromptFormatter::new(&template, &ThinkModePolicy::NONE, false)
            .format("rules", &[Message::user("q")]);
        assert_eq!(prompt, "<s>[SYS]\nrules\n[U]\nq\n[A]\n");
    }
}
