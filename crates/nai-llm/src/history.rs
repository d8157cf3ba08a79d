use crate::types::{Message, Role};
use serde::{Deserialize, Serialize};

/// Ordered, linear conversation history.
///
/// Entries are only ever appended, except that two trailing assistant turns
/// produced by a continuation can be folded into one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message::new(role, content));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Fold trailing assistant turns produced by continuation into one.
    ///
    /// Fires only when the last two entries are both assistant turns. The
    /// earlier text loses its trailing whitespace, the later one is trimmed on
    /// both sides, and they are joined with no separator. A longer trailing
    /// run is folded the same way, left to right, so the operation is
    /// idempotent. Returns whether a merge happened.
    pub fn merge_trailing_assistant_pair(&mut self) -> bool {
        let run = self
            .messages
            .iter()
            .rev()
            .take_while(|m| m.is_assistant())
            .count();
        if run < 2 {
            return false;
        }

        let tail = self.messages.split_off(self.messages.len() - run + 1);
        if let Some(head) = self.messages.last_mut() {
            for later in tail {
                let kept = head.content.trim_end().len();
                head.content.truncate(kept);
                head.content.push_str(later.content.trim());
            }
        }
        true
    }
}

impl From<Vec<Message>> for History {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}
