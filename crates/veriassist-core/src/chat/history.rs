use crate::backend::{ChatMessage, Role};

/// Ordered conversation of one session.
///
/// Only grows, except for [`clear`](Self::clear) which empties it entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    messages: Vec<ChatMessage>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.messages.iter().map(|m| m.role)
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn grows_in_order_and_clears() {
        let mut history = History::new();
        history.push_user("q");
        history.push_assistant("a");
        assert_eq!(history.roles().collect::<Vec<_>>(), [Role::User, Role::Assistant]);
        assert_eq!(history.last().map(|m| m.content.as_str()), Some("a"));

        history.clear();
        assert!(history.is_empty());
        history.clear();
        assert_eq!(history.len(), 0);
    }
}
