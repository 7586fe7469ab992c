//! Conversation sessions
//!
//! A session keeps the user/assistant exchange across turns. Tool traffic
//! stays inside a turn and is not carried over.

use chrono::{DateTime, Local};
use tracing::debug;

use kaien_provider::{Message, Role};

pub const DEFAULT_MAX_MESSAGES: usize = 100;

/// History container for one conversation
#[derive(Debug, Clone)]
pub struct Session {
    /// Session id
    pub key: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
    max_messages: usize,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        Self::with_max_messages(key, DEFAULT_MAX_MESSAGES)
    }

    pub fn with_max_messages(key: impl Into<String>, max_messages: usize) -> Self {
        let now = Local::now();
        Self {
            key: key.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            max_messages,
        }
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Local::now();
        self.enforce_max_messages();
    }

    /// Record one completed exchange
    pub fn add_exchange(&mut self, user: impl Into<String>, reply: impl Into<String>) {
        self.add_message(Message::user(user));
        self.add_message(Message::assistant(reply));
    }

    fn enforce_max_messages(&mut self) {
        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(0..excess);
            debug!(
                "Session {} truncated to {} messages",
                self.key,
                self.messages.len()
            );
        }
    }

    /// The last `max_messages` messages, never starting on an assistant reply
    pub fn history(&self, max_messages: usize) -> Vec<Message> {
        let start = self.messages.len().saturating_sub(max_messages);
        let mut window = &self.messages[start..];
        while let Some(first) = window.first() {
            if first.role == Role::User {
                break;
            }
            window = &window[1..];
        }
        window.to_vec()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.updated_at = Local::now();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn set_max_messages(&mut self, max_messages: usize) {
        self.max_messages = max_messages;
        self.enforce_max_messages();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncates_oldest() {
        let mut session = Session::with_max_messages("cli:test", 4);
        for i in 0..3 {
            session.add_exchange(format!("q{}", i), format!("a{}", i));
        }
        assert_eq!(session.len(), 4);
        assert_eq!(session.messages[0].content, "q1");
    }

    #[test]
    fn test_history_window_starts_with_user() {
        let mut session = Session::new("cli:test");
        session.add_exchange("q0", "a0");
        session.add_exchange("q1", "a1");

        let history = session.history(3);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "q1");
        assert_eq!(history[0].role, Role::User);

        assert_eq!(session.history(100).len(), 4);
        assert!(session.history(0).is_empty());
    }

    #[test]
    fn test_set_max_messages_truncates() {
        let mut session = Session::new("s");
        session.add_exchange("q", "a");
        session.set_max_messages(1);
        assert_eq!(session.len(), 1);
        session.clear();
        assert!(session.is_empty());
    }
}
