//! Append-only chat log with fragment coalescing
//!
//! User messages are immutable once appended. The most recent assistant
//! message stays "open" while its reply streams in: each incoming fragment
//! is appended in place. Appending a user message, or transport closure,
//! closes it. Reply text is sanitized before it becomes renderable content;
//! it comes from an external, partially trusted service.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sender {
    User,
    Assistant,
}

/// One entry in the chat log
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Message identifier
    pub id: Uuid,

    /// Who sent it
    pub sender: Sender,

    /// Display text (already sanitized for assistant messages)
    pub text: String,

    /// When the message was created
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn new(sender: Sender, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            text,
            timestamp: Utc::now(),
        }
    }
}

/// Ordered chat history
#[derive(Debug, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
    assistant_open: bool,
}

impl ChatLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an immutable user message; closes any open assistant message
    pub fn push_user(&mut self, text: impl Into<String>) -> &ChatMessage {
        self.assistant_open = false;
        self.messages.push(ChatMessage::new(Sender::User, text.into()));
        self.messages.last().expect("just pushed")
    }

    /// Coalesce one raw reply fragment into the log
    ///
    /// Appends to the open assistant message when it is the most recent
    /// entry, otherwise opens a new assistant message. The fragment is
    /// sanitized here, before it can reach any rendering surface.
    pub fn append_assistant_fragment(&mut self, raw_fragment: &str) -> &ChatMessage {
        let fragment = sanitize(raw_fragment);

        let coalesce = self.assistant_open
            && self
                .messages
                .last()
                .is_some_and(|m| m.sender == Sender::Assistant);

        if coalesce {
            let last = self.messages.last_mut().expect("checked above");
            last.text.push_str(&fragment);
        } else {
            self.assistant_open = true;
            self.messages
                .push(ChatMessage::new(Sender::Assistant, fragment));
        }

        self.messages.last().expect("log is non-empty")
    }

    /// Append a transport failure as an assistant-attributed error line
    pub fn push_assistant_error(&mut self, message: impl std::fmt::Display) -> &ChatMessage {
        self.assistant_open = false;
        self.messages.push(ChatMessage::new(
            Sender::Assistant,
            format!("Sorry, something went wrong: {message}"),
        ));
        self.messages.last().expect("just pushed")
    }

    /// Close the open assistant message; later fragments start a new one
    pub fn close_assistant(&mut self) {
        self.assistant_open = false;
    }

    /// Whether an assistant message is currently accepting fragments
    #[must_use]
    pub const fn assistant_open(&self) -> bool {
        self.assistant_open
    }

    /// All messages, oldest first
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Most recent message, if any
    #[must_use]
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

/// Escape HTML-significant characters so external reply text is inert when
/// rendered as markup
#[must_use]
pub fn sanitize(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
