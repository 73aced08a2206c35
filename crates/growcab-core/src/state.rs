//! UI-agnostic conversation types
//!
//! Shared between the streaming chat reader and whichever front end renders the
//! conversation. Messages serialize exactly as the chat endpoint expects them.

use serde::{Deserialize, Serialize};

pub const ASSISTANT_GREETING: &str = "Let's grow something together! 🌱 Tell me what you'd like to plant or pick a crop to see its ideal cabinet settings.";

/// A chat message in the assistant conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// Ordered message history. Append-only, except that streamed assistant text
/// extends the trailing assistant message in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// A conversation opened by the assistant greeting.
    pub fn with_greeting() -> Self {
        let mut conversation = Self::new();
        conversation.push(ChatMessage::assistant(ASSISTANT_GREETING));
        conversation
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
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

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::user(content));
    }

    /// Append a streamed fragment. Extends the last message when it is an
    /// assistant message, otherwise starts a new one.
    pub fn append_assistant_delta(&mut self, delta: &str) -> &ChatMessage {
        match self.messages.last_mut() {
            Some(last) if last.role == ChatRole::Assistant => last.content.push_str(delta),
            _ => self.messages.push(ChatMessage::assistant(delta)),
        }
        // Non-empty by construction
        &self.messages[self.messages.len() - 1]
    }
}
