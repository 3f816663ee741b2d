//! UI-agnostic conversation types
//!
//! These are shared by every front end and by the storage layer. The JSON
//! shape of [`ChatMessage`] is also the wire shape sent to Ollama, so a
//! stored transcript can be posted upstream as-is.

use serde::{Deserialize, Serialize};

/// A single chat message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    /// Label shown on rendered cards
    pub fn display_name(&self) -> &'static str {
        match self {
            ChatRole::User => "You",
            ChatRole::Assistant => "Ollama",
        }
    }
}

/// Ordered message history for one conversation.
///
/// Append-only: messages can be pushed but never edited, removed, or
/// reordered once they are in the transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
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

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl From<Vec<ChatMessage>> for Transcript {
    fn from(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }
}

/// Where messages sent from the input currently go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatTarget {
    /// A named tab backed by storage
    Tab(String),
    /// An ephemeral chat that is never persisted
    Temporary,
}

impl ChatTarget {
    pub fn tab_name(&self) -> Option<&str> {
        match self {
            ChatTarget::Tab(name) => Some(name),
            ChatTarget::Temporary => None,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, ChatTarget::Temporary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::user("Hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"Hi"}"#);
    }

    #[test]
    fn test_transcript_json_round_trip() {
        let mut transcript = Transcript::new();
        transcript.push(ChatMessage::user("مرحبا"));
        transcript.push(ChatMessage::assistant("**bold** \"quoted\" 'single'\nline two"));
        transcript.push(ChatMessage::user(""));

        let json = transcript.to_json().unwrap();
        assert_eq!(Transcript::from_json(&json).unwrap(), transcript);
    }

    #[test]
    fn test_push_keeps_prior_entries() {
        let mut transcript = Transcript::new();
        transcript.push(ChatMessage::user("first"));
        let before = transcript.messages().to_vec();

        transcript.push(ChatMessage::assistant("second"));

        assert_eq!(&transcript.messages()[..1], before.as_slice());
        assert_eq!(transcript.last(), Some(&ChatMessage::assistant("second")));
    }

    #[test]
    fn test_transcript_is_plain_array() {
        let transcript = Transcript::from_json(r#"[{"role":"assistant","content":"x"}]"#).unwrap();
        assert_eq!(transcript.messages(), &[ChatMessage::assistant("x")]);
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        assert!(Transcript::from_json(r#"[{"role":"system","content":"x"}]"#).is_err());
    }
}
