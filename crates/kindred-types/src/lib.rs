//! Shared types for the Kindred workspace.
//!
//! This crate provides the data model every other crate speaks: the
//! [`Friend`] persona and its message history, account statistics, the
//! conversation status reported to the UI, the voice catalog, and the rate
//! limit policy. It deliberately has no I/O so that both the server and the
//! client-side conversation driver can depend on it.

use serde::{Deserialize, Serialize};

mod policy;
pub mod voice;

pub use policy::{RateLimitPolicy, WindowQuota};
pub use voice::Gender;

/// Who wrote a line of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The human talking to their friend.
    User,
    /// The generated friend.
    Friend,
}

impl MessageRole {
    /// Returns the lowercase label stored in the database and sent over the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Friend => "friend",
        }
    }

    /// Parses a stored label.
    ///
    /// Returns `None` for anything other than `user` or `friend`.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "user" => Some(Self::User),
            "friend" => Some(Self::Friend),
            _ => None,
        }
    }
}

/// One line of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub message: String,
}

impl ChatMessage {
    pub fn user(message: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            message: message.into(),
        }
    }

    pub fn friend(message: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Friend,
            message: message.into(),
        }
    }
}

/// The persisted AI persona a user talks to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Friend {
    /// Public identifier (UUID v4).
    pub id: String,
    /// First name only.
    pub name: String,
    /// Two or three sentence personality description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Durable URL of the profile image.
    pub image_url: String,
    /// Speech synthesis voice model identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// Conversation history, oldest first.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Returns `true` if `messages` is a well-formed conversation history.
///
/// A well-formed history has even length and strictly alternates
/// `user, friend, user, friend, ...`.
pub fn is_alternating_history(messages: &[ChatMessage]) -> bool {
    messages.len() % 2 == 0
        && messages.chunks(2).all(|pair| {
            pair[0].role == MessageRole::User && pair[1].role == MessageRole::Friend
        })
}

/// Per-account usage totals shown on the account screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStats {
    pub total_messages: u64,
    pub total_friends: u64,
}

/// Status of a conversation as reported to the UI.
///
/// Exactly one status exists per active conversation session. It is never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
    Error,
}
