//! Types for conversation history.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title given to a conversation until its first user message arrives.
pub const DEFAULT_TITLE: &str = "New chat";

/// Number of characters kept when deriving a title.
pub const TITLE_MAX_CHARS: usize = 20;

/// Author of a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// User input.
    User,
    /// Assistant reply.
    Assistant,
}

impl Role {
    /// Stable string form used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(value.to_string()),
        }
    }
}

/// A message in a conversation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author.
    pub role: Role,
    /// Plain text content.
    pub content: String,
    /// When the message was appended.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Build a message stamped with the current time.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A persisted conversation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Local identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Messages in append order.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Backend conversation id used to keep multi-turn context.
    #[serde(default)]
    pub external_session_id: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create an empty conversation with the placeholder title.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: format!("conv-{}", Uuid::new_v4().simple()),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            external_session_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the title is still the placeholder.
    #[must_use]
    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_TITLE
    }
}

/// Derive a conversation title from the first user message.
#[must_use]
pub fn derive_title(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// A `{role, content}` pair sent to the backend as context.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Author.
    pub role: Role,
    /// Message content.
    pub content: String,
}

impl From<&Message> for HistoryEntry {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Conversation summary for list display.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ConversationSummary {
    /// Local identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Number of messages.
    pub message_count: usize,
    /// Relative time of the last update.
    pub updated: String,
    /// Whether this is the current conversation.
    pub is_active: bool,
}
