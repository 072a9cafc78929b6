//! Request and response bodies shared by the client and the relay server.

use serde::{Deserialize, Serialize};

use crate::conversations::HistoryEntry;

/// Body of `POST /api/chat`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's message.
    pub message: String,
    /// Caller identity, if known.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Backend conversation id from a previous turn.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Recent messages, oldest first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl ChatRequest {
    /// Create a request with no context.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Set the caller identity.
    #[must_use]
    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Set the backend conversation id.
    #[must_use]
    pub fn with_conversation_id(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    /// Set the context messages.
    #[must_use]
    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }
}

/// Body of `POST /api/chat/sync`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SyncChatRequest {
    /// The user's message.
    pub message: String,
    /// Caller identity, if known.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Response of `POST /api/chat/sync`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SyncChatResponse {
    /// Whether the call succeeded.
    #[serde(default)]
    pub success: bool,
    /// Full reply text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Error text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One news entry.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawNewsItem")]
pub struct NewsItem {
    /// Headline.
    pub title: String,
    /// Body or summary text.
    pub content: String,
    /// Link to the full article.
    pub url: String,
}

/// Wire shape accepting either `content` or `summary`.
#[derive(Deserialize)]
struct RawNewsItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl From<RawNewsItem> for NewsItem {
    fn from(raw: RawNewsItem) -> Self {
        let content = raw
            .content
            .filter(|c| !c.is_empty())
            .or(raw.summary)
            .unwrap_or_default();
        Self {
            title: raw.title.unwrap_or_default(),
            content,
            url: raw.url.unwrap_or_default(),
        }
    }
}

/// Response of `GET /api/news`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewsResponse {
    /// Whether the call succeeded.
    #[serde(default)]
    pub success: bool,
    /// News entries.
    #[serde(default)]
    pub news: Vec<NewsItem>,
    /// Error text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Status value reported by a healthy backend.
pub const HEALTHY: &str = "healthy";

/// Response of `GET /api/health`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` when the service is up.
    #[serde(default)]
    pub status: String,
    /// Service name.
    #[serde(default)]
    pub service: String,
}
