//! Relay server configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::client::config::duration_serde;
use crate::conversations::DEFAULT_HISTORY_WINDOW;
use crate::error::{ChatError, ChatResult};

/// Environment variable overriding the upstream bot API.
pub const UPSTREAM_URL_ENV: &str = "STREAMCHAT_UPSTREAM_URL";
/// Environment variable holding the upstream bearer token.
pub const ACCESS_TOKEN_ENV: &str = "STREAMCHAT_ACCESS_TOKEN";
/// Environment variable holding the upstream bot id.
pub const BOT_ID_ENV: &str = "STREAMCHAT_BOT_ID";
/// Environment variable overriding the statistics database path.
pub const STATS_DB_ENV: &str = "STREAMCHAT_STATS_DB";

/// Default upstream bot API.
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.coze.cn";

/// Message that makes the upstream bot answer with its news card.
pub const DEFAULT_NEWS_PROMPT: &str = "最新新闻";

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Upstream bot API base URL.
    pub upstream_url: String,
    /// Bearer token for the upstream API.
    #[serde(skip_serializing, default)]
    pub access_token: String,
    /// Upstream bot id.
    pub bot_id: String,
    /// Number of history entries forwarded upstream.
    pub history_window: usize,
    /// Total timeout for buffered upstream calls, and the longest a streamed
    /// reply may stall between chunks.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// `SQLite` file holding visit and call counters.
    pub stats_db: PathBuf,
    /// Directory served at `/`.
    pub static_dir: PathBuf,
    /// Message sent upstream to fetch the news list.
    pub news_prompt: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            access_token: String::new(),
            bot_id: String::new(),
            history_window: DEFAULT_HISTORY_WINDOW,
            request_timeout: Duration::from_secs(120),
            stats_db: PathBuf::from("data/stats.db"),
            static_dir: PathBuf::from("static"),
            news_prompt: DEFAULT_NEWS_PROMPT.to_string(),
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by `STREAMCHAT_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(UPSTREAM_URL_ENV) {
            config.upstream_url = url;
        }
        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            config.access_token = token;
        }
        if let Ok(bot_id) = std::env::var(BOT_ID_ENV) {
            config.bot_id = bot_id;
        }
        if let Ok(path) = std::env::var(STATS_DB_ENV) {
            config.stats_db = PathBuf::from(path);
        }
        config
    }

    /// Set the upstream URL.
    #[must_use]
    pub fn with_upstream_url(mut self, url: impl Into<String>) -> Self {
        self.upstream_url = url.into();
        self
    }

    /// Set the upstream credentials.
    #[must_use]
    pub fn with_credentials(mut self, access_token: impl Into<String>, bot_id: impl Into<String>) -> Self {
        self.access_token = access_token.into();
        self.bot_id = bot_id.into();
        self
    }

    /// Set the upstream timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the static file directory.
    #[must_use]
    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = dir.into();
        self
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if the upstream URL is not absolute or the history
    /// window is zero.
    pub fn validate(&self) -> ChatResult<()> {
        Url::parse(&self.upstream_url)
            .map_err(|e| ChatError::Config(format!("upstream_url {:?}: {e}", self.upstream_url)))?;
        if self.history_window == 0 {
            return Err(ChatError::Config("history_window must be > 0".to_string()));
        }
        if self.access_token.is_empty() {
            tracing::warn!("{ACCESS_TOKEN_ENV} is not set; upstream calls will be rejected");
        }
        Ok(())
    }

    /// Upstream chat endpoint.
    #[must_use]
    pub fn chat_endpoint(&self) -> String {
        format!("{}/v3/chat", self.upstream_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_relay_config() {
        let config = RelayConfig::default();
        assert_eq!(config.chat_endpoint(), "https://api.coze.cn/v3/chat");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_token_is_not_serialized() {
        let config = RelayConfig::default().with_credentials("secret", "bot-1");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("bot-1"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(RelayConfig::default().with_upstream_url("nope").validate().is_err());
        let mut config = RelayConfig::default();
        config.history_window = 0;
        assert!(config.validate().is_err());
    }
}
