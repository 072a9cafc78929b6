//! Configuration for the chat client.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::conversations::DEFAULT_HISTORY_WINDOW;
use crate::error::{ChatError, ChatResult};

/// Environment variable overriding the backend URL.
pub const BASE_URL_ENV: &str = "STREAMCHAT_BASE_URL";
/// Environment variable setting the caller identity.
pub const USER_ID_ENV: &str = "STREAMCHAT_USER_ID";
/// Environment variable overriding the history directory.
pub const DATA_DIR_ENV: &str = "STREAMCHAT_DATA_DIR";

/// File name of the history database inside the data directory.
pub const HISTORY_DB: &str = "history.db";

/// Default backend address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Configuration for [`super::ChatClient`] and the terminal client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend base URL, without the `/api` suffix.
    pub base_url: String,
    /// Caller identity sent with each request.
    pub user_id: Option<String>,
    /// Directory holding the persisted history.
    pub data_dir: PathBuf,
    /// Timeout for non-streaming requests.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Connection timeout.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
    /// Number of recent messages sent as context.
    pub history_window: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_id: None,
            data_dir: PathBuf::from(".streamchat"),
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }
}

impl ClientConfig {
    /// Create a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `STREAMCHAT_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            config.base_url = url;
        }
        config.user_id = std::env::var(USER_ID_ENV).ok().filter(|id| !id.is_empty());
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        config
    }

    /// Set the backend URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the caller identity.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the history directory.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the timeout for non-streaming requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if the base URL is not an absolute URL or the
    /// history window is zero.
    pub fn validate(&self) -> ChatResult<()> {
        Url::parse(&self.base_url)
            .map_err(|e| ChatError::Config(format!("base_url {:?}: {e}", self.base_url)))?;
        if self.history_window == 0 {
            return Err(ChatError::Config("history_window must be > 0".to_string()));
        }
        Ok(())
    }

    /// Build an endpoint URL from a path such as `/api/chat`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    /// Path of the history database.
    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(HISTORY_DB)
    }
}

/// Serde module for Duration serialization as whole seconds.
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
