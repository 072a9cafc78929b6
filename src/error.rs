//! Error types shared by the client, session and conversation store.

use thiserror::Error;

/// Errors that can occur while talking to the chat backend or persisting history.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Network failure before or during streaming.
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("HTTP error status {status}: {body}")]
    HttpStatus {
        /// Status code returned by the backend.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// Payload carried an explicit `error` field.
    #[error("backend error: {0}")]
    Protocol(String),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error from a storage backend.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `SQLite` error from the history database.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Storage backend refused the operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ChatError {
    /// Whether this error came from the transport and warrants the synchronous fallback.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::HttpStatus { .. })
    }
}

/// Convenience result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        let status = ChatError::HttpStatus {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert!(status.is_transport());
        assert!(!ChatError::Protocol("quota".to_string()).is_transport());
        assert!(!ChatError::Storage("full".to_string()).is_transport());
    }

    #[test]
    fn test_display_messages() {
        let err = ChatError::HttpStatus {
            status: 500,
            body: "oops".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error status 500: oops");
        assert_eq!(
            ChatError::Protocol("rate limited".to_string()).to_string(),
            "backend error: rate limited"
        );
    }
}
