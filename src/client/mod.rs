//! HTTP client for the chat backend.
//!
//! Provides:
//! - Streaming chat (`POST /api/chat`)
//! - Synchronous chat fallback (`POST /api/chat/sync`)
//! - News list (`GET /api/news`)
//! - Health check (`GET /api/health`)

pub mod config;

pub use config::ClientConfig;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{ChatError, ChatResult};
use crate::protocol::{
    ChatRequest, HEALTHY, HealthResponse, NewsItem, NewsResponse, SyncChatRequest,
    SyncChatResponse,
};
use crate::stream::{BoxEventStream, EventStream};

/// Backend operations a chat session depends on.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open a streaming reply.
    ///
    /// # Errors
    /// Returns a transport error if the request fails or the status is not a success.
    async fn stream_chat(&self, request: &ChatRequest) -> ChatResult<BoxEventStream>;

    /// Request a complete reply in one response.
    ///
    /// # Errors
    /// Returns a transport error on network failure and a protocol error if
    /// the backend reports one.
    async fn send_chat(&self, message: &str, user_id: Option<&str>) -> ChatResult<String>;
}

/// reqwest-based client for the chat backend.
#[derive(Clone, Debug)]
pub struct ChatClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl ChatClient {
    /// Create a client.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: ClientConfig) -> ChatResult<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;
        Ok(Self { config, http })
    }

    /// Client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open the streaming endpoint and decode its events.
    ///
    /// # Errors
    /// Returns an error if the request fails or the status is not a success.
    pub async fn open_stream(
        &self,
        request: &ChatRequest,
    ) -> ChatResult<EventStream<crate::stream::ByteStream>> {
        let url = self.config.endpoint("/api/chat");
        debug!(
            "POST {url} (history: {}, conversation: {:?})",
            request.history.len(),
            request.conversation_id
        );

        let response = self.http.post(&url).json(request).send().await?;
        let response = ensure_success(response).await?;
        Ok(EventStream::from_response(response))
    }

    /// Fetch the news list.
    ///
    /// # Errors
    /// Returns an error on transport failure or if the backend reports one.
    pub async fn get_news(&self) -> ChatResult<Vec<NewsItem>> {
        let url = self.config.endpoint("/api/news");
        let response = self
            .http
            .get(&url)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        let body: NewsResponse = ensure_success(response).await?.json().await?;
        if let Some(error) = body.error {
            return Err(ChatError::Protocol(error));
        }
        Ok(body.news)
    }

    /// Whether the backend reports itself healthy. Any failure counts as down.
    pub async fn health_check(&self) -> bool {
        let url = self.config.endpoint("/api/health");
        let result = async {
            let response = self
                .http
                .get(&url)
                .timeout(self.config.request_timeout)
                .send()
                .await?;
            response.json::<HealthResponse>().await
        }
        .await;

        match result {
            Ok(health) => health.status == HEALTHY,
            Err(e) => {
                warn!("Health check failed: {e}");
                false
            }
        }
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn stream_chat(&self, request: &ChatRequest) -> ChatResult<BoxEventStream> {
        let stream = self.open_stream(request).await?;
        Ok(Box::pin(stream))
    }

    async fn send_chat(&self, message: &str, user_id: Option<&str>) -> ChatResult<String> {
        let url = self.config.endpoint("/api/chat/sync");
        let request = SyncChatRequest {
            message: message.to_string(),
            user_id: user_id.map(str::to_string),
        };
        let response = self
            .http
            .post(&url)
            .timeout(self.config.request_timeout)
            .json(&request)
            .send()
            .await?;
        let body: SyncChatResponse = ensure_success(response).await?.json().await?;
        if let Some(error) = body.error {
            return Err(ChatError::Protocol(error));
        }
        Ok(body.response.unwrap_or_default())
    }
}

/// Turn a non-success status into [`ChatError::HttpStatus`].
async fn ensure_success(response: reqwest::Response) -> ChatResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!("HTTP error {status}: {body}");
    Err(ChatError::HttpStatus {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        assert!(ChatClient::new(ClientConfig::default()).is_ok());
        assert!(ChatClient::new(ClientConfig::new().with_base_url("not a url")).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let client = ChatClient::new(ClientConfig::new().with_base_url("http://127.0.0.1:9")).unwrap();
        let err = client.send_chat("hi", None).await.unwrap_err();
        assert!(err.is_transport());
        assert!(!client.health_check().await);
    }
}
