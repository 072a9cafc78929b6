//! Relay server for the chat client.
//!
//! Provides REST endpoints for:
//! - Streaming chat, re-framed from the upstream bot API
//! - Synchronous chat fallback
//! - News
//! - Health and usage statistics

pub mod config;
pub mod news;
pub mod routes;
pub mod state;
pub mod stats;
pub mod upstream;

pub use config::RelayConfig;
pub use routes::create_router;
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Router with CORS and request tracing.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn run_server(state: Arc<AppState>, port: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    run_server_with_shutdown(state, port, std::future::pending()).await
}

/// Start the HTTP server with graceful shutdown support.
///
/// The server will stop accepting new connections when `shutdown_signal` completes.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn run_server_with_shutdown<F>(
    state: Arc<AppState>,
    port: u16,
    shutdown_signal: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state, shutdown_signal).await
}

/// Serve on an already bound listener.
///
/// # Errors
/// Returns an error if serving fails.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown_signal: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!("streamchat relay listening on http://{}", listener.local_addr()?);
    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown_signal)
        .await?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::{HELLO_EXCHANGE, spawn_upstream, state};
    use super::*;
    use crate::client::{ChatClient, ClientConfig};
    use crate::conversations::{ConversationStore, MemoryStorage, Role};
    use crate::render::MarkdownRenderer;
    use crate::session::{ChatSession, ReplyView, SendOutcome};
    use axum::http::StatusCode;

    #[derive(Default)]
    struct Transcript {
        updates: Vec<String>,
        finished: Option<String>,
        errors: Vec<String>,
    }

    impl ReplyView for Transcript {
        fn update(&mut self, text: &str, _markup: &str) {
            self.updates.push(text.to_string());
        }

        fn finish(&mut self, _text: &str, markup: &str) {
            self.finished = Some(markup.to_string());
        }

        fn show_error(&mut self, message: &str, _retryable: bool) {
            self.errors.push(message.to_string());
        }
    }

    async fn spawn_relay(upstream_url: &str) -> String {
        let state = state(upstream_url, &std::env::temp_dir()).await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            serve(listener, state, std::future::pending()).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn session(relay_url: &str) -> ChatSession<ChatClient, MemoryStorage> {
        let client = ChatClient::new(ClientConfig::new().with_base_url(relay_url)).unwrap();
        let store = ConversationStore::load(MemoryStorage::new());
        ChatSession::new(client, store, MarkdownRenderer::new().unwrap())
    }

    #[tokio::test]
    async fn test_end_to_end_streaming() {
        let upstream = spawn_upstream(StatusCode::OK, HELLO_EXCHANGE).await;
        let relay = spawn_relay(&upstream).await;
        let mut session = session(&relay);
        let mut view = Transcript::default();

        let outcome = session.send_message("hi", &mut view).await;

        assert!(matches!(outcome, SendOutcome::Streamed));
        assert_eq!(view.updates.last().map(String::as_str), Some("**Hello**"));
        assert!(view.finished.unwrap().contains("<strong>Hello</strong>"));
        assert_eq!(session.store().external_session_id(), Some("up-1"));
        let current = session.store().current().unwrap();
        assert_eq!(current.messages[1].role, Role::Assistant);
        assert_eq!(current.messages[1].content, "**Hello**");
    }

    #[tokio::test]
    async fn test_end_to_end_health() {
        let upstream = spawn_upstream(StatusCode::OK, "").await;
        let relay = spawn_relay(&upstream).await;
        let client = ChatClient::new(ClientConfig::new().with_base_url(&relay)).unwrap();
        assert!(client.health_check().await);
    }

    #[tokio::test]
    async fn test_end_to_end_upstream_failure_surfaces_error() {
        let upstream = spawn_upstream(StatusCode::SERVICE_UNAVAILABLE, "down").await;
        let relay = spawn_relay(&upstream).await;
        let mut session = session(&relay);
        let mut view = Transcript::default();

        let outcome = session.send_message("hi", &mut view).await;

        assert!(matches!(outcome, SendOutcome::Failed(_)));
        assert_eq!(view.errors.len(), 1);
        assert!(view.finished.is_none());
    }
}
