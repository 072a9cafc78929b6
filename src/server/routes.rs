//! HTTP route handlers for the relay.

use std::collections::hash_map::DefaultHasher;
use std::convert::Infallible;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt, stream};
use serde_json::{Value, json};
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::error::ChatError;
use crate::protocol::{
    ChatRequest, HEALTHY, HealthResponse, NewsResponse, SyncChatRequest, SyncChatResponse,
};
use crate::stream::ByteStream;

use super::news::parse_news_response;
use super::state::AppState;
use super::stats::StatsSnapshot;
use super::upstream::{DONE_FRAME, RelayTranslator, UpstreamClient, UpstreamRequest, encode_frame};

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");

/// Identity used for news requests.
const NEWS_USER_ID: &str = "news_fetcher";

const EMPTY_MESSAGE: &str = "message must not be empty";

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "error": message })))
}

/// Create the router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health_check))
        .route("/api/chat", post(chat_stream))
        .route("/api/chat/sync", post(chat_sync))
        .route("/api/news", get(news))
        .route("/api/stats", get(stats))
        .fallback(static_or_not_found)
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HEALTHY.to_string(),
        service: SERVICE_NAME.to_string(),
    })
}

/// Unknown `/api/` paths get a JSON 404; everything else is a static file.
async fn static_or_not_found(State(state): State<Arc<AppState>>, request: Request) -> Response {
    if request.uri().path().starts_with("/api/") {
        return api_error(StatusCode::NOT_FOUND, "Not found").into_response();
    }
    match ServeDir::new(&state.config.static_dir).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

/// Serve `index.html` and count the visit.
async fn index(State(state): State<Arc<AppState>>) -> Response {
    if let Err(e) = state.stats.record_visit().await {
        warn!("Failed to record visit: {e}");
    }
    let path = state.config.static_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            warn!("Cannot read {}: {e}", path.display());
            (StatusCode::NOT_FOUND, "index.html not found").into_response()
        }
    }
}

/// Usage statistics.
async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsSnapshot>, ApiError> {
    state.stats.snapshot().await.map(Json).map_err(|e| {
        warn!("Failed to read stats: {e}");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "statistics unavailable")
    })
}

async fn count_api_call(state: &AppState) {
    if let Err(e) = state.stats.record_api_call().await {
        warn!("Failed to record API call: {e}");
    }
}

/// Caller identity: the requested one, else derived from the client address.
fn resolve_user_id(headers: &HeaderMap, requested: Option<String>) -> String {
    requested
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| default_user_id(headers))
}

/// `web_user_` followed by 8 hex digits of a hash of the client address.
fn default_user_id(headers: &HeaderMap) -> String {
    let addr = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("local");

    let mut hasher = DefaultHasher::new();
    addr.hash(&mut hasher);
    let digest = format!("{:016x}", hasher.finish());
    format!("web_user_{}", &digest[8..])
}

/// Streaming chat: forwards upstream and re-frames its records.
async fn chat_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    if request.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, EMPTY_MESSAGE));
    }
    count_api_call(&state).await;

    let user_id = resolve_user_id(&headers, request.user_id.clone());
    let upstream_request = UpstreamRequest::chat(&state.config, &request, user_id);
    info!(
        "Chat from {} (history: {}, conversation: {:?})",
        upstream_request.user_id,
        request.history.len(),
        upstream_request.conversation_id
    );

    let body = Body::from_stream(relay_frames(state.upstream.clone(), upstream_request));
    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response())
}

enum RelayState {
    Connect(UpstreamClient, UpstreamRequest),
    Streaming(ByteStream, RelayTranslator),
    Finished,
}

fn encode_all(payloads: &[Value]) -> String {
    payloads.iter().map(encode_frame).collect()
}

/// Client frame describing an upstream failure.
fn error_frame(error: &ChatError) -> String {
    let payload = match error {
        ChatError::HttpStatus { status, .. } => {
            json!({ "error": "upstream request failed", "status": status })
        }
        ChatError::Transport(e) if e.is_timeout() => {
            json!({ "error": "request timed out, please retry" })
        }
        other => json!({ "error": other.to_string() }),
    };
    encode_frame(&payload)
}

/// Client frames for one upstream exchange, ending with `[DONE]` unless it fails.
fn relay_frames(
    client: UpstreamClient,
    request: UpstreamRequest,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    stream::unfold(RelayState::Connect(client, request), |state| async move {
        let (frames, next) = match state {
            RelayState::Connect(client, request) => match client.open(&request).await {
                Ok(response) => (
                    String::new(),
                    RelayState::Streaming(Box::pin(response.bytes_stream()), RelayTranslator::new()),
                ),
                Err(e) => {
                    warn!("Upstream request failed: {e}");
                    (error_frame(&e), RelayState::Finished)
                }
            },
            RelayState::Streaming(mut body, mut translator) => match body.next().await {
                Some(Ok(chunk)) => {
                    let frames = encode_all(&translator.push(&chunk));
                    (frames, RelayState::Streaming(body, translator))
                }
                Some(Err(e)) => {
                    warn!("Upstream stream failed: {e}");
                    (error_frame(&ChatError::Transport(e)), RelayState::Finished)
                }
                None => {
                    let mut frames = encode_all(&translator.finish());
                    frames.push_str(DONE_FRAME);
                    (frames, RelayState::Finished)
                }
            },
            RelayState::Finished => return None,
        };
        Some((Ok(Bytes::from(frames)), next))
    })
}

/// Map an upstream failure on a buffered endpoint to a response.
fn upstream_error(error: &ChatError) -> ApiError {
    warn!("Upstream request failed: {error}");
    match error {
        ChatError::HttpStatus { status, .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "upstream request failed", "status": status })),
        ),
        ChatError::Transport(e) if e.is_timeout() => {
            api_error(StatusCode::GATEWAY_TIMEOUT, "request timed out, please retry")
        }
        other => api_error(StatusCode::INTERNAL_SERVER_ERROR, &other.to_string()),
    }
}

/// Synchronous chat: collects the whole answer.
async fn chat_sync(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SyncChatRequest>,
) -> Result<Json<SyncChatResponse>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, EMPTY_MESSAGE));
    }
    count_api_call(&state).await;

    let user_id = resolve_user_id(&headers, request.user_id);
    let upstream_request = UpstreamRequest::single(&state.config, user_id, request.message, true);
    let collector = state
        .upstream
        .collect(&upstream_request)
        .await
        .map_err(|e| upstream_error(&e))?;

    Ok(Json(SyncChatResponse {
        success: true,
        response: Some(collector.delta_text().to_string()),
        error: None,
    }))
}

/// News list from the upstream bot.
async fn news(State(state): State<Arc<AppState>>) -> Result<Json<NewsResponse>, ApiError> {
    let upstream_request = UpstreamRequest::single(
        &state.config,
        NEWS_USER_ID,
        state.config.news_prompt.clone(),
        false,
    );
    let collector = state
        .upstream
        .collect(&upstream_request)
        .await
        .map_err(|e| upstream_error(&e))?;

    let news = parse_news_response(&collector.into_answer());
    info!("Fetched {} news items", news.len());
    Ok(Json(NewsResponse {
        success: true,
        news,
        error: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::testing::{HELLO_EXCHANGE, spawn_upstream, state};
    use axum::http::Request;

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn temp_static_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("streamchat-static-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.html"), "<h1>chat</h1>").unwrap();
        std::fs::write(dir.join("app.js"), "console.log(1);").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_router(state("http://127.0.0.1:9", &std::env::temp_dir()).await);
        let (status, body) = call(app, get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        let health: HealthResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(health.status, HEALTHY);
        assert_eq!(health.service, SERVICE_NAME);
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let app = create_router(state("http://127.0.0.1:9", &std::env::temp_dir()).await);
        let (status, body) = call(app, post_json("/api/chat", &json!({"message": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains(EMPTY_MESSAGE));
    }

    #[tokio::test]
    async fn test_unknown_api_path_is_json_404() {
        let app = create_router(state("http://127.0.0.1:9", &std::env::temp_dir()).await);
        let (status, body) = call(app, get("/api/nothing/here")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["error"], "Not found");
    }

    #[tokio::test]
    async fn test_index_and_static_files_count_visits() {
        let dir = temp_static_dir();
        let state = state("http://127.0.0.1:9", &dir).await;
        let app = create_router(Arc::clone(&state));

        let (status, body) = call(app.clone(), get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<h1>chat</h1>");

        let (status, body) = call(app.clone(), get("/app.js")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "console.log(1);");

        let (_, body) = call(app, get("/api/stats")).await;
        let snapshot: StatsSnapshot = serde_json::from_str(&body).unwrap();
        assert_eq!(snapshot.total_visits, 1);
        assert_eq!(snapshot.today_visits, 1);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_chat_stream_reframes_upstream() {
        let upstream = spawn_upstream(StatusCode::OK, HELLO_EXCHANGE).await;
        let app = create_router(state(&upstream, &std::env::temp_dir()).await);

        let response = app
            .oneshot(post_json("/api/chat", &json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(response.headers()["x-accel-buffering"], "no");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();

        let frames: Vec<&str> = body
            .split("\n\n")
            .filter(|f| !f.is_empty())
            .map(|f| f.strip_prefix("data: ").unwrap())
            .collect();
        assert_eq!(frames.last(), Some(&"[DONE]"));
        let payloads: Vec<Value> = frames[..frames.len() - 1]
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect();
        assert_eq!(
            payloads,
            vec![
                json!({"type": "init", "conversation_id": "up-1"}),
                json!({"type": "delta", "content": "**Hel"}),
                json!({"type": "delta", "content": "lo**"}),
                json!({"type": "completed"}),
                json!({"type": "done", "conversation_id": "up-1", "usage": {"token_count": 3}}),
            ]
        );
    }

    #[tokio::test]
    async fn test_chat_stream_reports_upstream_status() {
        let upstream = spawn_upstream(StatusCode::BAD_GATEWAY, "oops").await;
        let app = create_router(state(&upstream, &std::env::temp_dir()).await);

        let (status, body) = call(app, post_json("/api/chat", &json!({"message": "hi"}))).await;

        assert_eq!(status, StatusCode::OK);
        let payload: Value = serde_json::from_str(
            body.trim().strip_prefix("data: ").unwrap(),
        )
        .unwrap();
        assert_eq!(payload["status"], 502);
        assert!(payload["error"].is_string());
        assert!(!body.contains("[DONE]"));
    }

    #[tokio::test]
    async fn test_chat_stream_stalled_upstream_ends_with_error() {
        use crate::server::stats::StatsStore;
        use crate::server::testing::TOKEN;
        use crate::server::RelayConfig;
        use std::time::Duration;

        let upstream = Router::new().route(
            "/v3/chat",
            post(|| async {
                let first = stream::once(async {
                    Ok::<_, Infallible>(Bytes::from_static(
                        b"event:conversation.chat.created\ndata:{\"conversation_id\":\"up-1\"}\n\n",
                    ))
                });
                Body::from_stream(first.chain(stream::pending()))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, upstream).await.unwrap();
        });

        let config = RelayConfig::default()
            .with_upstream_url(format!("http://{addr}"))
            .with_credentials(TOKEN, "bot-1")
            .with_timeout(Duration::from_millis(300));
        let stats = StatsStore::open_in_memory().await.unwrap();
        let app = create_router(AppState::with_stats(config, stats).unwrap());

        let (status, body) = tokio::time::timeout(
            Duration::from_secs(10),
            call(app, post_json("/api/chat", &json!({"message": "hi"}))),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::OK);
        let payloads: Vec<Value> = body
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0], json!({"type": "init", "conversation_id": "up-1"}));
        assert!(payloads[1]["error"].is_string());
        assert!(!body.contains("[DONE]"));
    }

    #[tokio::test]
    async fn test_chat_sync_collects_deltas_and_counts_calls() {
        let upstream = spawn_upstream(StatusCode::OK, HELLO_EXCHANGE).await;
        let state = state(&upstream, &std::env::temp_dir()).await;
        let app = create_router(Arc::clone(&state));

        let (status, body) = call(app, post_json("/api/chat/sync", &json!({"message": "hi"}))).await;

        assert_eq!(status, StatusCode::OK);
        let response: SyncChatResponse = serde_json::from_str(&body).unwrap();
        assert!(response.success);
        assert_eq!(response.response.as_deref(), Some("**Hello**"));
        assert_eq!(state.stats.snapshot().await.unwrap().total_api_calls, 1);
    }

    #[tokio::test]
    async fn test_chat_sync_upstream_failure() {
        let upstream = spawn_upstream(StatusCode::INTERNAL_SERVER_ERROR, "").await;
        let app = create_router(state(&upstream, &std::env::temp_dir()).await);

        let (status, body) = call(app, post_json("/api/chat/sync", &json!({"message": "hi"}))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["status"], 500);
    }

    #[tokio::test]
    async fn test_news_from_text_answer() {
        const NEWS_EXCHANGE: &str = "event:conversation.message.completed\n\
            data:{\"type\":\"answer\",\"content\":\"Headline\\nBody\\nhttps://n\"}\n\n";
        let upstream = spawn_upstream(StatusCode::OK, NEWS_EXCHANGE).await;
        let app = create_router(state(&upstream, &std::env::temp_dir()).await);

        let (status, body) = call(app, get("/api/news")).await;

        assert_eq!(status, StatusCode::OK);
        let response: NewsResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(response.news.len(), 1);
        assert_eq!(response.news[0].title, "Headline");
        assert_eq!(response.news[0].content, "Body");
        assert_eq!(response.news[0].url, "https://n");
    }

    #[test]
    fn test_default_user_id() {
        let mut headers = HeaderMap::new();
        let local = default_user_id(&headers);
        assert!(local.starts_with("web_user_"));
        assert_eq!(local.len(), "web_user_".len() + 8);

        headers.insert("x-forwarded-for", "10.0.0.1, 10.0.0.2".parse().unwrap());
        let forwarded = default_user_id(&headers);
        assert_ne!(forwarded, local);
        assert_eq!(forwarded, default_user_id(&headers));

        assert_eq!(resolve_user_id(&headers, Some("u-1".to_string())), "u-1");
        assert_eq!(resolve_user_id(&headers, Some(String::new())), forwarded);
    }
}
