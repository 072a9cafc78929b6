//! Upstream bot API: request bodies, client and SSE record translation.
//!
//! The upstream streams `event: <name>` / `data: <json>` record pairs. The
//! relay remembers the last event name and interprets each data line
//! against it.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{ChatError, ChatResult};
use crate::protocol::ChatRequest;
use crate::stream::frame::{DATA_PREFIX, DONE_SENTINEL, LineBuffer};

use super::config::RelayConfig;

/// Prefix of an upstream event name line.
pub const EVENT_PREFIX: &str = "event:";

/// The upstream opened a conversation.
pub const CHAT_CREATED: &str = "conversation.chat.created";
/// A fragment of a message.
pub const MESSAGE_DELTA: &str = "conversation.message.delta";
/// A complete message.
pub const MESSAGE_COMPLETED: &str = "conversation.message.completed";
/// The whole exchange finished.
pub const CHAT_COMPLETED: &str = "conversation.chat.completed";

/// Message type carrying the bot's reply, as opposed to tool or follow-up messages.
const ANSWER: &str = "answer";

/// Client frame that ends the stream.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Encode one client frame.
#[must_use]
pub fn encode_frame(payload: &Value) -> String {
    format!("{DATA_PREFIX} {payload}\n\n")
}

/// One message in the upstream request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UpstreamMessage {
    /// `user` or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
    /// Always `text`.
    pub content_type: &'static str,
}

impl UpstreamMessage {
    fn text(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            content_type: "text",
        }
    }
}

/// Body of `POST /v3/chat`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UpstreamRequest {
    /// Bot to talk to.
    pub bot_id: String,
    /// Caller identity.
    pub user_id: String,
    /// Always streamed; buffered endpoints collect the stream.
    pub stream: bool,
    /// Whether the upstream keeps the exchange in its own history.
    pub auto_save_history: bool,
    /// Context followed by the new user message.
    pub additional_messages: Vec<UpstreamMessage>,
    /// Upstream conversation to continue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl UpstreamRequest {
    /// A single user message with no context.
    #[must_use]
    pub fn single(
        config: &RelayConfig,
        user_id: impl Into<String>,
        message: impl Into<String>,
        auto_save_history: bool,
    ) -> Self {
        Self {
            bot_id: config.bot_id.clone(),
            user_id: user_id.into(),
            stream: true,
            auto_save_history,
            additional_messages: vec![UpstreamMessage::text("user", message)],
            conversation_id: None,
        }
    }

    /// Forward a client chat request with its most recent history.
    #[must_use]
    pub fn chat(config: &RelayConfig, request: &ChatRequest, user_id: impl Into<String>) -> Self {
        let start = request.history.len().saturating_sub(config.history_window);
        let mut additional_messages: Vec<UpstreamMessage> = request.history[start..]
            .iter()
            .map(|entry| UpstreamMessage::text(entry.role.as_str(), entry.content.clone()))
            .collect();
        additional_messages.push(UpstreamMessage::text("user", request.message.clone()));

        Self {
            bot_id: config.bot_id.clone(),
            user_id: user_id.into(),
            stream: true,
            auto_save_history: true,
            additional_messages,
            conversation_id: request
                .conversation_id
                .clone()
                .filter(|id| !id.is_empty()),
        }
    }
}

/// Splits upstream bytes into `(event name, data payload)` records.
#[derive(Debug, Default)]
struct RecordReader {
    lines: LineBuffer,
    current_event: Option<String>,
}

impl RecordReader {
    fn push(&mut self, chunk: &[u8]) -> Vec<(Option<String>, Value)> {
        let lines = self.lines.push(chunk);
        lines.iter().filter_map(|line| self.read_line(line)).collect()
    }

    fn finish(&mut self) -> Vec<(Option<String>, Value)> {
        self.lines
            .finish()
            .and_then(|line| self.read_line(&line))
            .into_iter()
            .collect()
    }

    fn read_line(&mut self, line: &str) -> Option<(Option<String>, Value)> {
        let line = line.trim();
        if let Some(name) = line.strip_prefix(EVENT_PREFIX) {
            self.current_event = Some(name.trim().to_string());
            return None;
        }
        let data = line.strip_prefix(DATA_PREFIX)?.trim();
        if data.is_empty() || data == DONE_SENTINEL {
            return None;
        }
        match serde_json::from_str(data) {
            Ok(value) => Some((self.current_event.clone(), value)),
            Err(e) => {
                warn!("Skipping malformed upstream record: {e}");
                None
            }
        }
    }
}

fn answer_content(data: &Value) -> Option<&str> {
    if data.get("type").and_then(Value::as_str) != Some(ANSWER) {
        return None;
    }
    data.get("content").and_then(Value::as_str)
}

/// Re-frames upstream records into client payloads.
#[derive(Debug, Default)]
pub struct RelayTranslator {
    reader: RecordReader,
    conversation_id: Option<String>,
}

impl RelayTranslator {
    /// Create a translator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed an upstream chunk, returning the client payloads it produced.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Value> {
        let records = self.reader.push(chunk);
        records
            .into_iter()
            .filter_map(|(event, data)| self.translate(event.as_deref(), &data))
            .collect()
    }

    /// Flush an unterminated final record.
    pub fn finish(&mut self) -> Vec<Value> {
        let records = self.reader.finish();
        records
            .into_iter()
            .filter_map(|(event, data)| self.translate(event.as_deref(), &data))
            .collect()
    }

    /// Upstream conversation id seen so far.
    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    fn translate(&mut self, event: Option<&str>, data: &Value) -> Option<Value> {
        match event? {
            CHAT_CREATED => {
                let id = data
                    .get("conversation_id")
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())?;
                self.conversation_id = Some(id.to_string());
                Some(json!({"type": "init", "conversation_id": id}))
            }
            MESSAGE_DELTA => {
                let content = answer_content(data).filter(|c| !c.is_empty())?;
                Some(json!({"type": "delta", "content": content}))
            }
            MESSAGE_COMPLETED => {
                answer_content(data)?;
                Some(json!({"type": "completed"}))
            }
            CHAT_COMPLETED => {
                let usage = data.get("usage").cloned().unwrap_or_else(|| json!({}));
                Some(json!({
                    "type": "done",
                    "conversation_id": self.conversation_id,
                    "usage": usage,
                }))
            }
            other => {
                debug!("Ignoring upstream event {other}");
                None
            }
        }
    }
}

/// Buffers the answer of an upstream exchange.
#[derive(Debug, Default)]
pub struct AnswerCollector {
    reader: RecordReader,
    deltas: String,
    completed: Option<String>,
}

impl AnswerCollector {
    /// Create a collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed an upstream chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        for (event, data) in self.reader.push(chunk) {
            self.collect(event.as_deref(), &data);
        }
    }

    /// Flush an unterminated final record.
    pub fn finish(&mut self) {
        for (event, data) in self.reader.finish() {
            self.collect(event.as_deref(), &data);
        }
    }

    /// Concatenated answer deltas.
    #[must_use]
    pub fn delta_text(&self) -> &str {
        &self.deltas
    }

    /// The completed answer when the upstream sent one, else the deltas.
    #[must_use]
    pub fn into_answer(self) -> String {
        self.completed.unwrap_or(self.deltas)
    }

    fn collect(&mut self, event: Option<&str>, data: &Value) {
        let Some(content) = answer_content(data).filter(|c| !c.is_empty()) else {
            return;
        };
        match event {
            Some(MESSAGE_DELTA) => self.deltas.push_str(content),
            Some(MESSAGE_COMPLETED) => self.completed = Some(content.to_string()),
            _ => {}
        }
    }
}

/// HTTP client for the upstream bot API.
#[derive(Clone, Debug)]
pub struct UpstreamClient {
    http: reqwest::Client,
    config: Arc<RelayConfig>,
}

impl UpstreamClient {
    /// Create a client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: Arc<RelayConfig>) -> ChatResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .read_timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// Relay configuration.
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Start an exchange and return the streaming response.
    ///
    /// There is no total deadline; a read that stalls longer than the
    /// configured timeout fails the body stream.
    ///
    /// # Errors
    /// Returns a transport error, or [`ChatError::HttpStatus`] for a
    /// non-success status.
    pub async fn open(&self, request: &UpstreamRequest) -> ChatResult<reqwest::Response> {
        self.send(request, None).await
    }

    /// Run an exchange to the end and buffer its answer.
    ///
    /// # Errors
    /// Returns an error if the request fails, times out or the status is not
    /// a success.
    pub async fn collect(&self, request: &UpstreamRequest) -> ChatResult<AnswerCollector> {
        let mut response = self.send(request, Some(self.config.request_timeout)).await?;
        let mut collector = AnswerCollector::new();
        while let Some(chunk) = response.chunk().await? {
            collector.push(&chunk);
        }
        collector.finish();
        Ok(collector)
    }

    async fn send(
        &self,
        request: &UpstreamRequest,
        timeout: Option<std::time::Duration>,
    ) -> ChatResult<reqwest::Response> {
        let url = self.config.chat_endpoint();
        debug!(
            "POST {url} (user: {}, messages: {})",
            request.user_id,
            request.additional_messages.len()
        );

        let mut builder = self
            .http
            .post(&url)
            .bearer_auth(&self.config.access_token)
            .json(request);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Upstream returned {status}: {body}");
            return Err(ChatError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}
