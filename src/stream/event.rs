//! Semantic events decoded from stream payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event produced by the stream interpreter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The backend opened (or resumed) a conversation.
    Init {
        /// External session id issued by the backend.
        conversation_id: String,
    },
    /// Incremental reply content.
    Delta {
        /// Text to append to the running reply.
        content: String,
    },
    /// The reply is complete.
    Done {
        /// Conversation id, if the backend repeated it.
        conversation_id: Option<String>,
        /// Token usage reported by the backend.
        usage: Option<Value>,
    },
    /// The backend reported an error; nothing follows.
    Error {
        /// Error text.
        message: String,
    },
}

impl StreamEvent {
    /// Whether this event ends the stream.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Classify one JSON payload.
///
/// Returns `None` for unknown types and for known types missing their
/// required fields.
#[must_use]
pub fn interpret(payload: &Value) -> Option<StreamEvent> {
    if let Some(message) = error_message(payload) {
        return Some(StreamEvent::Error { message });
    }

    match payload.get("type").and_then(Value::as_str)? {
        "init" => {
            let conversation_id = payload
                .get("conversation_id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())?;
            Some(StreamEvent::Init {
                conversation_id: conversation_id.to_string(),
            })
        }
        "delta" => {
            let content = payload.get("content").and_then(Value::as_str)?;
            if content.is_empty() {
                return None;
            }
            Some(StreamEvent::Delta {
                content: content.to_string(),
            })
        }
        "done" => Some(StreamEvent::Done {
            conversation_id: payload
                .get("conversation_id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            usage: payload.get("usage").filter(|u| !u.is_null()).cloned(),
        }),
        _ => None,
    }
}

fn error_message(payload: &Value) -> Option<String> {
    match payload.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
