//! Chat session: one send operation from user input to persisted reply.
//!
//! A [`ChatSession`] owns the backend, the conversation store and the
//! renderer. Each call to [`ChatSession::send_message`]:
//! 1. records the user message,
//! 2. streams the reply, re-rendering the accumulated text on every delta,
//! 3. falls back to the synchronous endpoint on transport failure,
//! 4. records the assistant message or reports the failure to the view.

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::client::ChatBackend;
use crate::conversations::{ConversationStore, DEFAULT_HISTORY_WINDOW, LocalStorage, Role};
use crate::error::{ChatError, ChatResult};
use crate::protocol::ChatRequest;
use crate::render::MarkdownRenderer;
use crate::stream::StreamEvent;

/// Shown when the backend reports an error in the stream.
pub const GENERIC_ERROR: &str = "Sorry, something went wrong. Please try again later.";
/// Shown when both the stream and the fallback failed.
pub const NETWORK_ERROR: &str = "Network error, please check your connection and try again.";

/// Where a reply is displayed while it streams.
pub trait ReplyView {
    /// A reply has been requested; nothing has arrived yet.
    fn show_pending(&mut self) {}

    /// The reply grew. `text` is the whole reply so far, `markup` its rendering.
    fn update(&mut self, text: &str, markup: &str);

    /// The reply is complete.
    fn finish(&mut self, text: &str, markup: &str);

    /// The reply ended empty; remove the placeholder.
    fn discard(&mut self) {}

    /// Replace the placeholder with an error message.
    fn show_error(&mut self, message: &str, retryable: bool);
}

/// How a send operation ended.
#[derive(Debug)]
pub enum SendOutcome {
    /// Input was blank; nothing was sent.
    Ignored,
    /// The streamed reply was recorded.
    Streamed,
    /// Streaming failed and the synchronous reply was recorded.
    FellBack,
    /// The backend answered with no content.
    Empty,
    /// No reply could be obtained; the view shows an error.
    Failed(ChatError),
}

impl SendOutcome {
    /// Whether an assistant message was recorded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Streamed | Self::FellBack)
    }
}

/// Client-side state for one chat window.
pub struct ChatSession<B, S> {
    backend: B,
    store: ConversationStore<S>,
    renderer: MarkdownRenderer,
    user_id: Option<String>,
    history_window: usize,
}

impl<B: ChatBackend, S: LocalStorage> ChatSession<B, S> {
    /// Create a session over a loaded store.
    pub fn new(backend: B, store: ConversationStore<S>, renderer: MarkdownRenderer) -> Self {
        Self {
            backend,
            store,
            renderer,
            user_id: None,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    /// Set the caller identity sent with each request.
    #[must_use]
    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Set how many recent messages are sent as context.
    #[must_use]
    pub const fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Conversation history.
    pub const fn store(&self) -> &ConversationStore<S> {
        &self.store
    }

    /// Conversation history, for `/new`, `/open` and `/delete`.
    pub const fn store_mut(&mut self) -> &mut ConversationStore<S> {
        &mut self.store
    }

    /// Renderer used for replies and for redisplaying history.
    pub const fn renderer(&self) -> &MarkdownRenderer {
        &self.renderer
    }

    /// Backend the session talks to.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Send a user message and drive the reply into `view`.
    pub async fn send_message<V>(&mut self, text: &str, view: &mut V) -> SendOutcome
    where
        V: ReplyView + ?Sized,
    {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored;
        }

        let history = self.store.history_context(self.history_window);
        let request = ChatRequest::new(text)
            .with_user_id(self.user_id.clone())
            .with_conversation_id(self.store.external_session_id().map(str::to_string))
            .with_history(history);
        self.store.append_message(Role::User, text);

        view.show_pending();
        let mut reply = String::new();
        match self.stream_reply(&request, &mut reply, view).await {
            Ok(()) => self.complete(reply, view, SendOutcome::Streamed),
            Err(e) if e.is_transport() => {
                warn!("Streaming failed, falling back to sync endpoint: {e}");
                self.fall_back(&request, view).await
            }
            Err(e) => {
                warn!("Backend reported an error: {e}");
                view.show_error(GENERIC_ERROR, true);
                SendOutcome::Failed(e)
            }
        }
    }

    /// Send the last user message of the current conversation again.
    pub async fn retry_last_message<V>(&mut self, view: &mut V) -> SendOutcome
    where
        V: ReplyView + ?Sized,
    {
        let Some(message) = self.store.last_user_message().map(str::to_string) else {
            return SendOutcome::Ignored;
        };
        info!("Retrying last message");
        self.send_message(&message, view).await
    }

    async fn stream_reply<V>(
        &mut self,
        request: &ChatRequest,
        reply: &mut String,
        view: &mut V,
    ) -> ChatResult<()>
    where
        V: ReplyView + ?Sized,
    {
        let mut events = self.backend.stream_chat(request).await?;
        while let Some(event) = events.next().await {
            match event? {
                StreamEvent::Init { conversation_id } => {
                    self.store.set_external_session_id(conversation_id);
                }
                StreamEvent::Delta { content } => {
                    reply.push_str(&content);
                    let markup = self.renderer.render(reply);
                    view.update(reply, &markup);
                }
                StreamEvent::Done {
                    conversation_id,
                    usage,
                } => {
                    if let Some(id) = conversation_id {
                        self.store.set_external_session_id(id);
                    }
                    if let Some(usage) = usage {
                        debug!("Usage: {usage}");
                    }
                }
                StreamEvent::Error { message } => return Err(ChatError::Protocol(message)),
            }
        }
        Ok(())
    }

    async fn fall_back<V>(&mut self, request: &ChatRequest, view: &mut V) -> SendOutcome
    where
        V: ReplyView + ?Sized,
    {
        match self
            .backend
            .send_chat(&request.message, request.user_id.as_deref())
            .await
        {
            Ok(reply) => self.complete(reply, view, SendOutcome::FellBack),
            Err(e) => {
                warn!("Sync fallback failed: {e}");
                view.show_error(NETWORK_ERROR, true);
                SendOutcome::Failed(e)
            }
        }
    }

    fn complete<V>(&mut self, reply: String, view: &mut V, outcome: SendOutcome) -> SendOutcome
    where
        V: ReplyView + ?Sized,
    {
        if reply.is_empty() {
            view.discard();
            return SendOutcome::Empty;
        }
        let markup = self.renderer.render(&reply);
        view.finish(&reply, &markup);
        self.store.append_message(Role::Assistant, reply);
        outcome
    }
}
