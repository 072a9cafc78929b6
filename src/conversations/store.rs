//! Conversation history backed by a [`LocalStorage`].

use chrono::{DateTime, Local, Utc};
use tracing::{debug, info, warn};

use super::display::format_relative;
use super::storage::LocalStorage;
use super::types::{Conversation, ConversationSummary, HistoryEntry, Message, Role, derive_title};
use crate::error::ChatResult;

/// Storage key holding the JSON-encoded conversation list.
pub const STORAGE_KEY: &str = "streamchat_conversations";

/// Maximum number of conversations written to storage.
pub const MAX_PERSISTED: usize = 20;

/// Number of recent messages sent to the backend as context.
pub const DEFAULT_HISTORY_WINDOW: usize = 6;

/// Ordered conversation list with a current conversation.
///
/// The list is kept most-recently-updated first. Only the first
/// [`MAX_PERSISTED`] entries are written out. Persistence failures are
/// logged and never surface from the mutating operations; call
/// [`ConversationStore::persist`] directly to observe them.
#[derive(Debug)]
pub struct ConversationStore<S> {
    storage: S,
    conversations: Vec<Conversation>,
    current_id: Option<String>,
}

impl<S: LocalStorage> ConversationStore<S> {
    /// Load history from `storage`.
    ///
    /// Unreadable or corrupt data resets to an empty list. The most recent
    /// conversation becomes current; a fresh one is created if there is none.
    pub fn load(storage: S) -> Self {
        let mut conversations = match storage.get_item(STORAGE_KEY) {
            Ok(Some(raw)) => serde_json::from_str::<Vec<Conversation>>(&raw).unwrap_or_else(|e| {
                warn!("Discarding corrupt conversation history: {e}");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read conversation history: {e}");
                Vec::new()
            }
        };
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        info!("Loaded {} conversations", conversations.len());

        let current_id = conversations.first().map(|c| c.id.clone());
        let mut store = Self {
            storage,
            conversations,
            current_id,
        };
        if store.current_id.is_none() {
            store.create_conversation();
        }
        store
    }

    /// All conversations, most recent first.
    #[must_use]
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// The current conversation.
    #[must_use]
    pub fn current(&self) -> Option<&Conversation> {
        self.current_index().map(|i| &self.conversations[i])
    }

    /// Identifier of the current conversation.
    #[must_use]
    pub fn current_id(&self) -> Option<&str> {
        self.current_id.as_deref()
    }

    /// Backend session id of the current conversation.
    #[must_use]
    pub fn external_session_id(&self) -> Option<&str> {
        self.current()
            .and_then(|c| c.external_session_id.as_deref())
    }

    /// Borrow the storage backend.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Start a new conversation and make it current.
    pub fn create_conversation(&mut self) -> &Conversation {
        let conversation = Conversation::new(Utc::now());
        debug!("Created conversation {}", conversation.id);
        self.current_id = Some(conversation.id.clone());
        self.conversations.insert(0, conversation);
        self.save();
        &self.conversations[0]
    }

    /// Append a message to the current conversation.
    ///
    /// The first user message replaces the placeholder title. The
    /// conversation moves to the front of the list.
    pub fn append_message(&mut self, role: Role, content: impl Into<String>) {
        let index = match self.current_index() {
            Some(index) => index,
            None => {
                self.create_conversation();
                0
            }
        };

        let message = Message::new(role, content);
        let mut conversation = self.conversations.remove(index);
        if role == Role::User && conversation.has_default_title() {
            conversation.title = derive_title(&message.content);
        }
        conversation.updated_at = message.timestamp;
        conversation.messages.push(message);
        self.conversations.insert(0, conversation);
        self.save();
    }

    /// Record the backend session id on the current conversation.
    pub fn set_external_session_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        let Some(index) = self.current_index() else {
            warn!("No current conversation for session id {id}");
            return;
        };
        if self.conversations[index].external_session_id.as_deref() == Some(id.as_str()) {
            return;
        }
        debug!("Conversation {} bound to session {id}", self.conversations[index].id);
        self.conversations[index].external_session_id = Some(id);
        self.save();
    }

    /// Make an existing conversation current. Returns `false` if it does not exist.
    pub fn select_conversation(&mut self, id: &str) -> bool {
        if self.conversations.iter().any(|c| c.id == id) {
            self.current_id = Some(id.to_string());
            true
        } else {
            false
        }
    }

    /// Delete a conversation. Returns `false` if it does not exist.
    ///
    /// Deleting the current conversation promotes the most recent remaining
    /// one, or starts a fresh conversation when none is left.
    pub fn delete_conversation(&mut self, id: &str) -> bool {
        let Some(index) = self.conversations.iter().position(|c| c.id == id) else {
            return false;
        };
        self.conversations.remove(index);
        info!("Deleted conversation {id}");

        if self.current_id.as_deref() == Some(id) {
            self.current_id = self.conversations.first().map(|c| c.id.clone());
            if self.current_id.is_none() {
                self.create_conversation();
                return true;
            }
        }
        self.save();
        true
    }

    /// Summaries for display, most recent first.
    #[must_use]
    pub fn list_for_display(&self, now: DateTime<Utc>) -> Vec<ConversationSummary> {
        let now = now.with_timezone(&Local);
        self.conversations
            .iter()
            .map(|c| ConversationSummary {
                id: c.id.clone(),
                title: c.title.clone(),
                message_count: c.messages.len(),
                updated: format_relative(&c.updated_at.with_timezone(&Local), &now),
                is_active: self.current_id.as_deref() == Some(c.id.as_str()),
            })
            .collect()
    }

    /// Last `limit` messages of the current conversation.
    #[must_use]
    pub fn history_context(&self, limit: usize) -> Vec<HistoryEntry> {
        self.current().map_or_else(Vec::new, |c| {
            let start = c.messages.len().saturating_sub(limit);
            c.messages[start..].iter().map(HistoryEntry::from).collect()
        })
    }

    /// Most recent user message of the current conversation.
    #[must_use]
    pub fn last_user_message(&self) -> Option<&str> {
        self.current()?
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Write the first [`MAX_PERSISTED`] conversations to storage.
    ///
    /// # Errors
    /// Returns an error if encoding or the storage write fails.
    pub fn persist(&mut self) -> ChatResult<()> {
        let keep = self.conversations.len().min(MAX_PERSISTED);
        let json = serde_json::to_string(&self.conversations[..keep])?;
        self.storage.set_item(STORAGE_KEY, &json)
    }

    fn save(&mut self) {
        if let Err(e) = self.persist() {
            warn!("Failed to save conversations: {e}");
        }
    }

    fn current_index(&self) -> Option<usize> {
        let id = self.current_id.as_deref()?;
        self.conversations.iter().position(|c| c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::storage::{MemoryStorage, SqliteStorage};
    use crate::conversations::types::DEFAULT_TITLE;
    use crate::error::ChatError;

    fn persisted(store: &ConversationStore<MemoryStorage>) -> Vec<Conversation> {
        let raw = store.storage().get_item(STORAGE_KEY).unwrap().unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    struct BrokenStorage;

    impl LocalStorage for BrokenStorage {
        fn get_item(&self, _key: &str) -> ChatResult<Option<String>> {
            Err(ChatError::Storage("unavailable".to_string()))
        }

        fn set_item(&mut self, _key: &str, _value: &str) -> ChatResult<()> {
            Err(ChatError::Storage("quota exceeded".to_string()))
        }

        fn remove_item(&mut self, _key: &str) -> ChatResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_load_empty_creates_current() {
        let store = ConversationStore::load(MemoryStorage::new());
        assert_eq!(store.conversations().len(), 1);
        assert_eq!(store.current().map(|c| c.title.as_str()), Some(DEFAULT_TITLE));
        assert_eq!(persisted(&store).len(), 1);
    }

    #[test]
    fn test_corrupt_history_resets() {
        let mut storage = MemoryStorage::new();
        storage.set_item(STORAGE_KEY, "{not json").unwrap();
        let store = ConversationStore::load(storage);
        assert_eq!(store.conversations().len(), 1);
        assert!(store.current().is_some_and(|c| c.messages.is_empty()));
    }

    #[test]
    fn test_storage_failures_do_not_propagate() {
        let mut store = ConversationStore::load(BrokenStorage);
        store.append_message(Role::User, "hello");
        assert_eq!(store.current().map(|c| c.messages.len()), Some(1));
        assert!(store.persist().is_err());
    }

    #[test]
    fn test_append_derives_title_once() {
        let mut store = ConversationStore::load(MemoryStorage::new());
        store.append_message(Role::Assistant, "welcome");
        assert!(store.current().is_some_and(Conversation::has_default_title));
        store.append_message(Role::User, "How do I register for out-of-area care?");
        store.append_message(Role::User, "second question");
        let current = store.current().unwrap();
        assert_eq!(current.title, "How do I register fo...");
        assert_eq!(current.messages.len(), 3);
        assert!(current.updated_at >= current.created_at);
    }

    #[test]
    fn test_retention_keeps_twenty_most_recent() {
        let mut store = ConversationStore::load(MemoryStorage::new());
        let first_id = store.current_id().unwrap().to_string();
        store.append_message(Role::User, "conversation 0");
        for i in 1..21 {
            store.create_conversation();
            store.append_message(Role::User, format!("conversation {i}"));
        }
        assert_eq!(store.conversations().len(), 21);

        let saved = persisted(&store);
        assert_eq!(saved.len(), MAX_PERSISTED);
        assert!(saved.iter().all(|c| c.id != first_id));
        assert_eq!(saved[0].title, "conversation 20");

        assert!(store.select_conversation(&first_id));
        store.append_message(Role::Assistant, "revived");
        let saved = persisted(&store);
        assert_eq!(saved[0].id, first_id);
        assert!(saved.iter().all(|c| c.title != "conversation 1"));
    }

    #[test]
    fn test_external_session_id() {
        let mut store = ConversationStore::load(MemoryStorage::new());
        assert_eq!(store.external_session_id(), None);
        store.set_external_session_id("coze-1");
        store.set_external_session_id("coze-2");
        assert_eq!(store.external_session_id(), Some("coze-2"));
        assert_eq!(persisted(&store)[0].external_session_id.as_deref(), Some("coze-2"));
    }

    #[test]
    fn test_delete_current_promotes_most_recent() {
        let mut store = ConversationStore::load(MemoryStorage::new());
        let older = store.current_id().unwrap().to_string();
        let newer = store.create_conversation().id.clone();

        assert!(store.delete_conversation(&newer));
        assert_eq!(store.current_id(), Some(older.as_str()));

        assert!(store.delete_conversation(&older));
        assert_eq!(store.conversations().len(), 1);
        assert_ne!(store.current_id(), Some(older.as_str()));
        assert!(!store.delete_conversation("missing"));
    }

    #[test]
    fn test_delete_other_keeps_current() {
        let mut store = ConversationStore::load(MemoryStorage::new());
        let older = store.current_id().unwrap().to_string();
        let newer = store.create_conversation().id.clone();
        assert!(store.delete_conversation(&older));
        assert_eq!(store.current_id(), Some(newer.as_str()));
    }

    #[test]
    fn test_reload_restores_order_and_current() {
        let mut store = ConversationStore::load(MemoryStorage::new());
        store.append_message(Role::User, "first");
        let second = store.create_conversation().id.clone();
        store.append_message(Role::User, "second");

        let reloaded = ConversationStore::load(store.storage().clone());
        assert_eq!(reloaded.conversations().len(), 2);
        assert_eq!(reloaded.current_id(), Some(second.as_str()));
    }

    #[test]
    fn test_sqlite_history_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("streamchat-store-{}", uuid::Uuid::new_v4()));
        let path = dir.join("history.db");
        let title = {
            let mut store = ConversationStore::load(SqliteStorage::open(&path).unwrap());
            store.append_message(Role::User, "hello from disk");
            store.append_message(Role::Assistant, "hi");
            store.current().map(|c| c.title.clone()).unwrap()
        };

        let reopened = ConversationStore::load(SqliteStorage::open(&path).unwrap());
        let current = reopened.current().unwrap();
        assert_eq!(current.title, title);
        assert_eq!(current.messages.len(), 2);
        drop(reopened);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_history_context_and_last_user_message() {
        let mut store = ConversationStore::load(MemoryStorage::new());
        for i in 0..4 {
            store.append_message(Role::User, format!("q{i}"));
            store.append_message(Role::Assistant, format!("a{i}"));
        }
        let history = store.history_context(DEFAULT_HISTORY_WINDOW);
        assert_eq!(history.len(), 6);
        assert_eq!(history[0].content, "q1");
        assert_eq!(history[5].content, "a3");
        assert_eq!(store.last_user_message(), Some("q3"));
    }

    #[test]
    fn test_list_for_display() {
        let mut store = ConversationStore::load(MemoryStorage::new());
        store.append_message(Role::User, "hello");
        store.create_conversation();
        let list = store.list_for_display(Utc::now());
        assert_eq!(list.len(), 2);
        assert!(list[0].is_active);
        assert!(!list[1].is_active);
        assert_eq!(list[1].title, "hello");
        assert_eq!(list[1].message_count, 1);
        assert_eq!(list[1].updated, "just now");
    }
}
