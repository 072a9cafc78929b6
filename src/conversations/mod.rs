//! Conversation history.
//!
//! This module provides the conversation model, the history store and the
//! local storage backends it persists through.

pub mod display;
pub mod storage;
pub mod store;
pub mod types;

pub use storage::{KV_TABLE, LocalStorage, MemoryStorage, SqliteStorage};
pub use store::{ConversationStore, DEFAULT_HISTORY_WINDOW, MAX_PERSISTED, STORAGE_KEY};
pub use types::{Conversation, ConversationSummary, HistoryEntry, Message, Role};
