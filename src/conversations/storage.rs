//! Key/value storage backends for persisted history.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::ChatResult;

/// Minimal local-storage interface: string values under string keys.
pub trait LocalStorage {
    /// Read a value.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    fn get_item(&self, key: &str) -> ChatResult<Option<String>>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written.
    fn set_item(&mut self, key: &str, value: &str) -> ChatResult<()>;

    /// Remove a value. Missing keys are not an error.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written.
    fn remove_item(&mut self, key: &str) -> ChatResult<()>;
}

/// In-memory storage, lost on drop.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    items: HashMap<String, String>,
}

impl MemoryStorage {
    /// Create an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> ChatResult<Option<String>> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> ChatResult<()> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> ChatResult<()> {
        self.items.remove(key);
        Ok(())
    }
}

/// Table holding the key/value pairs.
pub const KV_TABLE: &str = "kv";

/// `SQLite`-backed storage: one row per key in a `kv` table.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Open (or create) the database at `path`, creating parent directories.
    ///
    /// # Errors
    /// Returns an error if the directory or the database cannot be created.
    pub fn open(path: &Path) -> ChatResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn open_in_memory() -> ChatResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> ChatResult<Self> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {KV_TABLE} (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );"
        ))?;
        Ok(Self { conn })
    }
}

impl LocalStorage for SqliteStorage {
    fn get_item(&self, key: &str) -> ChatResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                &format!("SELECT value FROM {KV_TABLE} WHERE key = ?1"),
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_item(&mut self, key: &str, value: &str) -> ChatResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO {KV_TABLE} (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value"
            ),
            params![key, value],
        )?;
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> ChatResult<()> {
        self.conn
            .execute(&format!("DELETE FROM {KV_TABLE} WHERE key = ?1"), params![key])?;
        Ok(())
    }
}
