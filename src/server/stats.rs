//! Visit and API call counters in `SQLite`.

use std::path::Path;

use chrono::Local;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_rusqlite::Connection;

/// Statistics store errors.
#[derive(Debug, Error)]
pub enum StatsError {
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// I/O error while preparing the database directory.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias for statistics operations.
pub type StatsResult<T> = Result<T, StatsError>;

/// Number of days listed in [`StatsSnapshot::daily`].
pub const DAILY_WINDOW: u32 = 7;

/// Counters for one calendar day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    /// `YYYY-MM-DD`.
    pub date: String,
    /// Page visits.
    pub visits: i64,
    /// Chat API calls.
    pub api_calls: i64,
}

/// Response of `GET /api/stats`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Day counting started.
    pub start_date: String,
    /// Visits since `start_date`.
    pub total_visits: i64,
    /// API calls since `start_date`.
    pub total_api_calls: i64,
    /// Visits today.
    pub today_visits: i64,
    /// API calls today.
    pub today_api_calls: i64,
    /// Most recent days first.
    pub daily: Vec<DailyStats>,
}

#[derive(Clone, Copy, Debug)]
enum Counter {
    Visits,
    ApiCalls,
}

impl Counter {
    const fn total_column(self) -> &'static str {
        match self {
            Self::Visits => "total_visits",
            Self::ApiCalls => "total_api_calls",
        }
    }

    const fn daily_column(self) -> &'static str {
        match self {
            Self::Visits => "visits",
            Self::ApiCalls => "api_calls",
        }
    }
}

fn today() -> String {
    Local::now().date_naive().to_string()
}

/// `SQLite` statistics store.
#[derive(Clone)]
pub struct StatsStore {
    conn: Connection,
}

impl StatsStore {
    /// Open (or create) the database file.
    ///
    /// # Errors
    /// Returns an error if the directory or database cannot be created.
    pub async fn open(path: &Path) -> StatsResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conn = Connection::open(path).await?;
        Self::init(conn).await
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub async fn open_in_memory() -> StatsResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> StatsResult<Self> {
        let start_date = today();
        conn.call(move |conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS stats_summary (
                    id INTEGER PRIMARY KEY,
                    start_date TEXT NOT NULL,
                    total_visits INTEGER NOT NULL DEFAULT 0,
                    total_api_calls INTEGER NOT NULL DEFAULT 0
                );
                CREATE TABLE IF NOT EXISTS daily_stats (
                    date TEXT PRIMARY KEY,
                    visits INTEGER NOT NULL DEFAULT 0,
                    api_calls INTEGER NOT NULL DEFAULT 0
                );",
            )?;
            conn.execute(
                "INSERT OR IGNORE INTO stats_summary (id, start_date) VALUES (1, ?1)",
                rusqlite::params![start_date],
            )?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// Count a page visit.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn record_visit(&self) -> StatsResult<()> {
        self.bump(Counter::Visits).await
    }

    /// Count a chat API call.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn record_api_call(&self) -> StatsResult<()> {
        self.bump(Counter::ApiCalls).await
    }

    async fn bump(&self, counter: Counter) -> StatsResult<()> {
        let date = today();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let total = counter.total_column();
                tx.execute(
                    &format!("UPDATE stats_summary SET {total} = {total} + 1 WHERE id = 1"),
                    [],
                )?;
                let daily = counter.daily_column();
                tx.execute(
                    &format!(
                        "INSERT INTO daily_stats (date, {daily}) VALUES (?1, 1)
                         ON CONFLICT(date) DO UPDATE SET {daily} = {daily} + 1"
                    ),
                    rusqlite::params![date],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Current totals, today's counters and the last [`DAILY_WINDOW`] days.
    ///
    /// # Errors
    /// Returns an error if a query fails.
    pub async fn snapshot(&self) -> StatsResult<StatsSnapshot> {
        let date = today();
        let snapshot = self
            .conn
            .call(move |conn| {
                let (start_date, total_visits, total_api_calls) = conn
                    .query_row(
                        "SELECT start_date, total_visits, total_api_calls FROM stats_summary WHERE id = 1",
                        [],
                        |row| Ok((row.get::<_, String>(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .optional()?
                    .unwrap_or_else(|| (date.clone(), 0, 0));

                let (today_visits, today_api_calls) = conn
                    .query_row(
                        "SELECT visits, api_calls FROM daily_stats WHERE date = ?1",
                        rusqlite::params![date],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?
                    .unwrap_or((0, 0));

                let mut stmt = conn.prepare(
                    "SELECT date, visits, api_calls FROM daily_stats ORDER BY date DESC LIMIT ?1",
                )?;
                let daily = stmt
                    .query_map(rusqlite::params![DAILY_WINDOW], |row| {
                        Ok(DailyStats {
                            date: row.get(0)?,
                            visits: row.get(1)?,
                            api_calls: row.get(2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(StatsSnapshot {
                    start_date,
                    total_visits,
                    total_api_calls,
                    today_visits,
                    today_api_calls,
                    daily,
                })
            })
            .await?;
        Ok(snapshot)
    }
}
