//! Ledger backends: in-memory for tests and ephemeral runs, SQLite so keys
//! survive restarts.

use super::{DedupKey, ResultLedger};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Process-local ledger.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    keys: DashMap<DedupKey, DateTime<Utc>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[async_trait]
impl ResultLedger for InMemoryLedger {
    async fn exists(&self, key: &DedupKey) -> Result<bool> {
        Ok(self.keys.contains_key(key))
    }

    async fn record(&self, key: &DedupKey) -> Result<()> {
        self.keys.entry(key.clone()).or_insert_with(Utc::now);
        Ok(())
    }
}

/// Ledger backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE seen_results (
///     dedup_key TEXT PRIMARY KEY,
///     first_seen TEXT NOT NULL   -- RFC 3339 timestamp
/// );
/// ```
///
/// The connection is wrapped in a Mutex; statements are short and never held
/// across an await point.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Creates or opens a ledger database.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open ledger database")?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory ledger")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS seen_results (
                dedup_key TEXT PRIMARY KEY,
                first_seen TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create seen_results table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// When a key was first recorded, if ever.
    pub fn first_seen(&self, key: &DedupKey) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT first_seen FROM seen_results WHERE dedup_key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query ledger")?;

        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .context("Invalid first_seen timestamp")
        })
        .transpose()
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM seen_results", [], |row| row.get(0))
            .context("Failed to count ledger rows")?;
        Ok(n as usize)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Ledger connection lock poisoned"))
    }
}

#[async_trait]
impl ResultLedger for SqliteLedger {
    async fn exists(&self, key: &DedupKey) -> Result<bool> {
        Ok(self.first_seen(key)?.is_some())
    }

    async fn record(&self, key: &DedupKey) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO seen_results (dedup_key, first_seen) VALUES (?1, ?2)",
            params![key.as_str(), Utc::now().to_rfc3339()],
        )
        .context("Failed to record dedup key")?;
        Ok(())
    }
}
