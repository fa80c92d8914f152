use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use crate::error::{MigrationError, Result};

use super::{CacheUpdate, TtlCache};

const CACHE_SCHEMA_SQL: &str = r"
    PRAGMA journal_mode = WAL;
    CREATE TABLE IF NOT EXISTS cache_entries (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        expires_at_ms INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_cache_entries_expires_at
    ON cache_entries(expires_at_ms);
";

const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Cache kept in its own SQLite file so several processes share one view of
/// sessions, locks and counters. `update` runs inside an immediate
/// transaction, which takes the database write lock before reading.
#[derive(Clone)]
pub struct SqliteTtlCache {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteTtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTtlCache").finish_non_exhaustive()
    }
}

impl SqliteTtlCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(CACHE_SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| MigrationError::mutex_poisoned("sqlite cache"))?;
        f(&mut conn)
    }
}

impl TtlCache for SqliteTtlCache {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM cache_entries WHERE key = ?1 AND expires_at_ms > ?2",
                    params![key, now.timestamp_millis()],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    fn update(
        &self,
        key: &str,
        now: DateTime<Utc>,
        apply: &mut dyn FnMut(Option<&str>) -> Result<CacheUpdate>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let current = tx
                .query_row(
                    "SELECT value FROM cache_entries WHERE key = ?1 AND expires_at_ms > ?2",
                    params![key, now.timestamp_millis()],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            match apply(current.as_deref())? {
                CacheUpdate::Keep => {}
                CacheUpdate::Put { value, expires_at } => {
                    tx.execute(
                        r"
                        INSERT INTO cache_entries(key, value, expires_at_ms)
                        VALUES (?1, ?2, ?3)
                        ON CONFLICT(key) DO UPDATE SET
                          value = excluded.value,
                          expires_at_ms = excluded.expires_at_ms
                        ",
                        params![key, value, expires_at.timestamp_millis()],
                    )?;
                }
                CacheUpdate::Delete => {
                    tx.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
            Ok(affected > 0)
        })
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let affected = conn.execute(
                "DELETE FROM cache_entries WHERE expires_at_ms <= ?1",
                params![now.timestamp_millis()],
            )?;
            Ok(affected)
        })
    }
}
