use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};

use crate::error::{MigrationError, Result};

use super::{ListStore, ListTransaction};

mod catalog;
mod lists;
mod migration;
mod snapshots;
mod transaction;

use self::transaction::SqliteListTransaction;

const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// SQLite-backed primary store. Confirmation writes run in `BEGIN IMMEDIATE`
/// transactions, so revalidation reads and the writes that follow them hold
/// the database write lock together.
#[derive(Clone)]
pub struct SqliteListStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteListStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteListStore").finish_non_exhaustive()
    }
}

impl SqliteListStore {
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| MigrationError::mutex_poisoned("sqlite"))?;
        f(&conn)
    }

    fn with_tx<T>(&self, f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| MigrationError::mutex_poisoned("sqlite"))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        drop(conn);
        Ok(value)
    }

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
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }
}

impl ListStore for SqliteListStore {
    fn list_owner(&self, list_id: &str) -> Result<Option<String>> {
        self.owner_of(list_id)
    }

    fn expired_items(
        &self,
        list_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<crate::models::ExpiredListItem>> {
        self.expired_list_items(list_id, at)
    }

    fn transaction(
        &self,
        work: &mut dyn FnMut(&dyn ListTransaction) -> Result<()>,
    ) -> Result<()> {
        self.with_tx(|tx| work(&SqliteListTransaction::new(tx)))
    }
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| MigrationError::Internal(format!("timestamp out of range: {ms}")))
}
