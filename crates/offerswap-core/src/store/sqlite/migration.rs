use rusqlite::{Connection, params};

use crate::error::{MigrationError, Result};
use crate::search::{brand_key, name_key};

use super::SqliteListStore;

const MIGRATION_SCHEMA_SQL: &str = r"
    PRAGMA journal_mode = WAL;
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS shopping_lists (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS offers (
        id TEXT PRIMARY KEY,
        product_id TEXT NOT NULL,
        store_id TEXT NOT NULL,
        name TEXT NOT NULL,
        brand TEXT,
        name_norm TEXT,
        brand_norm TEXT,
        price_cents INTEGER NOT NULL,
        valid_from_ms INTEGER NOT NULL,
        valid_until_ms INTEGER NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_offers_validity
    ON offers(valid_until_ms, valid_from_ms);
    CREATE INDEX IF NOT EXISTS idx_offers_store ON offers(store_id);

    CREATE TABLE IF NOT EXISTS list_items (
        id TEXT PRIMARY KEY,
        list_id TEXT NOT NULL,
        offer_id TEXT NOT NULL,
        name TEXT NOT NULL,
        brand TEXT,
        quantity INTEGER NOT NULL DEFAULT 1,
        position INTEGER NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY (list_id) REFERENCES shopping_lists(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_list_items_list ON list_items(list_id, position);

    CREATE TABLE IF NOT EXISTS offer_snapshots (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        list_id TEXT NOT NULL,
        list_item_id TEXT NOT NULL,
        offer_id TEXT NOT NULL,
        action TEXT NOT NULL,
        price_cents INTEGER NOT NULL,
        valid_until_ms INTEGER NOT NULL,
        replacement_offer_id TEXT,
        captured_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_offer_snapshots_list
    ON offer_snapshots(list_id, captured_at);

    CREATE TABLE IF NOT EXISTS catalog_meta (
        key TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    );

    INSERT OR IGNORE INTO catalog_meta(key, value) VALUES ('catalog_version', 0);
";

impl SqliteListStore {
    pub fn migrate(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| MigrationError::mutex_poisoned("sqlite"))?;
        conn.execute_batch(MIGRATION_SCHEMA_SQL)?;
        for column in ["name_norm", "brand_norm"] {
            if !has_column(&conn, "offers", column)? {
                conn.execute(&format!("ALTER TABLE offers ADD COLUMN {column} TEXT"), [])?;
            }
        }
        backfill_offer_keys(&conn)?;
        drop(conn);
        Ok(())
    }
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for row in rows {
        if row? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Fills search keys for offers written before the key columns existed.
/// SQLite's own `lower()` only folds ASCII, so the keys are computed here.
fn backfill_offer_keys(conn: &Connection) -> Result<()> {
    let pending = {
        let mut stmt = conn.prepare("SELECT id, name, brand FROM offers WHERE name_norm IS NULL")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };
    for (offer_id, name, brand) in pending {
        conn.execute(
            "UPDATE offers SET name_norm = ?1, brand_norm = ?2 WHERE id = ?3",
            params![name_key(&name), brand.as_deref().and_then(brand_key), offer_id],
        )?;
    }
    Ok(())
}
