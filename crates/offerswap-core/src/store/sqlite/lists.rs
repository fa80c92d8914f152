use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use crate::error::{MigrationError, Result};
use crate::models::{ExpiredListItem, ListItem, OfferState};

use super::{SqliteListStore, millis_to_datetime};

impl SqliteListStore {
    pub fn create_list(&self, list_id: &str, owner_id: &str, name: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            let inserted = conn.execute(
                r"
                INSERT OR IGNORE INTO shopping_lists(id, owner_id, name, created_at)
                VALUES (?1, ?2, ?3, ?4)
                ",
                params![list_id, owner_id, name, now],
            )?;
            if inserted == 0 {
                return Err(MigrationError::Conflict(format!(
                    "list already exists: {list_id}"
                )));
            }
            Ok(())
        })
    }

    pub fn owner_of(&self, list_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let owner = conn
                .query_row(
                    "SELECT owner_id FROM shopping_lists WHERE id = ?1",
                    params![list_id],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(owner)
        })
    }

    /// Appends `item` to the end of its list.
    pub fn add_list_item(&self, item: &ListItem) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.with_tx(|tx| {
            let position = tx.query_row(
                "SELECT COALESCE(MAX(position), -1) + 1 FROM list_items WHERE list_id = ?1",
                params![item.list_id],
                |row| row.get::<_, i64>(0),
            )?;
            tx.execute(
                r"
                INSERT INTO list_items(id, list_id, offer_id, name, brand, quantity, position, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ",
                params![
                    item.item_id,
                    item.list_id,
                    item.offer_id,
                    item.name,
                    item.brand,
                    i64::from(item.quantity),
                    position,
                    now
                ],
            )?;
            Ok(())
        })
    }

    pub fn list_items(&self, list_id: &str) -> Result<Vec<ListItem>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r"
                SELECT id, list_id, offer_id, name, brand, quantity
                FROM list_items
                WHERE list_id = ?1
                ORDER BY position ASC, id ASC
                ",
            )?;
            let rows = stmt.query_map(params![list_id], list_item_from_row)?;
            let mut items = Vec::new();
            for item in rows {
                items.push(item?);
            }
            Ok(items)
        })
    }

    pub(super) fn expired_list_items(
        &self,
        list_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<ExpiredListItem>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r"
                SELECT li.id, li.list_id, li.offer_id, li.name, li.brand, li.quantity,
                       o.store_id, o.price_cents, o.valid_until_ms
                FROM list_items li
                JOIN offers o ON o.id = li.offer_id
                WHERE li.list_id = ?1
                  AND o.valid_until_ms <= ?2
                ORDER BY li.position ASC, li.id ASC
                ",
            )?;
            let rows = stmt.query_map(params![list_id, at.timestamp_millis()], |row| {
                Ok((
                    list_item_from_row(row)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, i64>(8)?,
                ))
            })?;
            let mut items = Vec::new();
            for row in rows {
                let (item, store_id, price_cents, valid_until_ms) = row?;
                let offer = OfferState {
                    offer_id: item.offer_id.clone(),
                    store_id,
                    price_cents,
                    valid_until: millis_to_datetime(valid_until_ms)?,
                };
                items.push(ExpiredListItem { item, offer });
            }
            Ok(items)
        })
    }
}

pub(super) fn list_item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ListItem> {
    let quantity = row.get::<_, i64>(5)?;
    Ok(ListItem {
        item_id: row.get(0)?,
        list_id: row.get(1)?,
        offer_id: row.get(2)?,
        name: row.get(3)?,
        brand: row.get(4)?,
        quantity: u32::try_from(quantity).unwrap_or(1),
    })
}
