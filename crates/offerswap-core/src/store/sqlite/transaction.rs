use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Transaction, params};

use crate::error::{MigrationError, Result};
use crate::models::{ListItem, OfferSnapshot, OfferState};
use crate::store::{ItemReplacement, ListTransaction};

use super::lists::list_item_from_row;
use super::millis_to_datetime;
use super::snapshots::insert_snapshot;

pub(super) struct SqliteListTransaction<'a> {
    tx: &'a Transaction<'a>,
}

impl<'a> SqliteListTransaction<'a> {
    pub(super) const fn new(tx: &'a Transaction<'a>) -> Self {
        Self { tx }
    }
}

impl ListTransaction for SqliteListTransaction<'_> {
    fn list_item(&self, item_id: &str) -> Result<Option<ListItem>> {
        let item = self
            .tx
            .query_row(
                r"
                SELECT id, list_id, offer_id, name, brand, quantity
                FROM list_items
                WHERE id = ?1
                ",
                params![item_id],
                list_item_from_row,
            )
            .optional()?;
        Ok(item)
    }

    fn offer_state(&self, offer_id: &str) -> Result<Option<OfferState>> {
        let row = self
            .tx
            .query_row(
                "SELECT id, store_id, price_cents, valid_until_ms FROM offers WHERE id = ?1",
                params![offer_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(offer_id, store_id, price_cents, until_ms)| {
            Ok(OfferState {
                offer_id,
                store_id,
                price_cents,
                valid_until: millis_to_datetime(until_ms)?,
            })
        })
        .transpose()
    }

    fn insert_snapshot(&self, snapshot: &OfferSnapshot) -> Result<()> {
        insert_snapshot(self.tx, snapshot)
    }

    fn replace_item_offer(
        &self,
        item_id: &str,
        replacement: &ItemReplacement,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let affected = self.tx.execute(
            r"
            UPDATE list_items
            SET offer_id = ?2, name = ?3, brand = ?4, updated_at = ?5
            WHERE id = ?1
            ",
            params![
                item_id,
                replacement.offer_id,
                replacement.name,
                replacement.brand,
                at.to_rfc3339()
            ],
        )?;
        if affected == 0 {
            return Err(MigrationError::Internal(format!(
                "list item vanished during replace: {item_id}"
            )));
        }
        Ok(())
    }

    fn delete_item(&self, item_id: &str) -> Result<()> {
        let affected = self
            .tx
            .execute("DELETE FROM list_items WHERE id = ?1", params![item_id])?;
        if affected == 0 {
            return Err(MigrationError::Internal(format!(
                "list item vanished during remove: {item_id}"
            )));
        }
        Ok(())
    }
}
