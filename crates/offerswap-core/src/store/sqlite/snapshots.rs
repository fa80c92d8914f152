use rusqlite::{Connection, params};

use crate::error::{MigrationError, Result};
use crate::models::{DecisionAction, OfferSnapshot};

use super::{SqliteListStore, millis_to_datetime};

impl SqliteListStore {
    pub fn snapshots_for_list(&self, list_id: &str) -> Result<Vec<OfferSnapshot>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r"
                SELECT id, session_id, list_id, list_item_id, offer_id, action, price_cents,
                       valid_until_ms, replacement_offer_id, captured_at
                FROM offer_snapshots
                WHERE list_id = ?1
                ORDER BY captured_at ASC, id ASC
                ",
            )?;
            let rows = stmt.query_map(params![list_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, String>(9)?,
                ))
            })?;

            let mut snapshots = Vec::new();
            for row in rows {
                let (
                    snapshot_id,
                    session_id,
                    list_id,
                    list_item_id,
                    offer_id,
                    action,
                    price_cents,
                    valid_until_ms,
                    replacement_offer_id,
                    captured_at,
                ) = row?;
                let action = DecisionAction::parse(&action).ok_or_else(|| {
                    MigrationError::Internal(format!("unknown snapshot action: {action}"))
                })?;
                let captured_at = chrono::DateTime::parse_from_rfc3339(&captured_at)
                    .map_err(|err| {
                        MigrationError::Internal(format!("invalid snapshot timestamp: {err}"))
                    })?
                    .with_timezone(&chrono::Utc);
                snapshots.push(OfferSnapshot {
                    snapshot_id,
                    session_id,
                    list_id,
                    list_item_id,
                    offer_id,
                    action,
                    price_cents,
                    valid_until: millis_to_datetime(valid_until_ms)?,
                    replacement_offer_id,
                    captured_at,
                });
            }
            Ok(snapshots)
        })
    }
}

pub(super) fn insert_snapshot(conn: &Connection, snapshot: &OfferSnapshot) -> Result<()> {
    conn.execute(
        r"
        INSERT INTO offer_snapshots(
            id, session_id, list_id, list_item_id, offer_id, action, price_cents,
            valid_until_ms, replacement_offer_id, captured_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ",
        params![
            snapshot.snapshot_id,
            snapshot.session_id,
            snapshot.list_id,
            snapshot.list_item_id,
            snapshot.offer_id,
            snapshot.action.as_str(),
            snapshot.price_cents,
            snapshot.valid_until.timestamp_millis(),
            snapshot.replacement_offer_id,
            snapshot
                .captured_at
                .to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
        ],
    )?;
    Ok(())
}
