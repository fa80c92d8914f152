use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter, types::Value};

use crate::error::Result;
use crate::models::{Candidate, CandidateQuery, Offer};
use crate::search::{CandidateSearch, brand_key, name_key, name_tokens};

use super::{SqliteListStore, millis_to_datetime};

const CATALOG_VERSION_KEY: &str = "catalog_version";

impl SqliteListStore {
    /// Inserts or replaces an offer and advances the catalog version, which
    /// marks suggestions of sessions started earlier as stale.
    pub fn upsert_offer(&self, offer: &Offer) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        self.with_tx(|tx| {
            tx.execute(
                r"
                INSERT INTO offers(id, product_id, store_id, name, brand, name_norm, brand_norm, price_cents, valid_from_ms, valid_until_ms, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(id) DO UPDATE SET
                  product_id = excluded.product_id,
                  store_id = excluded.store_id,
                  name = excluded.name,
                  brand = excluded.brand,
                  name_norm = excluded.name_norm,
                  brand_norm = excluded.brand_norm,
                  price_cents = excluded.price_cents,
                  valid_from_ms = excluded.valid_from_ms,
                  valid_until_ms = excluded.valid_until_ms,
                  updated_at = excluded.updated_at
                ",
                params![
                    offer.offer_id,
                    offer.product_id,
                    offer.store_id,
                    offer.name,
                    offer.brand,
                    name_key(&offer.name),
                    offer.brand.as_deref().and_then(brand_key),
                    offer.price_cents,
                    offer.valid_from.timestamp_millis(),
                    offer.valid_until.timestamp_millis(),
                    now
                ],
            )?;
            bump_catalog_version(tx)
        })
    }

    pub fn offer(&self, offer_id: &str) -> Result<Option<Offer>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    r"
                    SELECT id, product_id, store_id, name, brand, price_cents, valid_from_ms, valid_until_ms
                    FROM offers
                    WHERE id = ?1
                    ",
                    params![offer_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, Option<String>>(4)?,
                            row.get::<_, i64>(5)?,
                            row.get::<_, i64>(6)?,
                            row.get::<_, i64>(7)?,
                        ))
                    },
                )
                .optional()?;
            let Some((offer_id, product_id, store_id, name, brand, price_cents, from_ms, until_ms)) =
                row
            else {
                return Ok(None);
            };
            Ok(Some(Offer {
                offer_id,
                product_id,
                store_id,
                name,
                brand,
                price_cents,
                valid_from: millis_to_datetime(from_ms)?,
                valid_until: millis_to_datetime(until_ms)?,
            }))
        })
    }
}

impl CandidateSearch for SqliteListStore {
    fn search_candidates(&self, query: &CandidateQuery) -> Result<Vec<Candidate>> {
        let tokens = name_tokens(&query.name);
        if tokens.is_empty() || query.limit == 0 {
            return Ok(Vec::new());
        }
        if query
            .store_scope
            .as_ref()
            .is_some_and(|stores| stores.is_empty())
        {
            return Ok(Vec::new());
        }

        let at = query.valid_at.timestamp_millis();
        let mut sql = String::from(
            r"
            SELECT id, product_id, store_id, name, brand, price_cents, valid_until_ms
            FROM offers
            WHERE valid_from_ms <= ?1
              AND valid_until_ms > ?1
            ",
        );
        let mut values = vec![Value::Integer(at)];

        let name_clauses = tokens
            .iter()
            .map(|token| {
                values.push(Value::Text(format!("%{token}%")));
                format!("name_norm LIKE ?{}", values.len())
            })
            .collect::<Vec<_>>();
        sql.push_str(&format!("  AND ({})\n", name_clauses.join(" OR ")));

        if let Some(brand) = query.brand.as_deref().and_then(brand_key) {
            values.push(Value::Text(brand));
            sql.push_str(&format!("  AND brand_norm = ?{}\n", values.len()));
        }

        if let Some(stores) = &query.store_scope {
            let placeholders = stores
                .iter()
                .map(|store| {
                    values.push(Value::Text(store.clone()));
                    format!("?{}", values.len())
                })
                .collect::<Vec<_>>();
            sql.push_str(&format!("  AND store_id IN ({})\n", placeholders.join(", ")));
        }

        values.push(Value::Integer(
            i64::try_from(query.limit).unwrap_or(i64::MAX),
        ));
        sql.push_str(&format!("ORDER BY id ASC LIMIT ?{}", values.len()));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            })?;
            let mut candidates = Vec::new();
            for row in rows {
                let (offer_id, product_id, store_id, name, brand, price_cents, until_ms) = row?;
                candidates.push(Candidate {
                    offer_id,
                    product_id,
                    store_id,
                    name,
                    brand,
                    price_cents,
                    valid_until: millis_to_datetime(until_ms)?,
                });
            }
            Ok(candidates)
        })
    }

    fn catalog_version(&self) -> Result<u64> {
        self.with_conn(read_catalog_version)
    }
}

fn read_catalog_version(conn: &Connection) -> Result<u64> {
    let version = conn
        .query_row(
            "SELECT value FROM catalog_meta WHERE key = ?1",
            params![CATALOG_VERSION_KEY],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .unwrap_or(0);
    Ok(u64::try_from(version).unwrap_or(0))
}

fn bump_catalog_version(conn: &Connection) -> Result<u64> {
    conn.execute(
        r"
        INSERT INTO catalog_meta(key, value) VALUES (?1, 1)
        ON CONFLICT(key) DO UPDATE SET value = value + 1
        ",
        params![CATALOG_VERSION_KEY],
    )?;
    read_catalog_version(conn)
}
