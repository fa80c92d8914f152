use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::clock::checked_after;
use crate::config::MAX_STORES_CEILING;
use crate::error::{MigrationError, Result};
use crate::models::{ExpiredItem, ExpiredListItem, Session, SessionStatus};
use crate::store_selector::{ItemCoverage, select_stores};
use crate::suggestion::RankedSuggestions;

use super::MigrationService;

impl MigrationService {
    /// Opens a migration session for the expired items of `list_id`.
    ///
    /// Fails with `ListNotFound`, `PermissionDenied`, `RateLimitExceeded`,
    /// `ListLocked` or `NoExpiredItems`. Once the list lock is taken, any
    /// later failure gives it back.
    pub fn start_session(
        &self,
        user_id: &str,
        list_id: &str,
        max_stores: Option<usize>,
    ) -> Result<Session> {
        let user_id = required(user_id, "user id")?;
        let list_id = required(list_id, "list id")?;
        let max_stores = match max_stores {
            Some(0) => {
                return Err(MigrationError::Validation(
                    "max stores must be at least 1".to_string(),
                ));
            }
            Some(requested) => requested.min(MAX_STORES_CEILING),
            None => self.config.default_max_stores,
        };
        let now = self.clock.now();
        let expires_at = checked_after(now, self.config.session_ttl)?;

        match self.store.list_owner(list_id)? {
            None => return Err(MigrationError::ListNotFound(list_id.to_string())),
            Some(owner) if owner != user_id => {
                return Err(MigrationError::PermissionDenied(format!(
                    "list {list_id} does not belong to {user_id}"
                )));
            }
            Some(_) => {}
        }

        self.rate_limiter.check_and_increment(user_id)?;

        let session_id = self.ids.next_id("ses");
        self.locks.acquire(list_id, &session_id, expires_at)?;

        match self.open_session(&session_id, user_id, list_id, max_stores, now, expires_at) {
            Ok(session) => {
                info!(
                    session_id = %session.session_id,
                    list_id,
                    user_id,
                    expired_items = session.expired_items.len(),
                    stores = ?session.selected_stores.stores,
                    coverage_pct = session.selected_stores.coverage_pct,
                    "migration session started"
                );
                Ok(session)
            }
            Err(err) => {
                if let Err(release_err) = self.locks.release_if_held(list_id, &session_id) {
                    warn!(
                        list_id,
                        session_id = %session_id,
                        error = %release_err,
                        "failed to release list lock"
                    );
                }
                Err(err)
            }
        }
    }

    fn open_session(
        &self,
        session_id: &str,
        user_id: &str,
        list_id: &str,
        max_stores: usize,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Session> {
        let catalog_version = self.search.catalog_version()?;
        let expired = self.store.expired_items(list_id, now)?;
        if expired.is_empty() {
            return Err(MigrationError::NoExpiredItems(list_id.to_string()));
        }

        let ranked = self.suggestions.suggest_all(&expired, now)?;
        let coverage = ranked
            .iter()
            .map(|ranked| {
                ItemCoverage::from_suggestions(ranked.item_id.clone(), &ranked.suggestions)
            })
            .collect::<Vec<_>>();
        let selected_stores = select_stores(&coverage, max_stores);
        let expired_items = expired
            .into_iter()
            .zip(ranked)
            .map(|(entry, ranked)| expired_item(entry, ranked, &selected_stores.stores))
            .collect();

        let session = Session {
            session_id: session_id.to_string(),
            list_id: list_id.to_string(),
            user_id: user_id.to_string(),
            status: SessionStatus::Active,
            expired_items,
            decisions: BTreeMap::new(),
            selected_stores,
            catalog_version,
            suggestions_stale: false,
            confirming_until: None,
            started_at: now,
            expires_at,
            updated_at: now,
        };
        self.sessions.create(&session)?;
        Ok(session)
    }
}

/// Keeps only suggestions from the selected stores, in ranked order.
fn expired_item(
    entry: ExpiredListItem,
    ranked: RankedSuggestions,
    stores: &[String],
) -> ExpiredItem {
    let ExpiredListItem { item, offer } = entry;
    ExpiredItem {
        item_id: item.item_id,
        offer_id: item.offer_id,
        name: item.name,
        brand: item.brand,
        store_id: offer.store_id,
        price_cents: offer.price_cents,
        valid_until: offer.valid_until,
        quantity: item.quantity,
        suggestions: ranked
            .suggestions
            .into_iter()
            .filter(|suggestion| stores.contains(&suggestion.store_id))
            .collect(),
    }
}

fn required<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(MigrationError::Validation(format!("{what} must not be empty")));
    }
    Ok(value)
}
