//! All-or-nothing confirmation of a migration session.
//!
//! Every REPLACE and REMOVE decision is revalidated against the primary store
//! inside the same transaction that writes the migration. The SQLite store
//! opens that transaction with `BEGIN IMMEDIATE`, which takes the database
//! write lock up front; no other writer can change an offer or list item
//! between the revalidation read and the write that depends on it.
//!
//! The session side is claimed first: a confirmation lease is set on the
//! session in the same atomic update that checks it is still mutable. The
//! decisions the plan is built from therefore cannot change underneath it,
//! and cancels or further confirms are refused until the lease is released
//! or lapses.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::TtlCache;
use crate::clock::{Clock, IdGenerator, checked_after};
use crate::config::EngineConfig;
use crate::error::{MigrationError, Result};
use crate::lock::LockManager;
use crate::models::{
    ConfirmResult, ConfirmSummary, DecisionAction, ExpiredItem, ItemError, OfferSnapshot,
    Session, SessionStatus, Suggestion,
};
use crate::session::SessionStore;
use crate::store::{ItemReplacement, ListStore, ListTransaction};

const IDEMPOTENCY_PREFIX: &str = "idempotency:confirm:";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedConfirm {
    session_id: String,
    result: ConfirmResult,
}

/// One resolved expired item, ready to revalidate and write.
#[derive(Debug)]
enum Step<'a> {
    Replace {
        item: &'a ExpiredItem,
        suggestion: &'a Suggestion,
    },
    Remove {
        item: &'a ExpiredItem,
    },
    Keep,
}

#[derive(Clone)]
pub struct ConfirmationEngine {
    sessions: SessionStore,
    store: Arc<dyn ListStore>,
    locks: LockManager,
    cache: Arc<dyn TtlCache>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    idempotency_ttl: Duration,
    lease_ttl: Duration,
}

impl std::fmt::Debug for ConfirmationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationEngine")
            .field("idempotency_ttl", &self.idempotency_ttl)
            .finish_non_exhaustive()
    }
}

impl ConfirmationEngine {
    #[allow(clippy::too_many_arguments, reason = "collaborators are wired once by the service")]
    pub fn new(
        sessions: SessionStore,
        store: Arc<dyn ListStore>,
        locks: LockManager,
        cache: Arc<dyn TtlCache>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            sessions,
            store,
            locks,
            cache,
            clock,
            ids,
            idempotency_ttl: config.idempotency_ttl,
            lease_ttl: config.confirm_lease_ttl,
        }
    }

    /// Confirms `session_id`. A successful result is cached under
    /// `idempotency_key`, and retries with that key return it without running
    /// again. Revalidation failures come back as `success = false` with one
    /// error per item; nothing is written and the session stays ACTIVE.
    pub fn confirm(&self, session_id: &str, idempotency_key: &str) -> Result<ConfirmResult> {
        let idempotency_key = idempotency_key.trim();
        if idempotency_key.is_empty() {
            return Err(MigrationError::Validation(
                "idempotency key must not be empty".to_string(),
            ));
        }
        let cache_key = idempotency_cache_key(idempotency_key);
        if let Some(replayed) = self.cached_result(&cache_key, session_id)? {
            info!(session_id, "confirmation replayed from idempotency cache");
            return Ok(replayed);
        }

        let now = self.clock.now();
        let lease_until = checked_after(now, self.lease_ttl)?;
        let session = self.sessions.update(session_id, &mut |session| {
            session.begin_confirmation(now, lease_until)
        })?;

        let outcome = self.confirm_claimed(&session, &cache_key, now);
        if !matches!(&outcome, Ok(result) if result.success)
            && let Err(err) = self.sessions.update(session_id, &mut |session| {
                session.confirming_until = None;
                Ok(())
            })
        {
            warn!(session_id, error = %err, "failed to release confirmation lease");
        }
        outcome
    }

    fn cached_result(&self, cache_key: &str, session_id: &str) -> Result<Option<ConfirmResult>> {
        let Some(raw) = self.cache.get(cache_key, self.clock.now())? else {
            return Ok(None);
        };
        let cached = serde_json::from_str::<CachedConfirm>(&raw)?;
        if cached.session_id != session_id {
            return Err(MigrationError::Validation(format!(
                "idempotency key already used for session {}",
                cached.session_id
            )));
        }
        Ok(Some(cached.result))
    }

    /// Runs a confirmation on a session whose lease this call holds.
    fn confirm_claimed(
        &self,
        session: &Session,
        cache_key: &str,
        now: DateTime<Utc>,
    ) -> Result<ConfirmResult> {
        let session_id = session.session_id.as_str();
        let cached_until = checked_after(now, self.idempotency_ttl)?;
        let steps = plan(session)?;
        let mut snapshot_ids = Vec::new();
        for step in &steps {
            if !matches!(step, Step::Keep) {
                snapshot_ids.push(self.ids.next_id("snap"));
            }
        }

        let committed = self.store.transaction(&mut |tx| {
            let errors = revalidate(tx, &steps, now)?;
            if !errors.is_empty() {
                return Err(MigrationError::RevalidationFailed(errors));
            }
            let mut snapshot_ids = snapshot_ids.iter();
            for step in &steps {
                let snapshot_id = match step {
                    Step::Keep => continue,
                    _ => snapshot_ids.next().ok_or_else(|| {
                        MigrationError::Internal("snapshot id missing".to_string())
                    })?,
                };
                write_step(tx, session, step, snapshot_id, now)?;
            }
            Ok(())
        });

        match committed {
            Ok(()) => {}
            Err(MigrationError::RevalidationFailed(errors)) => {
                warn!(
                    session_id,
                    failed_items = errors.len(),
                    "confirmation rejected by revalidation"
                );
                return Ok(ConfirmResult {
                    session_id: session_id.to_string(),
                    success: false,
                    summary: summarize(&steps),
                    errors,
                    confirmed_at: None,
                });
            }
            Err(err) => return Err(err),
        }

        let result = ConfirmResult {
            session_id: session_id.to_string(),
            success: true,
            summary: summarize(&steps),
            errors: Vec::new(),
            confirmed_at: Some(now),
        };
        let cached = serde_json::to_string(&CachedConfirm {
            session_id: session_id.to_string(),
            result: result.clone(),
        })?;
        self.cache.put(cache_key, &cached, now, cached_until)?;

        self.locks.release_if_held(&session.list_id, session_id)?;
        self.sessions.update(session_id, &mut |session| {
            session.transition(SessionStatus::Completed, now)
        })?;

        info!(
            session_id,
            list_id = %session.list_id,
            migrated = result.summary.migrated,
            removed = result.summary.removed,
            skipped = result.summary.skipped,
            savings_cents = result.summary.total_savings_cents,
            "confirmation committed"
        );
        Ok(result)
    }
}

fn idempotency_cache_key(idempotency_key: &str) -> String {
    format!(
        "{IDEMPOTENCY_PREFIX}{}",
        blake3::hash(idempotency_key.as_bytes()).to_hex()
    )
}

fn plan(session: &Session) -> Result<Vec<Step<'_>>> {
    session
        .expired_items
        .iter()
        .map(|item| {
            let Some(decision) = session.decisions.get(&item.item_id) else {
                return Ok(Step::Keep);
            };
            match decision.action {
                DecisionAction::Skip => Ok(Step::Keep),
                DecisionAction::Remove => Ok(Step::Remove { item }),
                DecisionAction::Replace => {
                    let suggestion = decision
                        .suggestion_id
                        .as_deref()
                        .and_then(|suggestion_id| item.suggestion(suggestion_id))
                        .ok_or_else(|| {
                            MigrationError::UnknownSuggestion(format!(
                                "{} (item {})",
                                decision.suggestion_id.as_deref().unwrap_or("<none>"),
                                item.item_id
                            ))
                        })?;
                    Ok(Step::Replace { item, suggestion })
                }
            }
        })
        .collect()
}

fn item_error(item: &ExpiredItem, code: &str, message: String) -> ItemError {
    ItemError {
        item_id: item.item_id.clone(),
        code: code.to_string(),
        message,
    }
}

/// Checks that the list item still points at the offer captured at start.
fn check_list_item(tx: &dyn ListTransaction, item: &ExpiredItem) -> Result<Option<ItemError>> {
    let Some(current) = tx.list_item(&item.item_id)? else {
        return Ok(Some(item_error(
            item,
            "ITEM_MISSING",
            "list item no longer exists".to_string(),
        )));
    };
    if current.offer_id != item.offer_id {
        return Ok(Some(item_error(
            item,
            "ITEM_CHANGED",
            format!(
                "list item now references {} instead of {}",
                current.offer_id, item.offer_id
            ),
        )));
    }
    Ok(None)
}

fn revalidate(
    tx: &dyn ListTransaction,
    steps: &[Step<'_>],
    now: DateTime<Utc>,
) -> Result<Vec<ItemError>> {
    let mut errors = Vec::new();
    for step in steps {
        match step {
            Step::Keep => {}
            Step::Replace { item, suggestion } => {
                if let Some(error) = check_list_item(tx, item)? {
                    errors.push(error);
                    continue;
                }
                let Some(offer) = tx.offer_state(&suggestion.offer_id)? else {
                    errors.push(item_error(
                        item,
                        "OFFER_MISSING",
                        format!("offer {} no longer exists", suggestion.offer_id),
                    ));
                    continue;
                };
                if offer.price_cents != suggestion.price_cents {
                    errors.push(item_error(
                        item,
                        "PRICE_CHANGED",
                        format!(
                            "offer {} price changed from {} to {}",
                            suggestion.offer_id, suggestion.price_cents, offer.price_cents
                        ),
                    ));
                } else if offer.valid_until <= now {
                    errors.push(item_error(
                        item,
                        "OFFER_EXPIRED",
                        format!("offer {} expired at {}", suggestion.offer_id, offer.valid_until),
                    ));
                } else if offer.valid_until != suggestion.valid_until {
                    errors.push(item_error(
                        item,
                        "VALIDITY_CHANGED",
                        format!(
                            "offer {} validity moved from {} to {}",
                            suggestion.offer_id, suggestion.valid_until, offer.valid_until
                        ),
                    ));
                }
            }
            Step::Remove { item } => {
                if let Some(error) = check_list_item(tx, item)? {
                    errors.push(error);
                    continue;
                }
                let Some(offer) = tx.offer_state(&item.offer_id)? else {
                    continue;
                };
                if offer.price_cents != item.price_cents {
                    errors.push(item_error(
                        item,
                        "PRICE_CHANGED",
                        format!(
                            "offer {} price changed from {} to {}",
                            item.offer_id, item.price_cents, offer.price_cents
                        ),
                    ));
                } else if offer.valid_until != item.valid_until {
                    errors.push(item_error(
                        item,
                        "VALIDITY_CHANGED",
                        format!(
                            "offer {} validity moved from {} to {}",
                            item.offer_id, item.valid_until, offer.valid_until
                        ),
                    ));
                }
            }
        }
    }
    Ok(errors)
}

fn write_step(
    tx: &dyn ListTransaction,
    session: &Session,
    step: &Step<'_>,
    snapshot_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let (item, action, replacement) = match step {
        Step::Keep => return Ok(()),
        Step::Replace { item, suggestion } => (*item, DecisionAction::Replace, Some(*suggestion)),
        Step::Remove { item } => (*item, DecisionAction::Remove, None),
    };
    let (price_cents, valid_until) = tx
        .offer_state(&item.offer_id)?
        .map_or((item.price_cents, item.valid_until), |offer| {
            (offer.price_cents, offer.valid_until)
        });
    tx.insert_snapshot(&OfferSnapshot {
        snapshot_id: snapshot_id.to_string(),
        session_id: session.session_id.clone(),
        list_id: session.list_id.clone(),
        list_item_id: item.item_id.clone(),
        offer_id: item.offer_id.clone(),
        action,
        price_cents,
        valid_until,
        replacement_offer_id: replacement.map(|suggestion| suggestion.offer_id.clone()),
        captured_at: now,
    })?;
    match replacement {
        Some(suggestion) => tx.replace_item_offer(
            &item.item_id,
            &ItemReplacement {
                offer_id: suggestion.offer_id.clone(),
                name: suggestion.name.clone(),
                brand: suggestion.brand.clone(),
            },
            now,
        ),
        None => tx.delete_item(&item.item_id),
    }
}

fn summarize(steps: &[Step<'_>]) -> ConfirmSummary {
    let mut summary = ConfirmSummary::default();
    let mut stores = BTreeSet::new();
    for step in steps {
        match step {
            Step::Keep => summary.skipped += 1,
            Step::Remove { .. } => summary.removed += 1,
            Step::Replace { item, suggestion } => {
                summary.migrated += 1;
                let per_unit = item.price_cents.saturating_sub(suggestion.price_cents);
                summary.total_savings_cents = summary
                    .total_savings_cents
                    .saturating_add(per_unit.saturating_mul(i64::from(item.quantity)));
                stores.insert(suggestion.store_id.clone());
            }
        }
    }
    summary.stores_used = stores.into_iter().collect();
    summary
}
