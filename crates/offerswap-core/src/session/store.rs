use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use crate::cache::{CacheUpdate, TtlCache};
use crate::clock::{Clock, checked_after};
use crate::error::{MigrationError, Result};
use crate::models::Session;
use crate::search::CandidateSearch;

const KEY_PREFIX: &str = "session:";

/// Session state kept in the TTL cache, never in the primary store.
///
/// A session's cache entry lives until `expires_at` plus a retention grace,
/// so an expired session keeps reading back as such for a while instead of
/// vanishing the instant its TTL passes. Saving never extends that deadline.
#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<dyn TtlCache>,
    search: Arc<dyn CandidateSearch>,
    clock: Arc<dyn Clock>,
    retention_grace: Duration,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("retention_grace", &self.retention_grace)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(
        cache: Arc<dyn TtlCache>,
        search: Arc<dyn CandidateSearch>,
        clock: Arc<dyn Clock>,
        retention_grace: Duration,
    ) -> Self {
        Self {
            cache,
            search,
            clock,
            retention_grace,
        }
    }

    /// Stores a new session; an existing live entry under the same id is a
    /// `Conflict`.
    pub fn create(&self, session: &Session) -> Result<()> {
        let raw = serde_json::to_string(session)?;
        let inserted = self.cache.put_if_absent(
            &session_key(&session.session_id),
            &raw,
            self.clock.now(),
            checked_after(session.expires_at, self.retention_grace)?,
        )?;
        if !inserted {
            return Err(MigrationError::Conflict(format!(
                "session already exists: {}",
                session.session_id
            )));
        }
        Ok(())
    }

    /// Reads a session and flags its suggestions as stale when the catalog
    /// moved on since the session started.
    pub fn get(&self, session_id: &str) -> Result<Session> {
        let raw = self
            .cache
            .get(&session_key(session_id), self.clock.now())?
            .ok_or_else(|| MigrationError::SessionNotFound(session_id.to_string()))?;
        let mut session = serde_json::from_str::<Session>(&raw)?;
        self.mark_staleness(&mut session)?;
        Ok(session)
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        let raw = serde_json::to_string(session)?;
        self.cache.put(
            &session_key(&session.session_id),
            &raw,
            self.clock.now(),
            checked_after(session.expires_at, self.retention_grace)?,
        )
    }

    pub fn delete(&self, session_id: &str) -> Result<bool> {
        self.cache.delete(&session_key(session_id))
    }

    /// Atomic read-modify-write. `apply` sees the live session; when it
    /// returns an error nothing is written, and when it leaves the session
    /// unchanged the entry is not rewritten.
    pub fn update(
        &self,
        session_id: &str,
        apply: &mut dyn FnMut(&mut Session) -> Result<()>,
    ) -> Result<Session> {
        let retention_grace = self.retention_grace;
        let mut updated = None;
        self.cache
            .update(&session_key(session_id), self.clock.now(), &mut |current| {
                let raw = current
                    .ok_or_else(|| MigrationError::SessionNotFound(session_id.to_string()))?;
                let mut session = serde_json::from_str::<Session>(raw)?;
                apply(&mut session)?;
                let next = serde_json::to_string(&session)?;
                let outcome = if next == raw {
                    debug!(session_id, "session unchanged");
                    CacheUpdate::Keep
                } else {
                    CacheUpdate::Put {
                        value: next,
                        expires_at: checked_after(session.expires_at, retention_grace)?,
                    }
                };
                updated = Some(session);
                Ok(outcome)
            })?;
        let mut session = updated.ok_or_else(|| {
            MigrationError::Internal(format!("session update produced no value: {session_id}"))
        })?;
        self.mark_staleness(&mut session)?;
        Ok(session)
    }

    fn mark_staleness(&self, session: &mut Session) -> Result<()> {
        if !session.status.is_terminal() {
            let current = self.search.catalog_version()?;
            session.suggestions_stale = current > session.catalog_version;
        }
        Ok(())
    }
}

fn session_key(session_id: &str) -> String {
    format!("{KEY_PREFIX}{session_id}")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    use chrono::{DateTime, TimeZone, Utc};

    use crate::cache::MemoryTtlCache;
    use crate::clock::ManualClock;
    use crate::models::{Candidate, CandidateQuery, SelectedStores, SessionStatus};

    use super::*;

    #[derive(Default)]
    struct VersionOnly {
        version: AtomicU64,
    }

    impl CandidateSearch for VersionOnly {
        fn search_candidates(&self, _query: &CandidateQuery) -> Result<Vec<Candidate>> {
            Ok(Vec::new())
        }

        fn catalog_version(&self) -> Result<u64> {
            Ok(self.version.load(Ordering::SeqCst))
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 18, 0, 0)
            .single()
            .expect("timestamp")
    }

    fn fixture() -> (SessionStore, Arc<ManualClock>, Arc<VersionOnly>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let search = Arc::new(VersionOnly::default());
        search.version.store(3, Ordering::SeqCst);
        let store = SessionStore::new(
            Arc::new(MemoryTtlCache::new()),
            search.clone(),
            clock.clone(),
            Duration::minutes(10),
        );
        (store, clock, search)
    }

    fn session(id: &str) -> Session {
        Session {
            session_id: id.to_string(),
            list_id: "list-1".to_string(),
            user_id: "user-1".to_string(),
            status: SessionStatus::Active,
            expired_items: Vec::new(),
            decisions: BTreeMap::new(),
            selected_stores: SelectedStores::default(),
            catalog_version: 3,
            suggestions_stale: false,
            confirming_until: None,
            started_at: t0(),
            expires_at: t0() + Duration::minutes(30),
            updated_at: t0(),
        }
    }

    #[test]
    fn create_then_get_round_trips_and_rejects_duplicates() {
        let (store, _clock, _search) = fixture();
        store.create(&session("ses-1")).expect("create");
        assert_eq!(store.get("ses-1").expect("get"), session("ses-1"));
        let err = store.create(&session("ses-1")).expect_err("duplicate");
        assert!(matches!(err, MigrationError::Conflict(_)));
        assert!(matches!(
            store.get("ses-missing"),
            Err(MigrationError::SessionNotFound(_))
        ));
    }

    #[test]
    fn catalog_advance_marks_suggestions_stale() {
        let (store, _clock, search) = fixture();
        store.create(&session("ses-1")).expect("create");
        search.version.store(4, Ordering::SeqCst);
        assert!(store.get("ses-1").expect("get").suggestions_stale);
    }

    #[test]
    fn expired_session_stays_readable_through_the_grace_window() {
        let (store, clock, _search) = fixture();
        store.create(&session("ses-1")).expect("create");
        clock.advance(Duration::minutes(35));
        assert_eq!(store.get("ses-1").expect("in grace").status, SessionStatus::Active);
        clock.advance(Duration::minutes(10));
        assert!(matches!(
            store.get("ses-1"),
            Err(MigrationError::SessionNotFound(_))
        ));
    }

    #[test]
    fn save_overwrites_without_extending_retention() {
        let (store, clock, _search) = fixture();
        let mut saved = session("ses-1");
        store.save(&saved).expect("save new");
        saved.selected_stores = SelectedStores {
            stores: vec!["s-1".to_string()],
            covered_items: 1,
            total_items: 1,
            coverage_pct: 100.0,
        };
        clock.advance(Duration::minutes(20));
        store.save(&saved).expect("save again");
        assert_eq!(store.get("ses-1").expect("get"), saved);

        clock.advance(Duration::minutes(20) + Duration::seconds(1));
        assert!(matches!(
            store.get("ses-1"),
            Err(MigrationError::SessionNotFound(_))
        ));
    }

    #[test]
    fn failed_update_writes_nothing() {
        let (store, clock, _search) = fixture();
        store.create(&session("ses-1")).expect("create");
        let err = store
            .update("ses-1", &mut |session| {
                session.user_id = "someone-else".to_string();
                Err(MigrationError::Validation("rejected".to_string()))
            })
            .expect_err("rejected");
        assert!(matches!(err, MigrationError::Validation(_)));
        assert_eq!(store.get("ses-1").expect("get").user_id, "user-1");

        let now = clock.now();
        let updated = store
            .update("ses-1", &mut |session| session.transition(SessionStatus::Cancelled, now))
            .expect("cancel");
        assert_eq!(updated.status, SessionStatus::Cancelled);
        assert_eq!(store.get("ses-1").expect("get").status, SessionStatus::Cancelled);
        assert!(store.delete("ses-1").expect("delete"));
        assert!(!store.delete("ses-1").expect("delete again"));
    }
}
