use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{CacheUpdate, TtlCache};
use crate::clock::Clock;
use crate::error::{MigrationError, Result};

const KEY_PREFIX: &str = "lock:list:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListLock {
    pub list_id: String,
    pub session_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Per-list migration rights. A lock lapses on its own at `expires_at`, which
/// callers set to the owning session's expiry, so an abandoned session never
/// blocks its list past its lifetime.
#[derive(Clone)]
pub struct LockManager {
    cache: Arc<dyn TtlCache>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager").finish_non_exhaustive()
    }
}

impl LockManager {
    pub fn new(cache: Arc<dyn TtlCache>, clock: Arc<dyn Clock>) -> Self {
        Self { cache, clock }
    }

    /// Atomic check-and-set. Returns `false` when another session holds the
    /// list; re-acquiring a lock the session already holds succeeds.
    pub fn try_acquire(
        &self,
        list_id: &str,
        session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let now = self.clock.now();
        let mut acquired = false;
        self.cache.update(&lock_key(list_id), now, &mut |current| {
            if let Some(raw) = current {
                let held = serde_json::from_str::<ListLock>(raw)?;
                if held.session_id != session_id {
                    debug!(list_id, holder = %held.session_id, "list lock contended");
                    return Ok(CacheUpdate::Keep);
                }
            }
            acquired = true;
            let lock = ListLock {
                list_id: list_id.to_string(),
                session_id: session_id.to_string(),
                acquired_at: now,
                expires_at,
            };
            Ok(CacheUpdate::Put {
                value: serde_json::to_string(&lock)?,
                expires_at,
            })
        })?;
        Ok(acquired)
    }

    pub fn acquire(
        &self,
        list_id: &str,
        session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        if self.try_acquire(list_id, session_id, expires_at)? {
            info!(list_id, session_id, "list lock acquired");
            return Ok(());
        }
        Err(MigrationError::ListLocked(list_id.to_string()))
    }

    /// Idempotent; releasing an unlocked list is a no-op.
    pub fn release(&self, list_id: &str) -> Result<()> {
        if self.cache.delete(&lock_key(list_id))? {
            info!(list_id, "list lock released");
        }
        Ok(())
    }

    /// Releases the lock only while `session_id` still owns it, so a stale
    /// caller cannot drop a lock a newer session has since taken.
    pub fn release_if_held(&self, list_id: &str, session_id: &str) -> Result<bool> {
        let now = self.clock.now();
        let mut released = false;
        self.cache.update(&lock_key(list_id), now, &mut |current| {
            let Some(raw) = current else {
                return Ok(CacheUpdate::Keep);
            };
            let held = serde_json::from_str::<ListLock>(raw)?;
            if held.session_id != session_id {
                return Ok(CacheUpdate::Keep);
            }
            released = true;
            Ok(CacheUpdate::Delete)
        })?;
        if released {
            info!(list_id, session_id, "list lock released");
        }
        Ok(released)
    }
}

fn lock_key(list_id: &str) -> String {
    format!("{KEY_PREFIX}{list_id}")
}
