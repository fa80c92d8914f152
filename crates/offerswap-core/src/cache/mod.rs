//! Process-external, TTL-keyed key-value storage for short-lived migration
//! state (sessions, list locks, rate counters, idempotency results).
//!
//! Every entry carries an absolute expiry instant. Readers pass the current
//! instant so an entry past its expiry reads as absent even before it is
//! physically reclaimed.

use chrono::{DateTime, Utc};

use crate::error::Result;

mod memory;
mod sqlite;

pub use memory::MemoryTtlCache;
pub use sqlite::SqliteTtlCache;

/// Outcome of an atomic read-modify-write callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheUpdate {
    Keep,
    Put {
        value: String,
        expires_at: DateTime<Utc>,
    },
    Delete,
}

pub trait TtlCache: Send + Sync {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<String>>;

    /// Runs `apply` against the live value of `key` and writes its outcome,
    /// all inside one critical section of the backing store. An error from
    /// `apply` leaves the entry untouched.
    fn update(
        &self,
        key: &str,
        now: DateTime<Utc>,
        apply: &mut dyn FnMut(Option<&str>) -> Result<CacheUpdate>,
    ) -> Result<()>;

    fn delete(&self, key: &str) -> Result<bool>;

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    fn put(
        &self,
        key: &str,
        value: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.update(key, now, &mut |_| {
            Ok(CacheUpdate::Put {
                value: value.to_string(),
                expires_at,
            })
        })
    }

    fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inserted = false;
        self.update(key, now, &mut |current| {
            if current.is_some() {
                return Ok(CacheUpdate::Keep);
            }
            inserted = true;
            Ok(CacheUpdate::Put {
                value: value.to_string(),
                expires_at,
            })
        })?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests;
