use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::{MigrationError, Result};

use super::{CacheUpdate, TtlCache};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-process cache; expired entries are evicted lazily on access.
#[derive(Debug, Default)]
pub struct MemoryTtlCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryTtlCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> Result<T>) -> Result<T> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| MigrationError::mutex_poisoned("memory cache"))?;
        f(&mut entries)
    }
}

impl TtlCache for MemoryTtlCache {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<String>> {
        self.with_entries(|entries| {
            let live = entries
                .get(key)
                .filter(|entry| entry.expires_at > now)
                .map(|entry| entry.value.clone());
            if live.is_none() {
                entries.remove(key);
            }
            Ok(live)
        })
    }

    fn update(
        &self,
        key: &str,
        now: DateTime<Utc>,
        apply: &mut dyn FnMut(Option<&str>) -> Result<CacheUpdate>,
    ) -> Result<()> {
        self.with_entries(|entries| {
            let current = entries
                .get(key)
                .filter(|entry| entry.expires_at > now)
                .map(|entry| entry.value.clone());
            match apply(current.as_deref())? {
                CacheUpdate::Keep => {
                    if current.is_none() {
                        entries.remove(key);
                    }
                }
                CacheUpdate::Put { value, expires_at } => {
                    entries.insert(key.to_string(), Entry { value, expires_at });
                }
                CacheUpdate::Delete => {
                    entries.remove(key);
                }
            }
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.with_entries(|entries| Ok(entries.remove(key).is_some()))
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_entries(|entries| {
            let before = entries.len();
            entries.retain(|_, entry| entry.expires_at > now);
            Ok(before - entries.len())
        })
    }
}
