use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::{MemoryTtlCache, SqliteTtlCache, TtlCache};
use crate::clock::{Clock, IdGenerator, SystemClock, UuidIds};
use crate::config::{CacheBackend, EngineConfig};
use crate::confirm::ConfirmationEngine;
use crate::decision::DecisionRecorder;
use crate::error::Result;
use crate::lock::LockManager;
use crate::rate_limit::RateLimiter;
use crate::search::CandidateSearch;
use crate::session::SessionStore;
use crate::store::{ListStore, SqliteListStore};
use crate::suggestion::SuggestionEngine;

mod confirm_service;
mod decision_service;
mod session_service;
mod start_service;

const LIST_DB_FILE: &str = "lists.sqlite3";
const CACHE_DB_FILE: &str = "cache.sqlite3";

/// Entry point for the six migration operations.
#[derive(Clone)]
pub struct MigrationService {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    store: Arc<dyn ListStore>,
    search: Arc<dyn CandidateSearch>,
    cache: Arc<dyn TtlCache>,
    rate_limiter: RateLimiter,
    locks: LockManager,
    suggestions: SuggestionEngine,
    sessions: SessionStore,
    decisions: DecisionRecorder,
    confirmations: ConfirmationEngine,
}

impl std::fmt::Debug for MigrationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MigrationService {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn ListStore>,
        search: Arc<dyn CandidateSearch>,
        cache: Arc<dyn TtlCache>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(cache.clone(), clock.clone(), config.rate_limit);
        let locks = LockManager::new(cache.clone(), clock.clone());
        let suggestions = SuggestionEngine::new(search.clone(), &config);
        let sessions = SessionStore::new(
            cache.clone(),
            search.clone(),
            clock.clone(),
            config.session_retention_grace,
        );
        let decisions = DecisionRecorder::new(sessions.clone(), clock.clone());
        let confirmations = ConfirmationEngine::new(
            sessions.clone(),
            store.clone(),
            locks.clone(),
            cache.clone(),
            clock.clone(),
            ids.clone(),
            &config,
        );
        Self {
            config,
            clock,
            ids,
            store,
            search,
            cache,
            rate_limiter,
            locks,
            suggestions,
            sessions,
            decisions,
            confirmations,
        }
    }

    /// Wires the SQLite primary store as both list store and candidate search.
    pub fn with_sqlite_store(
        config: EngineConfig,
        store: SqliteListStore,
        cache: Arc<dyn TtlCache>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let store = Arc::new(store);
        Self::new(config, store.clone(), store, cache, clock, ids)
    }

    /// Opens (creating if needed) a data root holding the primary store and,
    /// for the SQLite backend, the cache file next to it.
    pub fn open(
        root_dir: impl Into<PathBuf>,
        config: EngineConfig,
        backend: CacheBackend,
    ) -> Result<(Self, SqliteListStore)> {
        let root = root_dir.into();
        fs::create_dir_all(&root)?;
        let store = SqliteListStore::open(root.join(LIST_DB_FILE))?;
        let cache: Arc<dyn TtlCache> = match backend {
            CacheBackend::Sqlite => Arc::new(SqliteTtlCache::open(root.join(CACHE_DB_FILE))?),
            CacheBackend::Memory => Arc::new(MemoryTtlCache::new()),
        };
        let service = Self::with_sqlite_store(
            config,
            store.clone(),
            cache,
            Arc::new(SystemClock),
            Arc::new(UuidIds),
        );
        Ok((service, store))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Drops cache entries whose expiry has passed.
    pub fn purge_expired(&self) -> Result<usize> {
        self.cache.purge_expired(self.clock.now())
    }
}
