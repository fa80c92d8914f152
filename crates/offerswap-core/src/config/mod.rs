use chrono::Duration;

use crate::error::{MigrationError, Result};

mod env;

use self::env::{read_env_secs, read_env_u32, read_env_usize, read_non_empty_env};

const ENV_SESSION_TTL_SECS: &str = "OFFERSWAP_SESSION_TTL_SECS";
const ENV_SESSION_RETENTION_GRACE_SECS: &str = "OFFERSWAP_SESSION_RETENTION_GRACE_SECS";
const ENV_RATE_LIMIT_MAX_STARTS: &str = "OFFERSWAP_RATE_LIMIT_MAX_STARTS";
const ENV_RATE_LIMIT_WINDOW_SECS: &str = "OFFERSWAP_RATE_LIMIT_WINDOW_SECS";
const ENV_DEFAULT_MAX_STORES: &str = "OFFERSWAP_DEFAULT_MAX_STORES";
const ENV_SUGGESTIONS_PER_ITEM: &str = "OFFERSWAP_SUGGESTIONS_PER_ITEM";
const ENV_IDEMPOTENCY_TTL_SECS: &str = "OFFERSWAP_IDEMPOTENCY_TTL_SECS";
const ENV_SCORE_WEIGHTS: &str = "OFFERSWAP_SCORE_WEIGHTS";
const ENV_CURRENCY_SYMBOL: &str = "OFFERSWAP_CURRENCY_SYMBOL";
const ENV_CACHE_BACKEND: &str = "OFFERSWAP_CACHE_BACKEND";

/// Hard system ceiling on selected stores, whatever the caller asks for.
pub const MAX_STORES_CEILING: usize = 2;

const DEFAULT_SESSION_TTL_SECS: i64 = 30 * 60;
const DEFAULT_SESSION_RETENTION_GRACE_SECS: i64 = 10 * 60;
const DEFAULT_RATE_LIMIT_MAX_STARTS: u32 = 5;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: i64 = 60 * 60;
const DEFAULT_SUGGESTIONS_PER_ITEM: usize = 5;
const DEFAULT_CANDIDATE_FETCH_LIMIT: usize = 50;
const DEFAULT_IDEMPOTENCY_TTL_SECS: i64 = 24 * 60 * 60;
const DEFAULT_CONFIRM_LEASE_SECS: i64 = 60;
const DEFAULT_CURRENCY_SYMBOL: &str = "\u{20AC}";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheBackend {
    #[default]
    Sqlite,
    Memory,
}

impl CacheBackend {
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let normalized = raw.map(|value| value.trim().to_ascii_lowercase());
        match normalized.as_deref() {
            None | Some("") | Some("sqlite") => Ok(Self::Sqlite),
            Some("memory") => Ok(Self::Memory),
            Some(other) => Err(MigrationError::Validation(format!(
                "invalid {ENV_CACHE_BACKEND}: {other} (expected sqlite|memory)"
            ))),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::parse(read_non_empty_env(ENV_CACHE_BACKEND).as_deref())
    }
}

/// Relative weights of the suggestion score components, normalized to sum 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub brand: f64,
    pub name: f64,
    pub price: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            brand: 0.45,
            name: 0.35,
            price: 0.20,
        }
    }
}

impl ScoringWeights {
    pub fn parse(raw: &str) -> Result<Self> {
        let parts = raw
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|err| {
                MigrationError::Validation(format!("invalid {ENV_SCORE_WEIGHTS}: {raw} ({err})"))
            })?;
        let [brand, name, price] = parts.as_slice() else {
            return Err(MigrationError::Validation(format!(
                "invalid {ENV_SCORE_WEIGHTS}: {raw} (expected brand,name,price)"
            )));
        };
        if [*brand, *name, *price]
            .iter()
            .any(|weight| !weight.is_finite() || *weight < 0.0)
        {
            return Err(MigrationError::Validation(format!(
                "invalid {ENV_SCORE_WEIGHTS}: {raw} (weights must be finite and non-negative)"
            )));
        }
        let sum = brand + name + price;
        if sum <= 0.0 {
            return Err(MigrationError::Validation(format!(
                "invalid {ENV_SCORE_WEIGHTS}: {raw} (weights sum to zero)"
            )));
        }
        Ok(Self {
            brand: brand / sum,
            name: name / sum,
            price: price / sum,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_starts: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_starts: DEFAULT_RATE_LIMIT_MAX_STARTS,
            window: Duration::seconds(DEFAULT_RATE_LIMIT_WINDOW_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub session_ttl: Duration,
    /// How long an expired session stays readable before its cache entry lapses.
    pub session_retention_grace: Duration,
    pub rate_limit: RateLimitConfig,
    pub default_max_stores: usize,
    pub suggestions_per_item: usize,
    pub candidate_fetch_limit: usize,
    pub idempotency_ttl: Duration,
    pub confirm_lease_ttl: Duration,
    pub scoring: ScoringWeights,
    pub currency_symbol: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::seconds(DEFAULT_SESSION_TTL_SECS),
            session_retention_grace: Duration::seconds(DEFAULT_SESSION_RETENTION_GRACE_SECS),
            rate_limit: RateLimitConfig::default(),
            default_max_stores: MAX_STORES_CEILING,
            suggestions_per_item: DEFAULT_SUGGESTIONS_PER_ITEM,
            candidate_fetch_limit: DEFAULT_CANDIDATE_FETCH_LIMIT,
            idempotency_ttl: Duration::seconds(DEFAULT_IDEMPOTENCY_TTL_SECS),
            confirm_lease_ttl: Duration::seconds(DEFAULT_CONFIRM_LEASE_SECS),
            scoring: ScoringWeights::default(),
            currency_symbol: DEFAULT_CURRENCY_SYMBOL.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let scoring = match read_non_empty_env(ENV_SCORE_WEIGHTS) {
            Some(raw) => ScoringWeights::parse(&raw)?,
            None => defaults.scoring,
        };
        Ok(Self {
            session_ttl: Duration::seconds(read_env_secs(
                ENV_SESSION_TTL_SECS,
                DEFAULT_SESSION_TTL_SECS,
            )),
            session_retention_grace: Duration::seconds(read_env_secs(
                ENV_SESSION_RETENTION_GRACE_SECS,
                DEFAULT_SESSION_RETENTION_GRACE_SECS,
            )),
            rate_limit: RateLimitConfig {
                max_starts: read_env_u32(
                    ENV_RATE_LIMIT_MAX_STARTS,
                    DEFAULT_RATE_LIMIT_MAX_STARTS,
                    1,
                ),
                window: Duration::seconds(read_env_secs(
                    ENV_RATE_LIMIT_WINDOW_SECS,
                    DEFAULT_RATE_LIMIT_WINDOW_SECS,
                )),
            },
            default_max_stores: read_env_usize(ENV_DEFAULT_MAX_STORES, MAX_STORES_CEILING, 1)
                .min(MAX_STORES_CEILING),
            suggestions_per_item: read_env_usize(
                ENV_SUGGESTIONS_PER_ITEM,
                DEFAULT_SUGGESTIONS_PER_ITEM,
                1,
            ),
            idempotency_ttl: Duration::seconds(read_env_secs(
                ENV_IDEMPOTENCY_TTL_SECS,
                DEFAULT_IDEMPOTENCY_TTL_SECS,
            )),
            scoring,
            currency_symbol: read_non_empty_env(ENV_CURRENCY_SYMBOL)
                .unwrap_or(defaults.currency_symbol),
            ..defaults
        })
    }
}
