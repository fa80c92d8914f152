use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::cache::{CacheUpdate, TtlCache};
use crate::clock::{Clock, checked_after, checked_before};
use crate::config::RateLimitConfig;
use crate::error::{MigrationError, Result};

const KEY_PREFIX: &str = "ratelimit:";

/// Sliding-window limit on session starts per user. The window is a log of
/// start instants; entries older than the window fall out on every check.
#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<dyn TtlCache>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn TtlCache>, clock: Arc<dyn Clock>, config: RateLimitConfig) -> Self {
        Self {
            cache,
            clock,
            config,
        }
    }

    /// Records one start for `user_id`, or fails with `RateLimitExceeded`
    /// without recording anything when the window is already full.
    pub fn check_and_increment(&self, user_id: &str) -> Result<()> {
        let now = self.clock.now();
        let window = self.config.window;
        let max_starts = usize::try_from(self.config.max_starts).unwrap_or(usize::MAX);
        let key = rate_key(user_id);

        self.cache.update(&key, now, &mut |current| {
            let mut starts = live_starts(current, now, window)?;
            if starts.len() >= max_starts {
                let retry_after = starts
                    .first()
                    .and_then(|oldest| checked_after(*oldest, window).ok())
                    .map(|until| (until - now).num_seconds().max(1))
                    .unwrap_or(1);
                warn!(user_id, retry_after, "session start rate limited");
                return Err(MigrationError::RateLimitExceeded(format!(
                    "{max_starts} session starts per {}s reached; retry in {retry_after}s",
                    window.num_seconds()
                )));
            }
            starts.push(now);
            Ok(CacheUpdate::Put {
                value: encode_starts(&starts)?,
                expires_at: checked_after(now, window)?,
            })
        })
    }
}

fn rate_key(user_id: &str) -> String {
    format!("{KEY_PREFIX}{user_id}")
}

fn live_starts(
    raw: Option<&str>,
    now: DateTime<Utc>,
    window: Duration,
) -> Result<Vec<DateTime<Utc>>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let mut starts = serde_json::from_str::<Vec<DateTime<Utc>>>(raw)?;
    let cutoff = checked_before(now, window)?;
    starts.retain(|start| *start > cutoff);
    starts.sort();
    Ok(starts)
}

fn encode_starts(starts: &[DateTime<Utc>]) -> Result<String> {
    Ok(serde_json::to_string(starts)?)
}
