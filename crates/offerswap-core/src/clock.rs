use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::{MigrationError, Result};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = at;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
            .lock()
            .map_or_else(|poisoned| *poisoned.into_inner(), |now| *now)
    }
}

/// `at + by`, failing instead of panicking when a configured duration pushes
/// the instant out of chrono's range.
pub fn checked_after(at: DateTime<Utc>, by: Duration) -> Result<DateTime<Utc>> {
    at.checked_add_signed(by).ok_or_else(|| {
        MigrationError::Validation(format!(
            "duration of {}s overflows timestamp {at}",
            by.num_seconds()
        ))
    })
}

/// `at - by`, with the same overflow handling as [`checked_after`].
pub fn checked_before(at: DateTime<Utc>, by: Duration) -> Result<DateTime<Utc>> {
    at.checked_sub_signed(by).ok_or_else(|| {
        MigrationError::Validation(format!(
            "duration of {}s underflows timestamp {at}",
            by.num_seconds()
        ))
    })
}

pub trait IdGenerator: Send + Sync {
    fn next_id(&self, prefix: &str) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", Uuid::new_v4().simple())
    }
}

/// Monotonic `prefix-000001` ids.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl IdGenerator for SequentialIds {
    fn next_id(&self, prefix: &str) -> String {
        let value = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}-{value:06}")
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn manual_clock_advances_only_on_request() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("ts");
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), start + Duration::minutes(5));
    }

    #[test]
    fn checked_arithmetic_reports_overflow_instead_of_panicking() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("ts");
        assert_eq!(
            checked_after(start, Duration::minutes(30)).expect("in range"),
            start + Duration::minutes(30)
        );
        let huge = Duration::seconds(9_000_000_000_000);
        assert!(matches!(
            checked_after(start, huge),
            Err(MigrationError::Validation(_))
        ));
        assert!(matches!(
            checked_before(start, huge),
            Err(MigrationError::Validation(_))
        ));
    }

    #[test]
    fn sequential_ids_are_prefixed_and_ordered() {
        let ids = SequentialIds::default();
        assert_eq!(ids.next_id("ses"), "ses-000001");
        assert_eq!(ids.next_id("snap"), "snap-000002");
    }

    #[test]
    fn uuid_ids_are_unique() {
        let ids = UuidIds;
        assert_ne!(ids.next_id("ses"), ids.next_id("ses"));
    }
}
