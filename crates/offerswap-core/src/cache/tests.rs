use chrono::{Duration, TimeZone, Utc};
use tempfile::tempdir;

use crate::error::MigrationError;

use super::*;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0)
        .single()
        .expect("timestamp")
}

fn backends() -> Vec<(&'static str, Box<dyn TtlCache>)> {
    vec![
        ("memory", Box::new(MemoryTtlCache::new())),
        (
            "sqlite",
            Box::new(SqliteTtlCache::open_in_memory().expect("open sqlite cache")),
        ),
    ]
}

#[test]
fn entries_disappear_after_expiry() {
    for (name, cache) in backends() {
        cache
            .put("k", "v", t0(), t0() + Duration::seconds(10))
            .expect("put");
        assert_eq!(
            cache.get("k", t0() + Duration::seconds(9)).expect("get"),
            Some("v".to_string()),
            "{name}"
        );
        assert_eq!(
            cache.get("k", t0() + Duration::seconds(10)).expect("get"),
            None,
            "{name}"
        );
    }
}

#[test]
fn put_if_absent_only_wins_once_per_live_entry() {
    for (name, cache) in backends() {
        let expires = t0() + Duration::seconds(30);
        assert!(cache.put_if_absent("lock", "a", t0(), expires).expect("first"), "{name}");
        assert!(!cache.put_if_absent("lock", "b", t0(), expires).expect("second"), "{name}");
        assert_eq!(cache.get("lock", t0()).expect("get"), Some("a".to_string()));

        let later = t0() + Duration::seconds(31);
        assert!(
            cache
                .put_if_absent("lock", "c", later, later + Duration::seconds(30))
                .expect("after expiry"),
            "{name}"
        );
        assert_eq!(cache.get("lock", later).expect("get"), Some("c".to_string()));
    }
}

#[test]
fn update_error_leaves_entry_untouched() {
    for (name, cache) in backends() {
        let expires = t0() + Duration::seconds(30);
        cache.put("k", "original", t0(), expires).expect("put");
        let err = cache
            .update("k", t0(), &mut |_| {
                Err(MigrationError::Conflict("nope".to_string()))
            })
            .expect_err("update must fail");
        assert!(matches!(err, MigrationError::Conflict(_)), "{name}");
        assert_eq!(
            cache.get("k", t0()).expect("get"),
            Some("original".to_string()),
            "{name}"
        );
    }
}

#[test]
fn update_can_delete_and_purge_reclaims_expired_rows() {
    for (name, cache) in backends() {
        cache
            .put("short", "1", t0(), t0() + Duration::seconds(1))
            .expect("put short");
        cache
            .put("long", "2", t0(), t0() + Duration::seconds(100))
            .expect("put long");
        cache
            .update("long", t0(), &mut |current| {
                assert_eq!(current, Some("2"));
                Ok(CacheUpdate::Delete)
            })
            .expect("delete via update");
        assert_eq!(cache.get("long", t0()).expect("get"), None, "{name}");

        let purged = cache
            .purge_expired(t0() + Duration::seconds(5))
            .expect("purge");
        assert_eq!(purged, 1, "{name}");
        assert!(!cache.delete("short").expect("delete"), "{name}");
    }
}

#[test]
fn sqlite_cache_is_shared_between_handles_on_one_file() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("cache.sqlite3");
    let first = SqliteTtlCache::open(&path).expect("open first");
    let second = SqliteTtlCache::open(&path).expect("open second");

    let expires = t0() + Duration::minutes(5);
    assert!(first.put_if_absent("lock:list-1", "ses-a", t0(), expires).expect("first"));
    assert!(!second.put_if_absent("lock:list-1", "ses-b", t0(), expires).expect("second"));
    assert_eq!(
        second.get("lock:list-1", t0()).expect("get"),
        Some("ses-a".to_string())
    );
}
