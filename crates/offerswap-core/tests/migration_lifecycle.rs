use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, TimeZone, Utc};
use offerswap_core::cache::{MemoryTtlCache, SqliteTtlCache, TtlCache};
use offerswap_core::clock::{ManualClock, SequentialIds};
use offerswap_core::models::{ListItem, Offer};
use offerswap_core::{
    CacheBackend, DecisionAction, DecisionInput, EngineConfig, MigrationError, MigrationService,
    SessionStatus, SqliteListStore,
};
use tempfile::tempdir;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 14, 10, 0, 0)
        .single()
        .expect("timestamp")
}

fn offer(
    id: &str,
    store: &str,
    name: &str,
    brand: Option<&str>,
    price: i64,
    valid_for_days: i64,
) -> Offer {
    Offer {
        offer_id: id.to_string(),
        product_id: format!("prod-{id}"),
        store_id: store.to_string(),
        name: name.to_string(),
        brand: brand.map(str::to_string),
        price_cents: price,
        valid_from: t0() - Duration::days(14),
        valid_until: t0() + Duration::days(valid_for_days),
    }
}

fn add_item(store: &SqliteListStore, list_id: &str, item_id: &str, offer: &Offer) {
    store
        .add_list_item(&ListItem {
            item_id: item_id.to_string(),
            list_id: list_id.to_string(),
            offer_id: offer.offer_id.clone(),
            name: offer.name.clone(),
            brand: offer.brand.clone(),
            quantity: 1,
        })
        .expect("add item");
}

fn seed(store: &SqliteListStore) {
    let milk_old = offer("o-milk-old", "s-a", "Whole Milk 1L", Some("Alpen"), 129, -1);
    let bread_old = offer("o-bread-old", "s-a", "Rye Bread", None, 249, -2);
    let pasta_old = offer("o-pasta-old", "s-a", "Penne Rigate 500g", Some("Barilla"), 179, -1);
    let butter = offer("o-butter", "s-a", "Butter 250g", Some("Kerry"), 259, 6);
    for current in [
        &milk_old,
        &bread_old,
        &pasta_old,
        &butter,
        &offer("o-milk-b", "s-b", "Whole Milk 1L", Some("Alpen"), 109, 5),
        &offer("o-milk-c", "s-c", "Whole Milk 1L", Some("Alpen"), 119, 5),
        &offer("o-bread-b", "s-b", "Rye Bread", None, 229, 5),
        &offer("o-bread-d", "s-d", "Rye Bread", None, 199, 5),
        &offer("o-pasta-b", "s-b", "Penne Rigate 500g", Some("Barilla"), 169, 5),
    ] {
        store.upsert_offer(current).expect("offer");
    }

    store.create_list("list-1", "user-1", "weekly").expect("list-1");
    add_item(store, "list-1", "i-1", &milk_old);
    add_item(store, "list-1", "i-2", &bread_old);
    add_item(store, "list-1", "i-3", &pasta_old);
    add_item(store, "list-1", "i-4", &butter);

    store.create_list("list-2", "user-1", "pantry").expect("list-2");
    add_item(store, "list-2", "i-20", &butter);

    store.create_list("list-3", "user-2", "party").expect("list-3");
    add_item(store, "list-3", "i-30", &bread_old);
}

struct Harness {
    service: MigrationService,
    store: SqliteListStore,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn with_cache(cache: Arc<dyn TtlCache>) -> Self {
        let store = SqliteListStore::open_in_memory().expect("store");
        seed(&store);
        let clock = Arc::new(ManualClock::new(t0()));
        let service = MigrationService::with_sqlite_store(
            EngineConfig::default(),
            store.clone(),
            cache,
            clock.clone(),
            Arc::new(SequentialIds::default()),
        );
        Self {
            service,
            store,
            clock,
        }
    }

    fn new() -> Self {
        Self::with_cache(Arc::new(MemoryTtlCache::new()))
    }
}

#[test]
fn start_session_builds_ranked_suggestions_within_selected_stores() {
    let harness = Harness::new();
    let session = harness
        .service
        .start_session("user-1", "list-1", None)
        .expect("start");

    assert_eq!(session.status, SessionStatus::Active);
    assert_eq!(session.expires_at, t0() + Duration::minutes(30));
    let item_ids = session
        .expired_items
        .iter()
        .map(|item| item.item_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(item_ids, vec!["i-1", "i-2", "i-3"]);

    assert_eq!(session.selected_stores.stores, vec!["s-b".to_string()]);
    assert_eq!(session.selected_stores.covered_items, 3);
    assert!((session.selected_stores.coverage_pct - 100.0).abs() < f64::EPSILON);
    for item in &session.expired_items {
        assert!(!item.suggestions.is_empty());
        assert!(item.suggestions.iter().all(|s| s.store_id == "s-b"));
        assert!(item.suggestions.iter().all(|s| s.offer_id != item.offer_id));
    }
    let milk = &session.expired_items[0].suggestions[0];
    assert_eq!(milk.suggestion_id, "i-1:o-milk-b");
    assert!(milk.explanation.contains("same brand"));

    assert_eq!(
        harness.service.get_session(&session.session_id).expect("get"),
        session
    );
}

#[test]
fn start_session_checks_ownership_and_arguments() {
    let harness = Harness::new();
    assert!(matches!(
        harness.service.start_session("user-1", "list-404", None),
        Err(MigrationError::ListNotFound(_))
    ));
    assert!(matches!(
        harness.service.start_session("user-1", "list-3", None),
        Err(MigrationError::PermissionDenied(_))
    ));
    assert!(matches!(
        harness.service.start_session("user-1", "list-1", Some(0)),
        Err(MigrationError::Validation(_))
    ));
    assert!(matches!(
        harness.service.start_session(" ", "list-1", None),
        Err(MigrationError::Validation(_))
    ));
}

#[test]
fn list_without_expired_items_is_refused_and_left_unlocked() {
    let harness = Harness::new();
    assert!(matches!(
        harness.service.start_session("user-1", "list-2", None),
        Err(MigrationError::NoExpiredItems(_))
    ));

    let lapsed = offer("o-jam-old", "s-a", "Apricot Jam", None, 299, -1);
    harness.store.upsert_offer(&lapsed).expect("jam");
    add_item(&harness.store, "list-2", "i-21", &lapsed);
    let session = harness
        .service
        .start_session("user-1", "list-2", None)
        .expect("lock was released");
    assert_eq!(session.expired_items.len(), 1);
    assert!(session.expired_items[0].suggestions.is_empty());
    assert!(session.selected_stores.stores.is_empty());
}

#[test]
fn second_session_on_a_locked_list_is_refused() {
    let harness = Harness::new();
    let first = harness
        .service
        .start_session("user-1", "list-1", None)
        .expect("first");
    assert!(matches!(
        harness.service.start_session("user-1", "list-1", None),
        Err(MigrationError::ListLocked(_))
    ));

    assert!(harness.service.cancel_session(&first.session_id).expect("cancel"));
    harness
        .service
        .start_session("user-1", "list-1", None)
        .expect("list free after cancel");
}

#[test]
fn concurrent_starts_admit_exactly_one_session() {
    let cache: Arc<dyn TtlCache> = Arc::new(SqliteTtlCache::open_in_memory().expect("cache"));
    let harness = Harness::with_cache(cache);
    let outcomes = thread::scope(|scope| {
        let handles = (0..4)
            .map(|_| {
                let service = harness.service.clone();
                scope.spawn(move || service.start_session("user-1", "list-1", None))
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .collect::<Vec<_>>()
    });
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert!(outcomes.iter().all(|outcome| {
        outcome.is_ok() || matches!(outcome, Err(MigrationError::ListLocked(_)))
    }));
}

#[test]
fn sixth_start_within_an_hour_is_rate_limited() {
    let harness = Harness::new();
    for _ in 0..5 {
        let session = harness
            .service
            .start_session("user-1", "list-1", None)
            .expect("within limit");
        harness
            .service
            .cancel_session(&session.session_id)
            .expect("cancel");
        harness.clock.advance(Duration::minutes(5));
    }
    let err = harness
        .service
        .start_session("user-1", "list-1", None)
        .expect_err("sixth start");
    assert!(matches!(err, MigrationError::RateLimitExceeded(_)));
    assert_eq!(err.code(), "RATE_LIMIT_EXCEEDED");

    harness.clock.advance(Duration::minutes(40));
    harness
        .service
        .start_session("user-1", "list-1", None)
        .expect("oldest start left the window");
}

#[test]
fn full_migration_confirms_once_and_replays_by_key() {
    let harness = Harness::new();
    let session = harness
        .service
        .start_session("user-1", "list-1", None)
        .expect("start");
    let id = session.session_id.as_str();

    let decided = harness
        .service
        .record_decision(id, &DecisionInput::replace("i-1", "i-1:o-milk-b"))
        .expect("replace milk");
    let again = harness
        .service
        .record_decision(id, &DecisionInput::replace("i-1", "i-1:o-milk-b"))
        .expect("repeat");
    assert_eq!(decided.decisions, again.decisions);

    harness
        .service
        .apply_bulk(
            id,
            &[
                DecisionInput::replace("i-2", "i-2:o-bread-b"),
                DecisionInput::remove("i-3").with_reason("bought elsewhere"),
            ],
        )
        .expect("bulk");

    let result = harness.service.confirm_session(id, "confirm-1").expect("confirm");
    assert!(result.success);
    assert_eq!(result.summary.migrated, 2);
    assert_eq!(result.summary.removed, 1);
    assert_eq!(result.summary.skipped, 0);
    assert_eq!(result.summary.total_savings_cents, 40);
    assert_eq!(result.summary.stores_used, vec!["s-b".to_string()]);

    let replay = harness
        .service
        .confirm_session(id, "confirm-1")
        .expect("replay");
    assert_eq!(replay, result);

    let items = harness.store.list_items("list-1").expect("items");
    let offers = items
        .iter()
        .map(|item| item.offer_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(offers, vec!["o-milk-b", "o-bread-b", "o-butter"]);
    let snapshots = harness.store.snapshots_for_list("list-1").expect("snapshots");
    assert_eq!(snapshots.len(), 3);
    assert!(
        snapshots
            .iter()
            .any(|snapshot| snapshot.action == DecisionAction::Remove
                && snapshot.offer_id == "o-pasta-old")
    );

    let closed = harness.service.get_session(id).expect("get");
    assert_eq!(closed.status, SessionStatus::Completed);
    assert!(matches!(
        harness
            .service
            .record_decision(id, &DecisionInput::skip("i-1")),
        Err(MigrationError::SessionClosed(_))
    ));
    assert!(!harness.service.cancel_session(id).expect("cancel completed"));

    harness
        .service
        .start_session("user-1", "list-1", None)
        .expect_err("nothing left to migrate");
}

#[test]
fn price_change_before_confirm_fails_that_item_and_keeps_session_active() {
    let harness = Harness::new();
    let session = harness
        .service
        .start_session("user-1", "list-1", None)
        .expect("start");
    let id = session.session_id.as_str();
    harness
        .service
        .apply_bulk(
            id,
            &[
                DecisionInput::replace("i-1", "i-1:o-milk-b"),
                DecisionInput::replace("i-2", "i-2:o-bread-b"),
            ],
        )
        .expect("decide");

    harness
        .store
        .upsert_offer(&offer("o-milk-b", "s-b", "Whole Milk 1L", Some("Alpen"), 139, 5))
        .expect("price rise");

    let refreshed = harness.service.get_session(id).expect("get");
    assert!(refreshed.suggestions_stale);

    let result = harness.service.confirm_session(id, "confirm-1").expect("confirm");
    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].item_id, "i-1");
    assert_eq!(result.errors[0].code, "PRICE_CHANGED");

    let session = harness.service.get_session(id).expect("get");
    assert_eq!(session.status, SessionStatus::Active);
    let items = harness.store.list_items("list-1").expect("items");
    assert_eq!(items[0].offer_id, "o-milk-old");
    assert_eq!(items[1].offer_id, "o-bread-old");
    assert!(harness.store.snapshots_for_list("list-1").expect("snapshots").is_empty());
}

#[test]
fn expired_session_becomes_read_only_and_frees_the_list() {
    let harness = Harness::new();
    let session = harness
        .service
        .start_session("user-1", "list-1", None)
        .expect("start");
    let id = session.session_id.as_str();
    harness.clock.advance(Duration::minutes(31));

    assert!(matches!(
        harness
            .service
            .record_decision(id, &DecisionInput::skip("i-1")),
        Err(MigrationError::SessionExpired(_))
    ));
    let expired = harness.service.get_session(id).expect("get");
    assert_eq!(expired.status, SessionStatus::Expired);
    assert!(matches!(
        harness.service.confirm_session(id, "confirm-1"),
        Err(MigrationError::SessionExpired(_))
    ));
    assert!(!harness.service.cancel_session(id).expect("cancel expired"));

    harness
        .service
        .start_session("user-1", "list-1", None)
        .expect("list free again");

    harness.clock.advance(Duration::minutes(15));
    assert!(matches!(
        harness.service.get_session(id),
        Err(MigrationError::SessionNotFound(_))
    ));
}

#[test]
fn cancel_is_idempotent() {
    let harness = Harness::new();
    let session = harness
        .service
        .start_session("user-1", "list-1", None)
        .expect("start");
    let id = session.session_id.as_str();
    assert!(harness.service.cancel_session(id).expect("cancel"));
    assert!(harness.service.cancel_session(id).expect("cancel again"));
    assert_eq!(
        harness.service.get_session(id).expect("get").status,
        SessionStatus::Cancelled
    );
    assert!(matches!(
        harness.service.confirm_session(id, "confirm-1"),
        Err(MigrationError::SessionClosed(_))
    ));
    assert!(matches!(
        harness.service.cancel_session("ses-missing"),
        Err(MigrationError::SessionNotFound(_))
    ));
}

#[test]
fn single_store_budget_narrows_suggestions() {
    let harness = Harness::new();
    let session = harness
        .service
        .start_session("user-1", "list-1", Some(1))
        .expect("start");
    assert_eq!(session.selected_stores.stores.len(), 1);

    let wide = Harness::new()
        .service
        .start_session("user-1", "list-1", Some(9))
        .expect("start");
    assert!(wide.selected_stores.stores.len() <= 2);
}

#[test]
fn file_backed_service_survives_reopen() {
    let temp = tempdir().expect("tempdir");
    let root = temp.path().join("data");
    let session_id = {
        let (service, store) =
            MigrationService::open(&root, EngineConfig::default(), CacheBackend::Sqlite)
                .expect("open");
        let now = Utc::now();
        let lapsed = Offer {
            offer_id: "o-tea-old".to_string(),
            product_id: "prod-tea".to_string(),
            store_id: "s-a".to_string(),
            name: "Green Tea".to_string(),
            brand: None,
            price_cents: 349,
            valid_from: now - Duration::days(10),
            valid_until: now - Duration::days(1),
        };
        store.upsert_offer(&lapsed).expect("offer");
        store.create_list("list-1", "user-1", "tea").expect("list");
        add_item(&store, "list-1", "i-1", &lapsed);
        service
            .start_session("user-1", "list-1", None)
            .expect("start")
            .session_id
    };

    let (reopened, _store) =
        MigrationService::open(&root, EngineConfig::default(), CacheBackend::Sqlite)
            .expect("reopen");
    let session = reopened.get_session(&session_id).expect("session persisted");
    assert_eq!(session.status, SessionStatus::Active);
    assert!(matches!(
        reopened.start_session("user-1", "list-1", None),
        Err(MigrationError::ListLocked(_))
    ));
    assert!(reopened.cancel_session(&session_id).expect("cancel"));
}
