use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use chrono::{Duration, SecondsFormat, Utc};
use serde_json::{Value, json};
use tempfile::tempdir;

fn run(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_offerswap"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env("OFFERSWAP_CACHE_BACKEND", "sqlite")
        .env("RUST_LOG", "off")
        .output()
        .expect("run offerswap")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout json")
}

fn write_fixture(dir: &Path) -> std::path::PathBuf {
    let now = Utc::now();
    let at = |days: i64| (now + Duration::days(days)).to_rfc3339_opts(SecondsFormat::Secs, true);
    let fixture = json!({
        "offers": [
            {
                "offer_id": "o-bread-old",
                "product_id": "p-bread",
                "store_id": "s-a",
                "name": "Rye Bread",
                "price_cents": 249,
                "valid_from": at(-10),
                "valid_until": at(-1)
            },
            {
                "offer_id": "o-bread-new",
                "product_id": "p-bread",
                "store_id": "s-b",
                "name": "Rye Bread",
                "price_cents": 219,
                "valid_from": at(-2),
                "valid_until": at(5)
            }
        ],
        "lists": [
            {
                "list_id": "list-1",
                "owner_id": "user-1",
                "name": "weekly",
                "items": [{ "item_id": "i-1", "offer_id": "o-bread-old" }]
            }
        ]
    });
    let path = dir.join("fixture.json");
    fs::write(&path, serde_json::to_vec_pretty(&fixture).expect("encode")).expect("write");
    path
}

#[test]
fn migration_round_trip_through_the_binary() {
    // Given a seeded root with one expired item
    // When a session is started, decided and confirmed through the CLI
    // Then the list item points at the new offer and the result replays by key.
    let temp = tempdir().expect("tempdir");
    let root = temp.path().join("root");
    let fixture = write_fixture(temp.path());

    let init = stdout_json(&run(&root, &["init"]));
    assert_eq!(init["status"], "ok");
    let seeded = stdout_json(&run(
        &root,
        &["seed", "--file", fixture.to_str().expect("fixture path")],
    ));
    assert_eq!(seeded["items"], 1);

    let session = stdout_json(&run(
        &root,
        &["start", "--user", "user-1", "--list", "list-1"],
    ));
    let session_id = session["session_id"].as_str().expect("session id").to_string();
    assert_eq!(session["status"], "ACTIVE");
    let suggestion = session["expired_items"][0]["suggestions"][0]["suggestion_id"]
        .as_str()
        .expect("suggestion id")
        .to_string();
    assert_eq!(suggestion, "i-1:o-bread-new");

    let decided = stdout_json(&run(
        &root,
        &[
            "decide",
            "--session",
            &session_id,
            "--item",
            "i-1",
            "--action",
            "replace",
            "--suggestion",
            &suggestion,
        ],
    ));
    assert_eq!(decided["decisions"]["i-1"]["action"], "REPLACE");

    let confirm_args = ["confirm", "--session", session_id.as_str(), "--key", "k-1"];
    let confirmed = stdout_json(&run(&root, &confirm_args));
    assert_eq!(confirmed["success"], true);
    assert_eq!(confirmed["summary"]["migrated"], 1);
    assert_eq!(confirmed["summary"]["total_savings_cents"], 30);
    let replayed = stdout_json(&run(&root, &confirm_args));
    assert_eq!(replayed, confirmed);

    let snapshots = stdout_json(&run(&root, &["snapshots", "--list", "list-1"]));
    assert_eq!(snapshots[0]["offer_id"], "o-bread-old");
    assert_eq!(snapshots[0]["replacement_offer_id"], "o-bread-new");

    let shown = stdout_json(&run(&root, &["show", "--session", &session_id]));
    assert_eq!(shown["status"], "COMPLETED");
}

#[test]
fn engine_errors_are_reported_as_json_on_stderr() {
    let temp = tempdir().expect("tempdir");
    let root = temp.path().join("root");
    let output = run(&root, &["show", "--session", "ses-missing"]);

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let payload: Value = serde_json::from_slice(&output.stderr).expect("stderr json");
    assert_eq!(payload["code"], "SESSION_NOT_FOUND");
    assert_eq!(payload["operation"], "get_session");
    assert!(payload["trace_id"].as_str().is_some_and(|id| !id.is_empty()));
}

#[test]
fn memory_cache_backend_is_refused_before_opening_the_root() {
    let temp = tempdir().expect("tempdir");
    let root = temp.path().join("root");
    let output = Command::new(env!("CARGO_BIN_EXE_offerswap"))
        .arg("--root")
        .arg(&root)
        .arg("init")
        .env("OFFERSWAP_CACHE_BACKEND", "memory")
        .env("RUST_LOG", "off")
        .output()
        .expect("run offerswap");

    assert!(!output.status.success());
    let payload: Value = serde_json::from_slice(&output.stderr).expect("stderr json");
    assert!(
        payload["message"]
            .as_str()
            .is_some_and(|message| message.contains("does not persist"))
    );
    assert!(!root.exists());
}
