use super::*;
use clap::Parser;
use offerswap_core::DecisionAction;

#[test]
fn start_parses_optional_store_budget() {
    let cli = Cli::try_parse_from([
        "offerswap",
        "start",
        "--user",
        "user-1",
        "--list",
        "list-1",
        "--max-stores",
        "1",
    ])
    .expect("parse");
    match cli.command {
        Commands::Start(StartArgs {
            user,
            list,
            max_stores,
        }) => {
            assert_eq!(user, "user-1");
            assert_eq!(list, "list-1");
            assert_eq!(max_stores, Some(1));
        }
        _ => panic!("expected start command"),
    }
    assert_eq!(cli.root, std::path::PathBuf::from(".offerswap"));
}

#[test]
fn start_rejects_zero_store_budget() {
    let parsed = Cli::try_parse_from([
        "offerswap",
        "start",
        "--user",
        "user-1",
        "--list",
        "list-1",
        "--max-stores",
        "0",
    ]);
    assert!(parsed.is_err(), "zero stores must be rejected");
}

#[test]
fn decide_parses_action_case_insensitively() {
    let cli = Cli::try_parse_from([
        "offerswap",
        "decide",
        "--session",
        "ses-1",
        "--item",
        "i-1",
        "--action",
        "Replace",
        "--suggestion",
        "i-1:o-2",
    ])
    .expect("parse");
    match cli.command {
        Commands::Decide(args) => {
            assert_eq!(args.action, DecisionAction::Replace);
            assert_eq!(args.suggestion.as_deref(), Some("i-1:o-2"));
            assert_eq!(args.reason, None);
        }
        _ => panic!("expected decide command"),
    }
}

#[test]
fn decide_rejects_unknown_action() {
    let parsed = Cli::try_parse_from([
        "offerswap",
        "decide",
        "--session",
        "ses-1",
        "--item",
        "i-1",
        "--action",
        "postpone",
    ]);
    assert!(parsed.is_err());
}

#[test]
fn operation_names_match_engine_operations() {
    let cli = Cli::try_parse_from(["offerswap", "confirm", "--session", "s", "--key", "k"])
        .expect("parse");
    assert_eq!(cli.command.operation(), "confirm_session");
    let cli = Cli::try_parse_from(["offerswap", "--root", "/tmp/x", "purge"]).expect("parse");
    assert_eq!(cli.command.operation(), "purge");
}
