use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use offerswap_core::models::DecisionInput;
use offerswap_core::{
    CacheBackend, EngineConfig, ErrorPayload, MigrationError, MigrationService, SqliteListStore,
};
use tracing::error;

use crate::cli::Commands;

mod seed;
mod support;

use self::seed::{SeedFixture, apply_fixture};
use self::support::{print_json, read_json_file};

pub(crate) fn run_from_root(root: &Path, command: Commands) -> Result<()> {
    let config = EngineConfig::from_env().context("invalid engine configuration")?;
    let backend = CacheBackend::from_env().context("invalid cache backend")?;
    ensure_persistent_backend(backend)?;
    let (service, store) = MigrationService::open(root, config, backend)
        .with_context(|| format!("failed to open data root {}", root.display()))?;
    run_validated(&service, &store, root, command)
}

/// Every CLI invocation is a fresh process, so session state must outlive it.
fn ensure_persistent_backend(backend: CacheBackend) -> Result<()> {
    if backend == CacheBackend::Memory {
        bail!(
            "cache backend `memory` does not persist sessions between offerswap invocations; \
             use `sqlite`"
        );
    }
    Ok(())
}

fn run_validated(
    service: &MigrationService,
    store: &SqliteListStore,
    root: &Path,
    command: Commands,
) -> Result<()> {
    match command {
        Commands::Init => {
            print_json(&serde_json::json!({
                "status": "ok",
                "root": root.display().to_string(),
            }))?;
        }
        Commands::Seed(args) => {
            let fixture = read_json_file::<SeedFixture>(&args.file)?;
            let report = apply_fixture(store, &fixture)?;
            print_json(&report)?;
        }
        Commands::Start(args) => {
            let session = service.start_session(&args.user, &args.list, args.max_stores)?;
            print_json(&session)?;
        }
        Commands::Show(args) => {
            print_json(&service.get_session(&args.session)?)?;
        }
        Commands::Decide(args) => {
            let input = DecisionInput {
                item_id: args.item,
                action: args.action,
                suggestion_id: args.suggestion,
                reason: args.reason,
            };
            print_json(&service.record_decision(&args.session, &input)?)?;
        }
        Commands::Bulk(args) => {
            let inputs = read_json_file::<Vec<DecisionInput>>(&args.file)?;
            print_json(&service.apply_bulk(&args.session, &inputs)?)?;
        }
        Commands::Confirm(args) => {
            print_json(&service.confirm_session(&args.session, &args.key)?)?;
        }
        Commands::Cancel(args) => {
            let cancelled = service.cancel_session(&args.session)?;
            print_json(&serde_json::json!({
                "session_id": args.session,
                "cancelled": cancelled,
            }))?;
        }
        Commands::Snapshots(args) => {
            print_json(&store.snapshots_for_list(&args.list)?)?;
        }
        Commands::Purge => {
            let purged = service.purge_expired()?;
            print_json(&serde_json::json!({ "purged": purged }))?;
        }
    }
    Ok(())
}

/// Engine failures keep their machine code; anything else becomes
/// `COMMAND_FAILED` with the full context chain as message.
pub(crate) fn error_payload(operation: &str, err: &anyhow::Error) -> ErrorPayload {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<MigrationError>())
        .map_or_else(
            || ErrorPayload::new("COMMAND_FAILED", format!("{err:#}"), operation),
            |engine| engine.to_payload(operation),
        )
}

pub(crate) fn report_error(operation: &str, err: &anyhow::Error) {
    let payload = error_payload(operation, err);
    error!(
        operation,
        trace_id = %payload.trace_id,
        error = %format!("{err:#}"),
        "command failed"
    );
    let mut stderr = io::stderr().lock();
    if serde_json::to_writer_pretty(&mut stderr, &payload).is_ok() {
        let _ = writeln!(stderr);
    } else {
        let _ = writeln!(stderr, "{err:#}");
    }
}
