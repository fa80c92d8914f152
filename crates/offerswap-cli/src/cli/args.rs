use std::path::PathBuf;

use clap::Args;
use offerswap_core::DecisionAction;

use super::parsers::{parse_action, parse_min_one_usize};

#[derive(Debug, Args)]
pub struct FileArg {
    #[arg(long)]
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct SessionArg {
    #[arg(long)]
    pub session: String,
}

#[derive(Debug, Args)]
pub struct ListArg {
    #[arg(long)]
    pub list: String,
}

#[derive(Debug, Args)]
pub struct StartArgs {
    #[arg(long)]
    pub user: String,
    #[arg(long)]
    pub list: String,
    /// Upper bound on stores to shop at (capped at 2).
    #[arg(long, value_parser = parse_min_one_usize)]
    pub max_stores: Option<usize>,
}

#[derive(Debug, Args)]
pub struct DecideArgs {
    #[arg(long)]
    pub session: String,
    #[arg(long)]
    pub item: String,
    /// replace | skip | remove
    #[arg(long, value_parser = parse_action)]
    pub action: DecisionAction,
    /// Suggestion id; required for `replace`.
    #[arg(long)]
    pub suggestion: Option<String>,
    #[arg(long)]
    pub reason: Option<String>,
}

#[derive(Debug, Args)]
pub struct BulkArgs {
    #[arg(long)]
    pub session: String,
    #[arg(long)]
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct ConfirmArgs {
    #[arg(long)]
    pub session: String,
    /// Idempotency key; retries with the same key replay the first result.
    #[arg(long)]
    pub key: String,
}
