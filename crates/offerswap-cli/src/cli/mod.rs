use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod args;
mod parsers;

#[cfg(test)]
mod tests;

pub use args::{BulkArgs, ConfirmArgs, DecideArgs, FileArg, ListArg, SessionArg, StartArgs};

#[derive(Debug, Parser)]
#[command(name = "offerswap")]
#[command(about = "Guided migration of expired shopping-list offers", version)]
pub struct Cli {
    #[arg(long, default_value = ".offerswap")]
    pub root: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the data root and its databases.
    Init,
    /// Load offers and lists from a JSON fixture.
    Seed(FileArg),
    Start(StartArgs),
    Show(SessionArg),
    Decide(DecideArgs),
    /// Record several decisions from a JSON array, all or none.
    Bulk(BulkArgs),
    Confirm(ConfirmArgs),
    Cancel(SessionArg),
    Snapshots(ListArg),
    /// Drop expired cache entries.
    Purge,
}

impl Commands {
    /// Operation name reported in error payloads.
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Seed(_) => "seed",
            Self::Start(_) => "start_session",
            Self::Show(_) => "get_session",
            Self::Decide(_) => "record_decision",
            Self::Bulk(_) => "apply_bulk",
            Self::Confirm(_) => "confirm_session",
            Self::Cancel(_) => "cancel_session",
            Self::Snapshots(_) => "snapshots",
            Self::Purge => "purge",
        }
    }
}
