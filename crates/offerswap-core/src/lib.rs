// Public fallible APIs in this crate share one concrete error contract (`MigrationError`).
// Repeating per-function `# Errors` boilerplate obscures behavior more than it clarifies.
#![allow(
    clippy::missing_errors_doc,
    reason = "crate-wide fallible API uses one explicit error type; per-item boilerplate would duplicate contract"
)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod confirm;
pub mod decision;
pub mod error;
pub mod lock;
pub mod models;
pub mod rate_limit;
pub mod search;
pub mod service;
pub mod session;
pub mod store;
pub mod store_selector;
pub mod suggestion;

pub use config::{CacheBackend, EngineConfig};
pub use error::{ErrorPayload, MigrationError, Result};
pub use models::{ConfirmResult, DecisionAction, DecisionInput, Session, SessionStatus};
pub use service::MigrationService;
pub use store::SqliteListStore;
