use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::ItemError;

pub type Result<T> = std::result::Result<T, MigrationError>;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("list is locked by another active session: {0}")]
    ListLocked(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("session is no longer active: {0}")]
    SessionClosed(String),

    #[error("unknown item: {0}")]
    UnknownItem(String),

    #[error("unknown suggestion: {0}")]
    UnknownSuggestion(String),

    #[error("revalidation failed for {} item(s)", .0.len())]
    RevalidationFailed(Vec<ItemError>),

    #[error("no expired items on list: {0}")]
    NoExpiredItems(String),

    #[error("list not found: {0}")]
    ListNotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub operation: String,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorPayload {
    /// Payload for failures raised outside the engine (argument parsing,
    /// fixture files).
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            operation: operation.into(),
            trace_id: Uuid::new_v4().to_string(),
            details: None,
        }
    }
}

impl MigrationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded(_) => "RATE_LIMIT_EXCEEDED",
            Self::ListLocked(_) => "LIST_LOCKED",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::SessionExpired(_) => "SESSION_EXPIRED",
            Self::SessionClosed(_) => "SESSION_CLOSED",
            Self::UnknownItem(_) => "UNKNOWN_ITEM",
            Self::UnknownSuggestion(_) => "UNKNOWN_SUGGESTION",
            Self::RevalidationFailed(_) => "REVALIDATION_FAILED",
            Self::NoExpiredItems(_) => "NO_EXPIRED_ITEMS",
            Self::ListNotFound(_) => "LIST_NOT_FOUND",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::Conflict(_) => "CONFLICT",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Sqlite(_) => "SQLITE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller can react to this error (wait, cancel, retry)
    /// rather than it being an infrastructure failure.
    pub const fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            Self::Io(_) | Self::Json(_) | Self::Sqlite(_) | Self::Internal(_)
        )
    }

    pub fn mutex_poisoned(resource: &str) -> Self {
        Self::Internal(format!("{resource} mutex poisoned"))
    }

    pub fn to_payload(&self, operation: impl Into<String>) -> ErrorPayload {
        let details = match self {
            Self::RevalidationFailed(items) => serde_json::to_value(items).ok(),
            _ => None,
        };
        let message = if self.is_user_facing() {
            self.to_string()
        } else {
            "internal error".to_string()
        };
        ErrorPayload {
            details,
            ..ErrorPayload::new(self.code(), message, operation)
        }
    }
}
