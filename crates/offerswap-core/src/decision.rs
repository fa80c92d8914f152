use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::{MigrationError, Result};
use crate::models::{Decision, DecisionAction, DecisionInput, Session};
use crate::session::SessionStore;

const MAX_REASON_CHARS: usize = 500;

/// Validates per-item decisions and records them on the cached session.
/// Decisions never touch the primary store before confirmation.
#[derive(Clone)]
pub struct DecisionRecorder {
    sessions: SessionStore,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for DecisionRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionRecorder").finish_non_exhaustive()
    }
}

impl DecisionRecorder {
    pub fn new(sessions: SessionStore, clock: Arc<dyn Clock>) -> Self {
        Self { sessions, clock }
    }

    /// Records one decision. Repeating the current resolution of an item is
    /// a no-op; a different resolution replaces it.
    pub fn record(&self, session_id: &str, input: &DecisionInput) -> Result<Session> {
        self.apply_bulk(session_id, std::slice::from_ref(input))
    }

    /// Validates every entry before applying any of them, so either all
    /// decisions land or none do.
    pub fn apply_bulk(&self, session_id: &str, inputs: &[DecisionInput]) -> Result<Session> {
        let now = self.clock.now();
        let mut changed = 0usize;
        let session = self.sessions.update(session_id, &mut |session| {
            changed = 0;
            session.ensure_mutable(now)?;
            let mut seen = HashSet::new();
            for input in inputs {
                validate(session, input)?;
                if !seen.insert(input.item_id.as_str()) {
                    return Err(MigrationError::Validation(format!(
                        "item {} appears more than once",
                        input.item_id
                    )));
                }
            }
            for input in inputs {
                if apply(session, input, now) {
                    changed += 1;
                }
            }
            if changed > 0 {
                session.updated_at = now;
            }
            Ok(())
        })?;

        if changed == 0 {
            debug!(session_id, entries = inputs.len(), "decisions unchanged");
        } else {
            info!(
                session_id,
                entries = inputs.len(),
                changed,
                decided = session.decisions.len(),
                "decisions recorded"
            );
        }
        Ok(session)
    }
}

fn validate(session: &Session, input: &DecisionInput) -> Result<()> {
    let item = session
        .item(&input.item_id)
        .ok_or_else(|| MigrationError::UnknownItem(input.item_id.clone()))?;
    match (input.action, input.suggestion_id.as_deref()) {
        (DecisionAction::Replace, None) => {
            return Err(MigrationError::Validation(format!(
                "REPLACE for item {} requires a suggestion id",
                input.item_id
            )));
        }
        (DecisionAction::Replace, Some(suggestion_id)) => {
            if item.suggestion(suggestion_id).is_none() {
                return Err(MigrationError::UnknownSuggestion(format!(
                    "{suggestion_id} (item {})",
                    input.item_id
                )));
            }
        }
        (action, Some(_)) => {
            return Err(MigrationError::Validation(format!(
                "{} for item {} must not carry a suggestion id",
                action.as_str(),
                input.item_id
            )));
        }
        (_, None) => {}
    }
    if input
        .reason
        .as_deref()
        .is_some_and(|reason| reason.chars().count() > MAX_REASON_CHARS)
    {
        return Err(MigrationError::Validation(format!(
            "reason for item {} exceeds {MAX_REASON_CHARS} characters",
            input.item_id
        )));
    }
    Ok(())
}

/// Returns whether the session changed.
fn apply(session: &mut Session, input: &DecisionInput, now: DateTime<Utc>) -> bool {
    let suggestion_id = input.suggestion_id.as_deref();
    if session
        .decisions
        .get(&input.item_id)
        .is_some_and(|current| current.resolves_like(input.action, suggestion_id))
    {
        return false;
    }
    session.decisions.insert(
        input.item_id.clone(),
        Decision {
            action: input.action,
            suggestion_id: input.suggestion_id.clone(),
            reason: input.reason.clone(),
            recorded_at: now,
        },
    );
    true
}
