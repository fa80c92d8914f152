use tracing::{info, warn};

use crate::error::{MigrationError, Result};
use crate::models::{Session, SessionStatus};

use super::MigrationService;

impl MigrationService {
    /// Reads a session. An ACTIVE session found past its expiry is moved to
    /// EXPIRED and its list lock released before it is returned.
    pub fn get_session(&self, session_id: &str) -> Result<Session> {
        let session = self.sessions.get(session_id)?;
        let now = self.clock.now();
        if session.status != SessionStatus::Active || !session.is_past_expiry(now) {
            return Ok(session);
        }
        self.reconcile_expiry(session_id)
    }

    /// Cancels an ACTIVE session and releases its list lock. Returns whether
    /// the session ends up CANCELLED, so repeating a cancel returns `true`
    /// again while cancelling a completed or expired session returns `false`.
    pub fn cancel_session(&self, session_id: &str) -> Result<bool> {
        let now = self.clock.now();
        let mut cancelled = false;
        let session = self.sessions.update(session_id, &mut |session| {
            cancelled = session.cancel(now)?;
            Ok(())
        })?;
        self.locks.release_if_held(&session.list_id, session_id)?;

        info!(
            session_id,
            list_id = %session.list_id,
            status = session.status.as_str(),
            "cancel requested"
        );
        Ok(cancelled)
    }

    /// Turns an ACTIVE session past its expiry into EXPIRED and frees its
    /// list. Safe to race: only the first caller changes anything. A session
    /// whose confirmation lease is live is left to that confirmation.
    pub(super) fn reconcile_expiry(&self, session_id: &str) -> Result<Session> {
        let now = self.clock.now();
        let mut expired_now = false;
        let session = self.sessions.update(session_id, &mut |session| {
            expired_now = session.status == SessionStatus::Active
                && session.is_past_expiry(now)
                && !session.is_confirming(now);
            if expired_now {
                session.transition(SessionStatus::Expired, now)?;
            }
            Ok(())
        })?;
        if session.status.is_terminal() {
            self.locks.release_if_held(&session.list_id, session_id)?;
        }
        if expired_now {
            info!(session_id, list_id = %session.list_id, "expired session reconciled");
        }
        Ok(session)
    }

    /// On `SessionExpired` from a mutating call, persists the expiry before
    /// handing the error back.
    pub(super) fn reconcile_on_expiry<T>(&self, session_id: &str, outcome: Result<T>) -> Result<T> {
        if let Err(MigrationError::SessionExpired(_)) = &outcome
            && let Err(err) = self.reconcile_expiry(session_id)
        {
            warn!(session_id, error = %err, "expiry reconciliation failed");
        }
        outcome
    }
}
