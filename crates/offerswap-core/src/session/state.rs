use chrono::{DateTime, Utc};

use crate::error::{MigrationError, Result};
use crate::models::{Session, SessionStatus};

impl Session {
    /// True once `now` is past the fixed expiry, whatever the stored status.
    #[must_use]
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// True while a confirmation lease on the session has not lapsed.
    #[must_use]
    pub fn is_confirming(&self, now: DateTime<Utc>) -> bool {
        self.confirming_until.is_some_and(|until| now < until)
    }

    /// Gate for every mutating operation.
    pub fn ensure_mutable(&self, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            SessionStatus::Active if self.is_past_expiry(now) => {
                Err(MigrationError::SessionExpired(self.session_id.clone()))
            }
            SessionStatus::Active if self.is_confirming(now) => Err(MigrationError::Conflict(
                format!("confirmation in progress: {}", self.session_id),
            )),
            SessionStatus::Active => Ok(()),
            SessionStatus::Expired => Err(MigrationError::SessionExpired(self.session_id.clone())),
            SessionStatus::Completed | SessionStatus::Cancelled => Err(
                MigrationError::SessionClosed(format!("{} is {}", self.session_id, self.status.as_str())),
            ),
        }
    }

    /// Takes the confirmation lease. Fails like any other mutation on a
    /// session that is closed, expired or already being confirmed.
    pub fn begin_confirmation(&mut self, now: DateTime<Utc>, until: DateTime<Utc>) -> Result<()> {
        self.ensure_mutable(now)?;
        self.confirming_until = Some(until);
        Ok(())
    }

    /// Cancels an ACTIVE session and reports whether it ends CANCELLED. An
    /// ACTIVE session past its expiry expires instead; a session under
    /// confirmation cannot be cancelled.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<bool> {
        match self.status {
            SessionStatus::Active if self.is_confirming(now) => Err(MigrationError::Conflict(
                format!("confirmation in progress: {}", self.session_id),
            )),
            SessionStatus::Active if self.is_past_expiry(now) => {
                self.transition(SessionStatus::Expired, now)?;
                Ok(false)
            }
            SessionStatus::Active => {
                self.transition(SessionStatus::Cancelled, now)?;
                Ok(true)
            }
            SessionStatus::Cancelled => Ok(true),
            SessionStatus::Completed | SessionStatus::Expired => Ok(false),
        }
    }

    /// Moves an ACTIVE session to a terminal status. Terminal sessions never
    /// move again, and an ACTIVE session past its expiry can only expire.
    pub fn transition(&mut self, to: SessionStatus, at: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(MigrationError::SessionClosed(format!(
                "{} is {}; cannot move to {}",
                self.session_id,
                self.status.as_str(),
                to.as_str()
            )));
        }
        match to {
            SessionStatus::Active => {
                return Err(MigrationError::Internal(format!(
                    "{} is already ACTIVE",
                    self.session_id
                )));
            }
            SessionStatus::Completed | SessionStatus::Cancelled if self.is_past_expiry(at) => {
                return Err(MigrationError::SessionExpired(self.session_id.clone()));
            }
            SessionStatus::Expired if !self.is_past_expiry(at) => {
                return Err(MigrationError::Internal(format!(
                    "{} cannot expire before {}",
                    self.session_id, self.expires_at
                )));
            }
            _ => {}
        }
        self.status = to;
        self.confirming_until = None;
        self.updated_at = at;
        Ok(())
    }
}
