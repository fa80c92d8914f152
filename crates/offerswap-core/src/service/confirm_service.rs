use crate::error::Result;
use crate::models::ConfirmResult;

use super::MigrationService;

impl MigrationService {
    pub fn confirm_session(&self, session_id: &str, idempotency_key: &str) -> Result<ConfirmResult> {
        let outcome = self.confirmations.confirm(session_id, idempotency_key);
        self.reconcile_on_expiry(session_id, outcome)
    }
}
