use crate::error::Result;
use crate::models::{DecisionInput, Session};

use super::MigrationService;

impl MigrationService {
    pub fn record_decision(&self, session_id: &str, input: &DecisionInput) -> Result<Session> {
        let outcome = self.decisions.record(session_id, input);
        self.reconcile_on_expiry(session_id, outcome)
    }

    pub fn apply_bulk(&self, session_id: &str, inputs: &[DecisionInput]) -> Result<Session> {
        let outcome = self.decisions.apply_bulk(session_id, inputs);
        self.reconcile_on_expiry(session_id, outcome)
    }
}
