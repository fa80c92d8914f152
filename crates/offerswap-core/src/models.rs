use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Completed,
    Cancelled,
    Expired,
}

impl SessionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    Replace,
    Skip,
    Remove,
}

impl DecisionAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Replace => "REPLACE",
            Self::Skip => "SKIP",
            Self::Remove => "REMOVE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "replace" => Some(Self::Replace),
            "skip" => Some(Self::Skip),
            "remove" => Some(Self::Remove),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub brand_match: f64,
    pub name_similarity: f64,
    pub price_proximity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub suggestion_id: String,
    pub offer_id: String,
    pub product_id: String,
    pub store_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    pub price_cents: i64,
    pub valid_until: DateTime<Utc>,
    pub score_breakdown: ScoreBreakdown,
    pub total_score: f64,
    pub explanation: String,
}

/// A list entry whose offer lapsed, together with the offer values captured
/// when the session started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpiredItem {
    pub item_id: String,
    pub offer_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    pub store_id: String,
    pub price_cents: i64,
    pub valid_until: DateTime<Utc>,
    pub quantity: u32,
    pub suggestions: Vec<Suggestion>,
}

impl ExpiredItem {
    pub fn suggestion(&self, suggestion_id: &str) -> Option<&Suggestion> {
        self.suggestions
            .iter()
            .find(|suggestion| suggestion.suggestion_id == suggestion_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl Decision {
    /// Same action and, for REPLACE, same suggestion. Reason and timestamp
    /// do not participate.
    #[must_use]
    pub fn resolves_like(&self, action: DecisionAction, suggestion_id: Option<&str>) -> bool {
        self.action == action && self.suggestion_id.as_deref() == suggestion_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionInput {
    pub item_id: String,
    pub action: DecisionAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DecisionInput {
    pub fn replace(item_id: impl Into<String>, suggestion_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            action: DecisionAction::Replace,
            suggestion_id: Some(suggestion_id.into()),
            reason: None,
        }
    }

    pub fn skip(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            action: DecisionAction::Skip,
            suggestion_id: None,
            reason: None,
        }
    }

    pub fn remove(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            action: DecisionAction::Remove,
            suggestion_id: None,
            reason: None,
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectedStores {
    pub stores: Vec<String>,
    pub covered_items: usize,
    pub total_items: usize,
    pub coverage_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub list_id: String,
    pub user_id: String,
    pub status: SessionStatus,
    pub expired_items: Vec<ExpiredItem>,
    pub decisions: BTreeMap<String, Decision>,
    pub selected_stores: SelectedStores,
    pub catalog_version: u64,
    /// Set on read when the catalog advanced past `catalog_version`.
    #[serde(default)]
    pub suggestions_stale: bool,
    /// Lease held by a running confirmation. While it is live the session
    /// refuses decisions, cancels and other confirmations; it lapses on its
    /// own so a confirm that died mid-way cannot wedge the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirming_until: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn item(&self, item_id: &str) -> Option<&ExpiredItem> {
        self.expired_items
            .iter()
            .find(|item| item.item_id == item_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub offer_id: String,
    pub product_id: String,
    pub store_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    pub price_cents: i64,
    pub valid_until: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateQuery {
    pub brand: Option<String>,
    pub name: String,
    pub store_scope: Option<Vec<String>>,
    pub valid_at: DateTime<Utc>,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub offer_id: String,
    pub product_id: String,
    pub store_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    pub price_cents: i64,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

/// Current price and validity of an offer as seen by the primary store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferState {
    pub offer_id: String,
    pub store_id: String,
    pub price_cents: i64,
    pub valid_until: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem {
    pub item_id: String,
    pub list_id: String,
    pub offer_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredListItem {
    pub item: ListItem,
    pub offer: OfferState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferSnapshot {
    pub snapshot_id: String,
    pub session_id: String,
    pub list_id: String,
    pub list_item_id: String,
    pub offer_id: String,
    pub action: DecisionAction,
    pub price_cents: i64,
    pub valid_until: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement_offer_id: Option<String>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub item_id: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmSummary {
    pub migrated: usize,
    pub skipped: usize,
    pub removed: usize,
    pub total_savings_cents: i64,
    pub stores_used: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmResult {
    pub session_id: String,
    pub success: bool,
    pub summary: ConfirmSummary,
    pub errors: Vec<ItemError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
}
