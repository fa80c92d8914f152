//! Primary-store boundary: shopping lists, their items, the offer catalog and
//! durable offer snapshots.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{ExpiredListItem, ListItem, OfferSnapshot, OfferState};

mod sqlite;

pub use sqlite::SqliteListStore;

/// New offer reference written onto a list item by a REPLACE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReplacement {
    pub offer_id: String,
    pub name: String,
    pub brand: Option<String>,
}

pub trait ListStore: Send + Sync {
    fn list_owner(&self, list_id: &str) -> Result<Option<String>>;

    /// Items of `list_id` whose referenced offer is no longer valid at `at`,
    /// in list order.
    fn expired_items(&self, list_id: &str, at: DateTime<Utc>) -> Result<Vec<ExpiredListItem>>;

    /// Runs `work` in one unit of work. Everything `work` wrote is committed
    /// when it returns `Ok` and rolled back otherwise.
    fn transaction(&self, work: &mut dyn FnMut(&dyn ListTransaction) -> Result<()>)
    -> Result<()>;
}

/// Reads and writes visible inside one primary-store transaction.
pub trait ListTransaction {
    fn list_item(&self, item_id: &str) -> Result<Option<ListItem>>;

    fn offer_state(&self, offer_id: &str) -> Result<Option<OfferState>>;

    fn insert_snapshot(&self, snapshot: &OfferSnapshot) -> Result<()>;

    fn replace_item_offer(
        &self,
        item_id: &str,
        replacement: &ItemReplacement,
        at: DateTime<Utc>,
    ) -> Result<()>;

    fn delete_item(&self, item_id: &str) -> Result<()>;
}
