use std::collections::BTreeMap;

use crate::config::MAX_STORES_CEILING;
use crate::models::{SelectedStores, Suggestion};

/// Stores at which one item can be bought, with the cheapest price per store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemCoverage {
    pub item_id: String,
    pub store_prices: BTreeMap<String, i64>,
}

impl ItemCoverage {
    pub fn from_suggestions(item_id: impl Into<String>, suggestions: &[Suggestion]) -> Self {
        let mut store_prices = BTreeMap::<String, i64>::new();
        for suggestion in suggestions {
            store_prices
                .entry(suggestion.store_id.clone())
                .and_modify(|price| *price = (*price).min(suggestion.price_cents))
                .or_insert(suggestion.price_cents);
        }
        Self {
            item_id: item_id.into(),
            store_prices,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Gain<'a> {
    store_id: &'a str,
    new_items: usize,
    new_items_cost: i64,
}

impl Gain<'_> {
    /// More new items first, then cheaper, then lower store id.
    fn beats(&self, other: &Self) -> bool {
        self.new_items
            .cmp(&other.new_items)
            .then_with(|| other.new_items_cost.cmp(&self.new_items_cost))
            .then_with(|| other.store_id.cmp(self.store_id))
            .is_gt()
    }
}

/// Greedy bounded coverage: repeatedly adds the store that covers the most
/// still-uncovered items until the budget of `min(max_stores, 2)` is spent or
/// no store adds coverage. The result is independent of input order.
pub fn select_stores(items: &[ItemCoverage], max_stores: usize) -> SelectedStores {
    let budget = max_stores.min(MAX_STORES_CEILING);
    let mut by_store = BTreeMap::<&str, Vec<(usize, i64)>>::new();
    for (index, item) in items.iter().enumerate() {
        for (store_id, price) in &item.store_prices {
            by_store
                .entry(store_id.as_str())
                .or_default()
                .push((index, *price));
        }
    }

    let mut covered = vec![false; items.len()];
    let mut stores = Vec::new();
    while stores.len() < budget {
        let mut best: Option<Gain<'_>> = None;
        for (store_id, offers) in &by_store {
            if stores.iter().any(|selected: &String| selected == store_id) {
                continue;
            }
            let (new_items, new_items_cost) = offers
                .iter()
                .filter(|(index, _)| !covered[*index])
                .fold((0usize, 0i64), |(count, cost), (_, price)| {
                    (count + 1, cost.saturating_add(*price))
                });
            if new_items == 0 {
                continue;
            }
            let candidate = Gain {
                store_id,
                new_items,
                new_items_cost,
            };
            if best.is_none_or(|current| candidate.beats(&current)) {
                best = Some(candidate);
            }
        }

        let Some(best) = best else {
            break;
        };
        if let Some(offers) = by_store.get(best.store_id) {
            for (index, _) in offers {
                covered[*index] = true;
            }
        }
        stores.push(best.store_id.to_string());
    }

    let covered_items = covered.iter().filter(|flag| **flag).count();
    SelectedStores {
        stores,
        covered_items,
        total_items: items.len(),
        coverage_pct: coverage_pct(covered_items, items.len()),
    }
}

#[allow(clippy::cast_precision_loss, reason = "item counts stay small")]
fn coverage_pct(covered: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = covered as f64 * 100.0 / total as f64;
    (pct * 100.0).round() / 100.0
}
