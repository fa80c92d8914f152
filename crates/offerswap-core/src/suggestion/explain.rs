use crate::config::ScoringWeights;
use crate::models::ScoreBreakdown;

use super::scoring::{Component, components_by_contribution};

/// Renders e.g. `same brand, 92% name match, €0.30 cheaper`, listing the
/// score components from largest to smallest weighted contribution.
pub(super) fn explain(
    weights: &ScoringWeights,
    parts: &ScoreBreakdown,
    original_price_cents: i64,
    candidate_price_cents: i64,
    currency_symbol: &str,
) -> String {
    components_by_contribution(weights, parts)
        .iter()
        .map(|component| match component {
            Component::Brand => brand_phrase(parts.brand_match),
            Component::Name => name_phrase(parts.name_similarity),
            Component::Price => {
                price_phrase(original_price_cents, candidate_price_cents, currency_symbol)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn brand_phrase(brand_match: f64) -> String {
    if brand_match >= 1.0 {
        "same brand".to_string()
    } else {
        "different brand".to_string()
    }
}

fn name_phrase(similarity: f64) -> String {
    let pct = (similarity * 100.0).round().clamp(0.0, 100.0);
    format!("{pct:.0}% name match")
}

fn price_phrase(original_cents: i64, candidate_cents: i64, currency_symbol: &str) -> String {
    match original_cents.cmp(&candidate_cents) {
        std::cmp::Ordering::Equal => "same price".to_string(),
        std::cmp::Ordering::Greater => format!(
            "{} cheaper",
            format_money(original_cents - candidate_cents, currency_symbol)
        ),
        std::cmp::Ordering::Less => format!(
            "{} more expensive",
            format_money(candidate_cents - original_cents, currency_symbol)
        ),
    }
}

#[must_use]
fn format_money(cents: i64, currency_symbol: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{currency_symbol}{}.{:02}", abs / 100, abs % 100)
}
