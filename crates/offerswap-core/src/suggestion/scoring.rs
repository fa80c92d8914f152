use std::cmp::Ordering;
use std::collections::HashSet;

use crate::config::ScoringWeights;
use crate::models::{ScoreBreakdown, Suggestion};
use crate::search::{name_tokens, same_brand};

const SCORE_PRECISION: f64 = 1_000_000.0;

pub(super) fn score_ordering(a: &Suggestion, b: &Suggestion) -> Ordering {
    b.total_score
        .total_cmp(&a.total_score)
        .then_with(|| a.price_cents.cmp(&b.price_cents))
        .then_with(|| a.offer_id.cmp(&b.offer_id))
}

pub(super) fn breakdown(
    item_name: &str,
    item_brand: Option<&str>,
    item_price_cents: i64,
    candidate_name: &str,
    candidate_brand: Option<&str>,
    candidate_price_cents: i64,
) -> ScoreBreakdown {
    ScoreBreakdown {
        brand_match: if same_brand(item_brand, candidate_brand) {
            1.0
        } else {
            0.0
        },
        name_similarity: round_score(name_similarity(item_name, candidate_name)),
        price_proximity: round_score(price_proximity(item_price_cents, candidate_price_cents)),
    }
}

/// Weighted sum, rounded so equal inputs always compare equal.
pub(super) fn total_score(weights: &ScoringWeights, parts: &ScoreBreakdown) -> f64 {
    round_score(
        weights.price.mul_add(
            parts.price_proximity,
            weights
                .brand
                .mul_add(parts.brand_match, weights.name * parts.name_similarity),
        ),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Component {
    Brand,
    Name,
    Price,
}

/// Components ordered by their weighted contribution, largest first; equal
/// contributions keep brand, name, price order.
pub(super) fn components_by_contribution(
    weights: &ScoringWeights,
    parts: &ScoreBreakdown,
) -> [Component; 3] {
    let mut ranked = [
        (Component::Brand, weights.brand * parts.brand_match),
        (Component::Name, weights.name * parts.name_similarity),
        (Component::Price, weights.price * parts.price_proximity),
    ];
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    [ranked[0].0, ranked[1].0, ranked[2].0]
}

/// Blend of token Jaccard overlap and character-trigram Dice coefficient.
pub(super) fn name_similarity(left: &str, right: &str) -> f64 {
    let left_tokens = name_tokens(left).into_iter().collect::<HashSet<_>>();
    let right_tokens = name_tokens(right).into_iter().collect::<HashSet<_>>();
    let jaccard = if left_tokens.is_empty() || right_tokens.is_empty() {
        0.0
    } else {
        let inter = left_tokens.intersection(&right_tokens).count();
        let union = left_tokens.union(&right_tokens).count();
        usize_to_f64(inter) / usize_to_f64(union)
    };
    0.5f64.mul_add(jaccard, 0.5 * trigram_dice(left, right))
}

fn trigram_dice(left: &str, right: &str) -> f64 {
    let left = trigrams(left);
    let right = trigrams(right);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let inter = left.intersection(&right).count();
    (2.0 * usize_to_f64(inter)) / usize_to_f64(left.len() + right.len())
}

fn trigrams(text: &str) -> HashSet<[char; 3]> {
    let normalized = text
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_alphanumeric() { ch } else { ' ' })
        .collect::<String>();
    let padded = format!(" {} ", normalized.split_whitespace().collect::<Vec<_>>().join(" "));
    let chars = padded.chars().collect::<Vec<_>>();
    chars
        .windows(3)
        .map(|window| [window[0], window[1], window[2]])
        .collect()
}

/// 1.0 for identical prices, falling linearly with the relative difference.
pub(super) fn price_proximity(original_cents: i64, candidate_cents: i64) -> f64 {
    let high = original_cents.max(candidate_cents);
    if high <= 0 {
        return 1.0;
    }
    let diff = original_cents.abs_diff(candidate_cents);
    (1.0 - u64_to_f64(diff) / i64_to_f64(high)).clamp(0.0, 1.0)
}

fn round_score(value: f64) -> f64 {
    (value * SCORE_PRECISION).round() / SCORE_PRECISION
}

#[allow(clippy::cast_precision_loss, reason = "token and trigram counts stay small")]
fn usize_to_f64(value: usize) -> f64 {
    value as f64
}

#[allow(clippy::cast_precision_loss, reason = "prices in cents stay far below 2^52")]
fn u64_to_f64(value: u64) -> f64 {
    value as f64
}

#[allow(clippy::cast_precision_loss, reason = "prices in cents stay far below 2^52")]
fn i64_to_f64(value: i64) -> f64 {
    value as f64
}
