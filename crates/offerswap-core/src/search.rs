use crate::error::Result;
use crate::models::{Candidate, CandidateQuery};

/// Catalog lookup consumed by the suggestion engine. Implementations return
/// only offers valid at `query.valid_at`; ranking is done by the caller.
pub trait CandidateSearch: Send + Sync {
    fn search_candidates(&self, query: &CandidateQuery) -> Result<Vec<Candidate>>;

    /// Monotonic dataset version; advances whenever offers change.
    fn catalog_version(&self) -> Result<u64>;
}

/// Lower-cased alphanumeric tokens of at least two characters, in order,
/// without duplicates.
pub fn name_tokens(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for raw in text.split(|ch: char| !ch.is_alphanumeric()) {
        let token = raw.to_lowercase();
        if token.chars().count() < 2 || tokens.contains(&token) {
            continue;
        }
        tokens.push(token);
    }
    tokens
}

/// Case-folded name used for substring matching against name tokens.
#[must_use]
pub fn name_key(name: &str) -> String {
    name.to_lowercase()
}

/// Case-folded, trimmed brand used for brand equality. Blank brands have no
/// key.
#[must_use]
pub fn brand_key(brand: &str) -> Option<String> {
    let brand = brand.trim();
    (!brand.is_empty()).then(|| brand.to_lowercase())
}

#[must_use]
pub fn same_brand(left: Option<&str>, right: Option<&str>) -> bool {
    match (left.and_then(brand_key), right.and_then(brand_key)) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}
