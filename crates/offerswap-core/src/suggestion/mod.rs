//! Ranked replacement candidates for expired list items.
//!
//! Search runs in two passes. The first asks for offers of the same brand
//! with a similar name; only when it yields nothing does the second pass drop
//! the brand constraint. A same-brand option therefore always wins over a
//! different-brand one, even one that would score higher.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::{EngineConfig, ScoringWeights};
use crate::error::{MigrationError, Result};
use crate::models::{Candidate, CandidateQuery, ExpiredListItem, Suggestion};
use crate::search::CandidateSearch;

mod explain;
mod scoring;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPass {
    SameBrand,
    NameOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedSuggestions {
    pub item_id: String,
    pub pass: SearchPass,
    pub suggestions: Vec<Suggestion>,
}

#[derive(Clone)]
pub struct SuggestionEngine {
    search: Arc<dyn CandidateSearch>,
    weights: ScoringWeights,
    per_item: usize,
    fetch_limit: usize,
    currency_symbol: String,
}

impl std::fmt::Debug for SuggestionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuggestionEngine")
            .field("weights", &self.weights)
            .field("per_item", &self.per_item)
            .finish_non_exhaustive()
    }
}

impl SuggestionEngine {
    pub fn new(search: Arc<dyn CandidateSearch>, config: &EngineConfig) -> Self {
        Self {
            search,
            weights: config.scoring,
            per_item: config.suggestions_per_item.max(1),
            fetch_limit: config.candidate_fetch_limit.max(config.suggestions_per_item),
            currency_symbol: config.currency_symbol.clone(),
        }
    }

    pub fn suggest(&self, entry: &ExpiredListItem, at: DateTime<Utc>) -> Result<RankedSuggestions> {
        let brand = entry
            .item
            .brand
            .as_deref()
            .map(str::trim)
            .filter(|brand| !brand.is_empty());

        if let Some(brand) = brand {
            let same_brand = self.search_pass(entry, Some(brand), at)?;
            if !same_brand.is_empty() {
                return Ok(self.rank(entry, same_brand, SearchPass::SameBrand));
            }
        }
        let name_only = self.search_pass(entry, None, at)?;
        Ok(self.rank(entry, name_only, SearchPass::NameOnly))
    }

    /// Suggestions for every entry, in input order. Items are scored on
    /// scoped worker threads; the result does not depend on scheduling.
    pub fn suggest_all(
        &self,
        entries: &[ExpiredListItem],
        at: DateTime<Utc>,
    ) -> Result<Vec<RankedSuggestions>> {
        let workers = thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1)
            .min(entries.len());
        if workers <= 1 {
            return entries.iter().map(|entry| self.suggest(entry, at)).collect();
        }

        let chunk_size = entries.len().div_ceil(workers);
        let chunks = thread::scope(|scope| {
            let handles = entries
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|entry| self.suggest(entry, at))
                            .collect::<Result<Vec<_>>>()
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().map_err(|_| {
                        MigrationError::Internal("suggestion worker panicked".to_string())
                    })?
                })
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(chunks.into_iter().flatten().collect())
    }

    fn search_pass(
        &self,
        entry: &ExpiredListItem,
        brand: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Vec<Candidate>> {
        let query = CandidateQuery {
            brand: brand.map(str::to_string),
            name: entry.item.name.clone(),
            store_scope: None,
            valid_at: at,
            limit: self.fetch_limit,
        };
        let mut seen = HashSet::new();
        let candidates = self
            .search
            .search_candidates(&query)?
            .into_iter()
            .filter(|candidate| candidate.offer_id != entry.item.offer_id)
            .filter(|candidate| candidate.valid_until > at)
            .filter(|candidate| seen.insert(candidate.offer_id.clone()))
            .collect::<Vec<_>>();
        debug!(
            item_id = %entry.item.item_id,
            brand_constrained = brand.is_some(),
            candidates = candidates.len(),
            "candidate search pass"
        );
        Ok(candidates)
    }

    fn rank(
        &self,
        entry: &ExpiredListItem,
        candidates: Vec<Candidate>,
        pass: SearchPass,
    ) -> RankedSuggestions {
        let mut suggestions = candidates
            .into_iter()
            .map(|candidate| self.to_suggestion(entry, candidate))
            .collect::<Vec<_>>();
        suggestions.sort_by(scoring::score_ordering);
        suggestions.truncate(self.per_item);
        RankedSuggestions {
            item_id: entry.item.item_id.clone(),
            pass,
            suggestions,
        }
    }

    fn to_suggestion(&self, entry: &ExpiredListItem, candidate: Candidate) -> Suggestion {
        let parts = scoring::breakdown(
            &entry.item.name,
            entry.item.brand.as_deref(),
            entry.offer.price_cents,
            &candidate.name,
            candidate.brand.as_deref(),
            candidate.price_cents,
        );
        let total_score = scoring::total_score(&self.weights, &parts);
        let explanation = explain::explain(
            &self.weights,
            &parts,
            entry.offer.price_cents,
            candidate.price_cents,
            &self.currency_symbol,
        );
        Suggestion {
            suggestion_id: suggestion_id(&entry.item.item_id, &candidate.offer_id),
            offer_id: candidate.offer_id,
            product_id: candidate.product_id,
            store_id: candidate.store_id,
            name: candidate.name,
            brand: candidate.brand,
            price_cents: candidate.price_cents,
            valid_until: candidate.valid_until,
            score_breakdown: parts,
            total_score,
            explanation,
        }
    }
}

fn suggestion_id(item_id: &str, offer_id: &str) -> String {
    format!("{item_id}:{offer_id}")
}
