//! Composite relevance ranking.
//!
//! The lexical score the index produced is only the starting point; the
//! final rank folds in the exact-name, favorite, and importance boosts and
//! imposes a deterministic total order so pagination is stable.

use crate::config::RankingWeights;
use crate::search::tantivy::IndexCandidate;
use std::cmp::Ordering;

/// A candidate with its final composite rank.
#[derive(Debug, Clone)]
pub struct Ranked {
    pub candidate: IndexCandidate,
    pub rank: f64,
}

/// `rank = lexical x exact-name x favorite x importance prior`.
///
/// The importance prior maps `[0, 100]` onto
/// `[1.0, 1.0 + importance_weight]`.
pub fn composite_rank(
    lexical_score: f32,
    name: &str,
    raw_query: &str,
    is_favorite: bool,
    importance_score: f64,
    weights: &RankingWeights,
) -> f64 {
    let mut rank = lexical_score as f64;
    if name_contains_query(name, raw_query) {
        rank *= weights.exact_name_boost;
    }
    if is_favorite {
        rank *= weights.favorite_boost;
    }
    rank * (1.0 + (importance_score.clamp(0.0, 100.0) / 100.0) * weights.importance_weight)
}

fn name_contains_query(name: &str, raw_query: &str) -> bool {
    !raw_query.is_empty() && name.to_lowercase().contains(&raw_query.to_lowercase())
}

/// Rank every candidate and sort: rank desc, importance desc, record id asc.
pub fn rank_candidates(
    candidates: Vec<IndexCandidate>,
    raw_query: &str,
    weights: &RankingWeights,
) -> Vec<Ranked> {
    let mut ranked: Vec<Ranked> = candidates
        .into_iter()
        .map(|candidate| {
            let rank = composite_rank(
                candidate.lexical_score,
                &candidate.name,
                raw_query,
                candidate.is_favorite,
                candidate.importance_score,
                weights,
            );
            Ranked { candidate, rank }
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.rank
            .partial_cmp(&a.rank)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.candidate
                    .importance_score
                    .partial_cmp(&a.candidate.importance_score)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.candidate.record_id.cmp(&b.candidate.record_id))
    });
    ranked
}

/// Apply `(offset, limit)` to the fully sorted list.
pub fn paginate<T>(items: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
    items.into_iter().skip(offset).take(limit).collect()
}
