//! Engine configuration: ranking weights, snippet window, limits.
//!
//! The reference weighting constants are empirical, so they live here as
//! tunable fields rather than hard constants. Every struct deserializes from
//! TOML with full defaults, so a config file only needs the keys it changes.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Multipliers applied by the ranker on top of the lexical score.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    /// Query-time boost on the `name` field relative to description/tags.
    pub name_boost: f32,
    /// Applied when the document name contains the raw query verbatim.
    pub exact_name_boost: f64,
    /// Applied when the document is a favorite.
    pub favorite_boost: f64,
    /// Scale of the importance prior: `1 + importance/100 * importance_weight`.
    pub importance_weight: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        RankingWeights {
            name_boost: 2.0,
            exact_name_boost: 2.0,
            favorite_boost: 1.5,
            importance_weight: 0.5,
        }
    }
}

/// Knobs for query validation and result sizing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchLimits {
    /// Hard cap on `limit`; requests above it are rejected.
    pub max_limit: usize,
    pub default_limit: usize,
    /// Hard cap on `offset`; requests beyond it are rejected.
    pub max_offset: usize,
    /// Queries shorter than this after normalization are rejected.
    pub min_query_chars: usize,
    /// Upper bound on candidates pulled from the index before re-ranking.
    pub candidate_pool: usize,
    pub suggest_default_limit: usize,
    pub suggest_max_limit: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        SearchLimits {
            max_limit: 200,
            default_limit: 20,
            max_offset: 10_000,
            min_query_chars: 2,
            candidate_pool: 10_000,
            suggest_default_limit: 5,
            suggest_max_limit: 20,
        }
    }
}

/// Snippet extraction bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnippetConfig {
    /// Maximum window size in characters (ellipsis excluded).
    pub window_chars: usize,
}

impl Default for SnippetConfig {
    fn default() -> Self {
        SnippetConfig { window_chars: 200 }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub ranking: RankingWeights,
    pub limits: SearchLimits,
    pub snippet: SnippetConfig,
}

impl SearchConfig {
    /// Load from a TOML file, or defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("read config file {}", p.display()))?;
                toml::from_str(&raw).with_context(|| format!("parse config file {}", p.display()))
            }
            None => Ok(SearchConfig::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let cfg = SearchConfig::default();
        assert_eq!(cfg.ranking.name_boost, 2.0);
        assert_eq!(cfg.ranking.exact_name_boost, 2.0);
        assert_eq!(cfg.ranking.favorite_boost, 1.5);
        assert_eq!(cfg.ranking.importance_weight, 0.5);
        assert_eq!(cfg.limits.max_limit, 200);
        assert_eq!(cfg.snippet.window_chars, 200);
    }

    #[test]
    fn partial_toml_overrides_only_named_keys() {
        let cfg: SearchConfig = toml::from_str(
            r#"
            [ranking]
            favorite_boost = 3.0

            [limits]
            max_limit = 50
            "#,
        )
        .unwrap();
        assert_eq!(cfg.ranking.favorite_boost, 3.0);
        assert_eq!(cfg.ranking.exact_name_boost, 2.0);
        assert_eq!(cfg.limits.max_limit, 50);
        assert_eq!(cfg.limits.default_limit, 20);
    }
}
