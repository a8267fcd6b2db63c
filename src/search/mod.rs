//! Search layer facade.
//!
//! This module provides the search core for frs, including:
//!
//! - **[`query`]**: Query normalization and per-mode compilation to Tantivy queries.
//! - **[`tantivy`]**: Tantivy index creation, schema management, and document upserts.
//! - **[`rank`]**: Composite relevance ranking and deterministic result ordering.
//! - **[`snippet`]**: Bounded snippet extraction with highlight spans.
//! - **[`suggest`]**: Owner-scoped vocabulary for suggestions and index statistics.
//! - **[`engine`]**: The long-lived `SearchEngine` handle tying it all together.

pub mod engine;
pub mod query;
pub mod rank;
pub mod snippet;
pub mod suggest;
pub mod tantivy;

pub use engine::{SearchEngine, SearchRequest};

use thiserror::Error;

/// Errors a search caller can observe.
///
/// Validation variants are rejected before the index is touched.
/// `IndexUnavailable` is the typed degraded-mode condition: `search` converts
/// it into the fallback scan, `suggest`/`statistics` into empty results, and
/// `optimize`/`rebuild` into a `false` return. It only escapes a search when
/// the fallback itself is unusable.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("query {normalized:?} is shorter than {min} characters after normalization")]
    QueryTooShort { normalized: String, min: usize },

    #[error("query has no searchable terms: {0:?}")]
    InvalidQuery(String),

    #[error("limit must be between 1 and {max}, got {got}")]
    InvalidLimit { got: usize, max: usize },

    #[error("offset must be at most {max}, got {got}")]
    InvalidOffset { got: usize, max: usize },

    #[error("search index unavailable")]
    IndexUnavailable(#[source] anyhow::Error),
}

impl SearchError {
    /// Whether this error denotes a degraded index rather than caller error.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SearchError::IndexUnavailable(_))
    }
}
