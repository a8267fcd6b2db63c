//! Normalized entity structs shared across storage, indexing, and search.

use serde::{Deserialize, Serialize};

/// Matching semantics requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Whole query as one adjacency-exact phrase.
    Exact,
    /// Per-term prefix matches, OR-combined (recall-maximizing default).
    #[default]
    Fuzzy,
    /// Same compilation as `Exact`; kept distinct for API compatibility.
    Phrase,
    /// User-supplied AND/OR/NOT operators interpreted natively.
    Boolean,
    /// Per-term prefix matches, all terms required.
    Wildcard,
}

/// A source-of-truth file record.
///
/// Ownership and CRUD of these rows live outside the search core; the
/// synchronizer only ever reads them to project [`SearchableDocument`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub owner_id: i64,
    pub workspace_id: Option<i64>,
    pub name: String,
    pub path: String,
    /// User-entered description.
    pub description: Option<String>,
    /// Description produced by the categorization service.
    pub ai_description: Option<String>,
    /// Comma-joined user tags.
    pub tags: Option<String>,
    /// Comma-joined tags from the categorization service.
    pub ai_tags: Option<String>,
    pub is_favorite: bool,
    pub is_archived: bool,
    /// Ranking prior in `[0, 100]`, supplied by the source record.
    pub importance_score: f64,
    /// Unix millis. Monotonically increasing per record; doubles as the
    /// synchronizer's version guard.
    pub updated_at: i64,
    pub created_at: i64,
}

/// The denormalized document the index actually stores, one per live record.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchableDocument {
    pub record_id: i64,
    pub owner_id: i64,
    pub workspace_id: Option<i64>,
    pub name: String,
    pub path: String,
    pub description: Option<String>,
    /// De-duplicated tag set, original case preserved for display.
    pub tags: Vec<String>,
    pub is_favorite: bool,
    pub is_archived: bool,
    pub importance_score: f64,
    pub updated_at: i64,
}

impl SearchableDocument {
    /// Project a record into its searchable form.
    ///
    /// The richer (longer, after trimming) of the user and AI descriptions
    /// wins; tags from both sources are split on commas and de-duplicated
    /// case-insensitively.
    pub fn from_record(record: &FileRecord) -> Self {
        let description =
            richer_text(record.description.as_deref(), record.ai_description.as_deref());
        let tags = merge_tags(record.tags.as_deref(), record.ai_tags.as_deref());
        SearchableDocument {
            record_id: record.id,
            owner_id: record.owner_id,
            workspace_id: record.workspace_id,
            name: record.name.clone(),
            path: record.path.clone(),
            description,
            tags,
            is_favorite: record.is_favorite,
            is_archived: record.is_archived,
            importance_score: record.importance_score.clamp(0.0, 100.0),
            updated_at: record.updated_at,
        }
    }

    /// Tag set joined for indexing.
    pub fn tags_text(&self) -> String {
        self.tags.join(" ")
    }
}

fn richer_text(user: Option<&str>, ai: Option<&str>) -> Option<String> {
    let user = user.map(str::trim).filter(|s| !s.is_empty());
    let ai = ai.map(str::trim).filter(|s| !s.is_empty());
    match (user, ai) {
        (Some(u), Some(a)) => Some(if a.chars().count() > u.chars().count() {
            a.to_string()
        } else {
            u.to_string()
        }),
        (Some(u), None) => Some(u.to_string()),
        (None, Some(a)) => Some(a.to_string()),
        (None, None) => None,
    }
}

fn merge_tags(user: Option<&str>, ai: Option<&str>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for source in [user, ai].into_iter().flatten() {
        for raw in source.split(',') {
            let tag = raw.trim();
            if tag.is_empty() {
                continue;
            }
            if seen.insert(tag.to_lowercase()) {
                out.push(tag.to_string());
            }
        }
    }
    out
}

/// One ranked, annotated match.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub record_id: i64,
    pub name: String,
    pub path: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub workspace_id: Option<i64>,
    pub is_favorite: bool,
    pub is_archived: bool,
    pub importance_score: f64,
    pub rank: f64,
    pub snippet: String,
    /// `[start, end)` character offsets into `snippet`.
    pub highlight_spans: Vec<(usize, usize)>,
}

/// Which engine actually served a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineUsed {
    Index,
    Fallback,
}

/// Search response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    /// Matches before pagination.
    pub total_matches: usize,
    pub total_duration_ms: u64,
    pub engine_used: EngineUsed,
}

/// Index coverage/health for one owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStatistics {
    pub total_files: usize,
    pub workspaces_covered: usize,
    pub avg_name_length: f64,
    pub files_with_description: usize,
    pub files_with_tags: usize,
    pub coverage_percentage: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FileRecord {
        FileRecord {
            id: 1,
            owner_id: 7,
            workspace_id: Some(3),
            name: "Invoice March".into(),
            path: "/finance/invoice_march.pdf".into(),
            description: Some("short".into()),
            ai_description: Some("a considerably longer generated description".into()),
            tags: Some("Finance, invoice".into()),
            ai_tags: Some("INVOICE, quarterly ".into()),
            is_favorite: false,
            is_archived: false,
            importance_score: 80.0,
            updated_at: 1,
            created_at: 1,
        }
    }

    #[test]
    fn richer_description_wins() {
        let doc = SearchableDocument::from_record(&record());
        assert_eq!(
            doc.description.as_deref(),
            Some("a considerably longer generated description")
        );
    }

    #[test]
    fn user_description_wins_ties() {
        let mut rec = record();
        rec.description = Some("same len".into());
        rec.ai_description = Some("same le!".into());
        let doc = SearchableDocument::from_record(&rec);
        assert_eq!(doc.description.as_deref(), Some("same len"));
    }

    #[test]
    fn tags_merge_dedupes_case_insensitively() {
        let doc = SearchableDocument::from_record(&record());
        assert_eq!(doc.tags, vec!["Finance", "invoice", "quarterly"]);
    }

    #[test]
    fn importance_is_clamped() {
        let mut rec = record();
        rec.importance_score = 250.0;
        assert_eq!(SearchableDocument::from_record(&rec).importance_score, 100.0);
        rec.importance_score = -5.0;
        assert_eq!(SearchableDocument::from_record(&rec).importance_score, 0.0);
    }

    #[test]
    fn blank_descriptions_become_none() {
        let mut rec = record();
        rec.description = Some("   ".into());
        rec.ai_description = None;
        assert!(SearchableDocument::from_record(&rec).description.is_none());
    }
}
