//! Owner-scoped vocabulary: query suggestions and index statistics.
//!
//! The registry shadows the inverted index with the per-owner bookkeeping
//! tantivy does not expose: term frequencies for prefix suggestions and
//! per-document metadata for coverage statistics. It is rebuilt by the
//! synchronizer's populate pass at startup and kept current by the same
//! upsert/remove flow that feeds the index.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use crate::model::types::{IndexStatistics, SearchableDocument};
use crate::search::query::tokenize;

#[derive(Debug, Clone)]
struct DocMeta {
    workspace_id: Option<i64>,
    name_chars: usize,
    has_description: bool,
    has_tags: bool,
    tokens: Vec<String>,
}

#[derive(Debug, Default)]
struct OwnerVocab {
    term_freqs: BTreeMap<String, u32>,
    docs: HashMap<i64, DocMeta>,
}

impl OwnerVocab {
    fn add(&mut self, record_id: i64, meta: DocMeta) {
        self.drop_doc(record_id);
        for token in &meta.tokens {
            *self.term_freqs.entry(token.clone()).or_insert(0) += 1;
        }
        self.docs.insert(record_id, meta);
    }

    fn drop_doc(&mut self, record_id: i64) {
        if let Some(old) = self.docs.remove(&record_id) {
            for token in &old.tokens {
                if let Some(freq) = self.term_freqs.get_mut(token) {
                    *freq = freq.saturating_sub(1);
                    if *freq == 0 {
                        self.term_freqs.remove(token);
                    }
                }
            }
        }
    }
}

/// Thread-safe vocabulary registry across owners.
#[derive(Default)]
pub struct VocabularyIndex {
    owners: RwLock<HashMap<i64, OwnerVocab>>,
    /// record id -> owner id, so removal needs no owner lookup.
    doc_owner: RwLock<HashMap<i64, i64>>,
}

impl VocabularyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, document: &SearchableDocument) {
        let mut tokens = tokenize(&document.name);
        if let Some(desc) = &document.description {
            tokens.extend(tokenize(desc));
        }
        tokens.extend(tokenize(&document.tags_text()));
        tokens.extend(tokenize(&document.path));

        let meta = DocMeta {
            workspace_id: document.workspace_id,
            name_chars: document.name.chars().count(),
            has_description: document.description.is_some(),
            has_tags: !document.tags.is_empty(),
            tokens,
        };

        self.remove(document.record_id);
        let mut owners = self.owners.write();
        owners
            .entry(document.owner_id)
            .or_default()
            .add(document.record_id, meta);
        self.doc_owner
            .write()
            .insert(document.record_id, document.owner_id);
    }

    pub fn remove(&self, record_id: i64) {
        let Some(owner_id) = self.doc_owner.write().remove(&record_id) else {
            return;
        };
        let mut owners = self.owners.write();
        if let Some(vocab) = owners.get_mut(&owner_id) {
            vocab.drop_doc(record_id);
            if vocab.docs.is_empty() {
                owners.remove(&owner_id);
            }
        }
    }

    pub fn clear(&self) {
        self.owners.write().clear();
        self.doc_owner.write().clear();
    }

    /// Distinct terms of `owner_id` starting with `partial` (case-folded),
    /// by descending frequency then ascending term, capped at `limit`.
    pub fn suggest(&self, partial: &str, owner_id: i64, limit: usize) -> Vec<String> {
        let prefix = partial.trim().to_lowercase();
        if prefix.is_empty() || limit == 0 {
            return Vec::new();
        }
        let owners = self.owners.read();
        let Some(vocab) = owners.get(&owner_id) else {
            return Vec::new();
        };
        let mut matches: Vec<(&String, u32)> = vocab
            .term_freqs
            .range(prefix.clone()..)
            .take_while(|(term, _)| term.starts_with(&prefix))
            .map(|(term, freq)| (term, *freq))
            .collect();
        matches.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        matches
            .into_iter()
            .take(limit)
            .map(|(term, _)| term.clone())
            .collect()
    }

    /// Coverage/health over everything indexed for `owner_id`.
    pub fn statistics(&self, owner_id: i64) -> IndexStatistics {
        let owners = self.owners.read();
        let Some(vocab) = owners.get(&owner_id) else {
            return IndexStatistics::default();
        };
        let total = vocab.docs.len();
        let mut workspaces = std::collections::HashSet::new();
        let mut name_chars = 0usize;
        let mut with_description = 0usize;
        let mut with_tags = 0usize;
        for meta in vocab.docs.values() {
            if let Some(ws) = meta.workspace_id {
                workspaces.insert(ws);
            }
            name_chars += meta.name_chars;
            if meta.has_description {
                with_description += 1;
            }
            if meta.has_tags {
                with_tags += 1;
            }
        }
        IndexStatistics {
            total_files: total,
            workspaces_covered: workspaces.len(),
            avg_name_length: if total == 0 {
                0.0
            } else {
                name_chars as f64 / total as f64
            },
            files_with_description: with_description,
            files_with_tags: with_tags,
            coverage_percentage: (with_description + with_tags) as f64 / total.max(1) as f64
                * 100.0,
        }
    }
}
