//! The long-lived search engine handle.
//!
//! One `SearchEngine` per process owns the tantivy index, the vocabulary
//! registry, and a handle to the source record store. Every public entry
//! point degrades rather than panics: validation errors are the only thing
//! `search` surfaces, index trouble turns into the substring fallback, and
//! `suggest`/`statistics`/`optimize`/`rebuild` report empty/false instead of
//! propagating storage errors.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Result, anyhow};
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::model::types::{
    EngineUsed, FileRecord, IndexStatistics, MatchMode, SearchHit, SearchResponse,
    SearchableDocument,
};
use crate::search::SearchError;
use crate::search::query::{self, CompiledQuery, Scope};
use crate::search::rank::{self, Ranked};
use crate::search::snippet;
use crate::search::suggest::VocabularyIndex;
use crate::search::tantivy::FileIndex;
use crate::storage::sqlite::RecordStore;

/// One search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub owner_id: i64,
    pub workspace_id: Option<i64>,
    pub mode: MatchMode,
    pub limit: usize,
    pub offset: usize,
    pub include_archived: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, owner_id: i64) -> Self {
        SearchRequest {
            query: query.into(),
            owner_id,
            workspace_id: None,
            mode: MatchMode::default(),
            limit: 20,
            offset: 0,
            include_archived: false,
        }
    }
}

pub struct SearchEngine {
    store: Arc<RecordStore>,
    index: Option<FileIndex>,
    vocab: VocabularyIndex,
    config: SearchConfig,
}

impl SearchEngine {
    /// Open the engine over `store`, with the physical index at `index_dir`.
    ///
    /// A broken or unopenable index does not fail construction: the engine
    /// comes up degraded and every search reports `engine_used: fallback`
    /// until a rebuild succeeds.
    pub fn open(store: Arc<RecordStore>, index_dir: &Path, config: SearchConfig) -> Self {
        let index = match FileIndex::open_or_create(index_dir) {
            Ok(index) => Some(index),
            Err(e) => {
                warn!(
                    index_dir = %index_dir.display(),
                    error = %e,
                    "search index unavailable, starting degraded"
                );
                None
            }
        };
        SearchEngine {
            store,
            index,
            vocab: VocabularyIndex::new(),
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn index_available(&self) -> bool {
        self.index.is_some()
    }

    /// The full non-archived record set from the source store, for the
    /// synchronizer's populate pass.
    pub fn list_active_source_records(&self) -> Result<Vec<FileRecord>> {
        self.store.list_active_records()
    }

    /// Insert-or-replace one document in the index and vocabulary.
    ///
    /// The vocabulary is updated even when the physical index is down, so
    /// suggestions keep working in degraded mode; the error still propagates
    /// so the synchronizer can count the record as pending reconciliation.
    pub fn upsert_document(&self, document: &SearchableDocument) -> Result<()> {
        self.vocab.upsert(document);
        match &self.index {
            Some(index) => index.upsert(document),
            None => Err(anyhow!("index unavailable")),
        }
    }

    /// Remove one document from the index and vocabulary. Idempotent.
    pub fn remove_document(&self, record_id: i64) -> Result<()> {
        self.vocab.remove(record_id);
        match &self.index {
            Some(index) => index.remove(record_id),
            None => Err(anyhow!("index unavailable")),
        }
    }

    pub fn search(&self, req: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();
        let limits = &self.config.limits;
        if req.limit == 0 || req.limit > limits.max_limit {
            return Err(SearchError::InvalidLimit {
                got: req.limit,
                max: limits.max_limit,
            });
        }
        if req.offset > limits.max_offset {
            return Err(SearchError::InvalidOffset {
                got: req.offset,
                max: limits.max_offset,
            });
        }
        let compiled = query::compile(&req.query, req.mode, limits.min_query_chars)?;
        let scope = Scope {
            owner_id: req.owner_id,
            workspace_id: req.workspace_id,
            include_archived: req.include_archived,
        };

        let (results, total_matches, engine_used) = match self.lookup_ranked(&compiled, &scope) {
            Ok(ranked) => {
                let total = ranked.len();
                let page = rank::paginate(ranked, req.offset, req.limit);
                (self.annotate_ranked(page, &compiled), total, EngineUsed::Index)
            }
            Err(SearchError::IndexUnavailable(cause)) => {
                warn!(
                    owner_id = req.owner_id,
                    error = %cause,
                    "index lookup failed, degrading to substring scan"
                );
                let records = self
                    .store
                    .substring_scan(
                        req.owner_id,
                        &compiled.raw,
                        req.workspace_id,
                        req.include_archived,
                    )
                    .map_err(SearchError::IndexUnavailable)?;
                let total = records.len();
                let page = rank::paginate(records, req.offset, req.limit);
                (
                    self.annotate_records(page, &compiled),
                    total,
                    EngineUsed::Fallback,
                )
            }
            Err(other) => return Err(other),
        };

        let response = SearchResponse {
            results,
            total_matches,
            total_duration_ms: started.elapsed().as_millis() as u64,
            engine_used,
        };
        info!(
            owner_id = req.owner_id,
            mode = ?req.mode,
            engine = ?engine_used,
            total_matches,
            duration_ms = response.total_duration_ms,
            "search_complete"
        );
        Ok(response)
    }

    /// Completion candidates for a partial query, owner-scoped.
    pub fn suggest(&self, partial: &str, owner_id: i64, limit: Option<usize>) -> Vec<String> {
        let limits = &self.config.limits;
        let limit = limit
            .unwrap_or(limits.suggest_default_limit)
            .clamp(1, limits.suggest_max_limit);
        self.vocab.suggest(partial, owner_id, limit)
    }

    /// Index coverage for one owner; zeroed when nothing is registered.
    pub fn statistics(&self, owner_id: i64) -> IndexStatistics {
        self.vocab.statistics(owner_id)
    }

    /// Compact the physical index. `false` means the index is unavailable or
    /// the merge failed; reads were served throughout either way.
    pub fn optimize(&self) -> bool {
        match &self.index {
            Some(index) => match index.optimize() {
                Ok(()) => {
                    info!(num_docs = index.num_docs(), "index optimized");
                    true
                }
                Err(e) => {
                    warn!(error = %e, "index optimize failed");
                    false
                }
            },
            None => {
                warn!("optimize skipped, index unavailable");
                false
            }
        }
    }

    /// Regenerate the whole index (and vocabulary) from the source store.
    pub fn rebuild(&self) -> bool {
        let records = match self.store.list_active_records() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "rebuild aborted, cannot read source records");
                return false;
            }
        };
        let documents: Vec<SearchableDocument> =
            records.iter().map(SearchableDocument::from_record).collect();
        self.vocab.clear();
        for document in &documents {
            self.vocab.upsert(document);
        }
        match &self.index {
            Some(index) => match index.rebuild_from(&documents) {
                Ok(()) => {
                    info!(documents = documents.len(), "index rebuilt");
                    true
                }
                Err(e) => {
                    warn!(error = %e, "index rebuild failed, previous index kept");
                    false
                }
            },
            None => {
                warn!("rebuild skipped, index unavailable");
                false
            }
        }
    }

    /// Reload the vocabulary registry from the source store without touching
    /// the physical index. Used at process startup so suggestions and
    /// statistics are served from the first call.
    pub fn warm_vocabulary(&self) -> Result<usize> {
        let records = self.store.list_active_records()?;
        self.vocab.clear();
        let mut loaded = 0;
        for record in &records {
            self.vocab.upsert(&SearchableDocument::from_record(record));
            loaded += 1;
        }
        debug!(loaded, "vocabulary warmed");
        Ok(loaded)
    }

    fn lookup_ranked(
        &self,
        compiled: &CompiledQuery,
        scope: &Scope,
    ) -> Result<Vec<Ranked>, SearchError> {
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| SearchError::IndexUnavailable(anyhow!("index not open")))?;
        let query = query::build_query(
            compiled,
            &index.index,
            &index.fields,
            scope,
            self.config.ranking.name_boost,
        )?;
        let pool = self.config.limits.candidate_pool;
        let candidates = index
            .lookup(&*query, pool)
            .map_err(SearchError::IndexUnavailable)?;
        if candidates.len() >= pool {
            info!(pool, "candidate pool cap reached, ranking a truncated set");
        }
        Ok(rank::rank_candidates(
            candidates,
            &compiled.raw,
            &self.config.ranking,
        ))
    }

    fn annotate_ranked(&self, page: Vec<Ranked>, compiled: &CompiledQuery) -> Vec<SearchHit> {
        let window = self.config.snippet.window_chars;
        page.into_iter()
            .map(|ranked| {
                let c = ranked.candidate;
                let snip = snippet::build(
                    c.description.as_deref(),
                    &c.name,
                    &compiled.highlight_terms,
                    window,
                );
                SearchHit {
                    record_id: c.record_id,
                    name: c.name,
                    path: c.path,
                    description: c.description,
                    tags: c.tags,
                    workspace_id: c.workspace_id,
                    is_favorite: c.is_favorite,
                    is_archived: c.is_archived,
                    importance_score: c.importance_score,
                    rank: ranked.rank,
                    snippet: snip.text,
                    highlight_spans: snip.spans,
                }
            })
            .collect()
    }

    fn annotate_records(&self, page: Vec<FileRecord>, compiled: &CompiledQuery) -> Vec<SearchHit> {
        let window = self.config.snippet.window_chars;
        page.into_iter()
            .map(|record| {
                let doc = SearchableDocument::from_record(&record);
                let snip = snippet::build(
                    doc.description.as_deref(),
                    &doc.name,
                    &compiled.highlight_terms,
                    window,
                );
                SearchHit {
                    record_id: doc.record_id,
                    name: doc.name,
                    path: doc.path,
                    description: doc.description,
                    tags: doc.tags,
                    workspace_id: doc.workspace_id,
                    is_favorite: doc.is_favorite,
                    is_archived: doc.is_archived,
                    importance_score: doc.importance_score,
                    rank: 0.0,
                    snippet: snip.text,
                    highlight_spans: snip.spans,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::NewFileRecord;
    use tempfile::TempDir;

    fn engine_with_index() -> (TempDir, Arc<RecordStore>, SearchEngine) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RecordStore::open_in_memory().unwrap());
        let engine = SearchEngine::open(store.clone(), dir.path(), SearchConfig::default());
        assert!(engine.index_available());
        (dir, store, engine)
    }

    fn degraded_engine() -> (TempDir, Arc<RecordStore>, SearchEngine) {
        let dir = TempDir::new().unwrap();
        // A file where the index dir should be makes open fail.
        let bogus = dir.path().join("index");
        std::fs::write(&bogus, b"not a directory").unwrap();
        let store = Arc::new(RecordStore::open_in_memory().unwrap());
        let engine = SearchEngine::open(store.clone(), &bogus, SearchConfig::default());
        assert!(!engine.index_available());
        (dir, store, engine)
    }

    fn doc(record_id: i64, owner_id: i64, name: &str) -> SearchableDocument {
        SearchableDocument {
            record_id,
            owner_id,
            workspace_id: None,
            name: name.to_string(),
            path: format!("/files/{name}"),
            description: None,
            tags: vec![],
            is_favorite: false,
            is_archived: false,
            importance_score: 0.0,
            updated_at: 1,
        }
    }

    #[test]
    fn limit_and_offset_are_validated_before_lookup() {
        let (_dir, _store, engine) = engine_with_index();
        let mut req = SearchRequest::new("invoice", 1);
        req.limit = 0;
        assert!(matches!(
            engine.search(&req),
            Err(SearchError::InvalidLimit { .. })
        ));
        req.limit = 500;
        assert!(matches!(
            engine.search(&req),
            Err(SearchError::InvalidLimit { .. })
        ));
        req.limit = 10;
        req.offset = 100_000;
        assert!(matches!(
            engine.search(&req),
            Err(SearchError::InvalidOffset { .. })
        ));
    }

    #[test]
    fn empty_query_is_a_validation_error() {
        let (_dir, _store, engine) = engine_with_index();
        let req = SearchRequest::new("   ", 1);
        assert!(matches!(engine.search(&req), Err(SearchError::EmptyQuery)));
    }

    #[test]
    fn fuzzy_search_finds_prefix_matches() {
        let (_dir, _store, engine) = engine_with_index();
        engine.upsert_document(&doc(1, 1, "invoice_march.pdf")).unwrap();
        engine.upsert_document(&doc(2, 1, "notes.txt")).unwrap();
        let resp = engine.search(&SearchRequest::new("inv", 1)).unwrap();
        assert_eq!(resp.engine_used, EngineUsed::Index);
        assert_eq!(resp.total_matches, 1);
        assert_eq!(resp.results[0].record_id, 1);
    }

    #[test]
    fn favorite_beats_importance_in_the_invoice_scenario() {
        let (_dir, _store, engine) = engine_with_index();
        let mut seven = doc(7, 1, "Invoice March");
        seven.tags = vec!["finance".into(), "invoice".into()];
        seven.importance_score = 80.0;
        let mut eight = doc(8, 1, "invoice_draft");
        eight.importance_score = 10.0;
        eight.is_favorite = true;
        engine.upsert_document(&seven).unwrap();
        engine.upsert_document(&eight).unwrap();

        let resp = engine.search(&SearchRequest::new("invoice", 1)).unwrap();
        assert_eq!(resp.total_matches, 2);
        let ids: Vec<i64> = resp.results.iter().map(|h| h.record_id).collect();
        assert!(ids.contains(&7) && ids.contains(&8));
        let pos8 = ids.iter().position(|&id| id == 8).unwrap();
        let pos7 = ids.iter().position(|&id| id == 7).unwrap();
        assert!(pos8 <= pos7, "favorite must rank at least as high: {ids:?}");
    }

    #[test]
    fn owner_scope_is_isolated() {
        let (_dir, _store, engine) = engine_with_index();
        engine.upsert_document(&doc(1, 1, "invoice-a.pdf")).unwrap();
        engine.upsert_document(&doc(2, 2, "invoice-b.pdf")).unwrap();
        let resp = engine.search(&SearchRequest::new("invoice", 2)).unwrap();
        assert_eq!(resp.total_matches, 1);
        assert_eq!(resp.results[0].record_id, 2);
    }

    #[test]
    fn archived_documents_are_hidden_by_default() {
        let (_dir, _store, engine) = engine_with_index();
        let mut archived = doc(1, 1, "invoice-old.pdf");
        archived.is_archived = true;
        engine.upsert_document(&archived).unwrap();
        engine.upsert_document(&doc(2, 1, "invoice-new.pdf")).unwrap();

        let resp = engine.search(&SearchRequest::new("invoice", 1)).unwrap();
        assert_eq!(resp.total_matches, 1);
        assert_eq!(resp.results[0].record_id, 2);

        let mut req = SearchRequest::new("invoice", 1);
        req.include_archived = true;
        let resp = engine.search(&req).unwrap();
        assert_eq!(resp.total_matches, 2);
    }

    #[test]
    fn workspace_filter_restricts_results() {
        let (_dir, _store, engine) = engine_with_index();
        let mut ws4 = doc(1, 1, "plan.txt");
        ws4.workspace_id = Some(4);
        let mut ws5 = doc(2, 1, "plan.txt");
        ws5.workspace_id = Some(5);
        engine.upsert_document(&ws4).unwrap();
        engine.upsert_document(&ws5).unwrap();

        let mut req = SearchRequest::new("plan", 1);
        req.workspace_id = Some(5);
        let resp = engine.search(&req).unwrap();
        assert_eq!(resp.total_matches, 1);
        assert_eq!(resp.results[0].record_id, 2);
    }

    #[test]
    fn tombstone_holds_for_any_query() {
        let (_dir, _store, engine) = engine_with_index();
        engine.upsert_document(&doc(1, 1, "ephemeral-invoice.pdf")).unwrap();
        engine.remove_document(1).unwrap();
        for q in ["ephemeral", "invoice", "pdf"] {
            let resp = engine.search(&SearchRequest::new(q, 1)).unwrap();
            assert_eq!(resp.total_matches, 0, "query {q:?} resurrected a tombstone");
        }
    }

    #[test]
    fn pagination_applies_after_full_sort() {
        let (_dir, _store, engine) = engine_with_index();
        for i in 0..7 {
            let mut d = doc(i, 1, &format!("report-{i}.txt"));
            d.importance_score = i as f64 * 10.0;
            engine.upsert_document(&d).unwrap();
        }
        let mut req = SearchRequest::new("report", 1);
        req.limit = 3;
        let first = engine.search(&req).unwrap();
        req.offset = 3;
        let second = engine.search(&req).unwrap();
        assert_eq!(first.total_matches, 7);
        assert_eq!(second.total_matches, 7);
        let first_ids: Vec<i64> = first.results.iter().map(|h| h.record_id).collect();
        let second_ids: Vec<i64> = second.results.iter().map(|h| h.record_id).collect();
        assert_eq!(first_ids.len(), 3);
        assert_eq!(second_ids.len(), 3);
        assert!(first_ids.iter().all(|id| !second_ids.contains(id)));
        // Importance is the only signal here, so the pages descend by it.
        assert_eq!(first_ids, vec![6, 5, 4]);
        assert_eq!(second_ids, vec![3, 2, 1]);
    }

    #[test]
    fn snippets_and_spans_come_back_with_hits() {
        let (_dir, _store, engine) = engine_with_index();
        let mut d = doc(1, 1, "minutes.txt");
        d.description = Some("Meeting minutes covering the invoice backlog review".into());
        engine.upsert_document(&d).unwrap();
        let resp = engine.search(&SearchRequest::new("invoice", 1)).unwrap();
        let hit = &resp.results[0];
        assert!(hit.snippet.contains("invoice"));
        assert!(!hit.highlight_spans.is_empty());
        let chars: Vec<char> = hit.snippet.chars().collect();
        for &(start, end) in &hit.highlight_spans {
            let s: String = chars[start..end].iter().collect();
            assert_eq!(s.to_lowercase(), "invoice");
        }
    }

    #[test]
    fn degraded_engine_serves_fallback_results() {
        let (_dir, store, engine) = degraded_engine();
        store
            .insert(NewFileRecord {
                owner_id: 1,
                name: "invoice_march.pdf".into(),
                path: "/files/invoice_march.pdf".into(),
                ..NewFileRecord::default()
            })
            .unwrap();
        store
            .insert(NewFileRecord {
                owner_id: 2,
                name: "invoice_other.pdf".into(),
                path: "/files/invoice_other.pdf".into(),
                ..NewFileRecord::default()
            })
            .unwrap();

        let resp = engine.search(&SearchRequest::new("invoice", 1)).unwrap();
        assert_eq!(resp.engine_used, EngineUsed::Fallback);
        assert_eq!(resp.total_matches, 1);
        assert_eq!(resp.results[0].rank, 0.0);
        assert!(!resp.results[0].snippet.is_empty());
    }

    #[test]
    fn degraded_engine_maintenance_reports_failure() {
        let (_dir, _store, engine) = degraded_engine();
        assert!(!engine.optimize());
        assert!(!engine.rebuild());
    }

    #[test]
    fn suggest_clamps_limits_and_scopes_by_owner() {
        let (_dir, _store, engine) = engine_with_index();
        engine.upsert_document(&doc(1, 1, "invoice one")).unwrap();
        engine.upsert_document(&doc(2, 1, "invoice two")).unwrap();
        engine.upsert_document(&doc(3, 2, "invoice foreign")).unwrap();
        let got = engine.suggest("inv", 1, None);
        assert_eq!(got, vec!["invoice"]);
        assert!(engine.suggest("foreign", 1, Some(5)).is_empty());
        assert!(engine.suggest("", 1, None).is_empty());
    }

    #[test]
    fn rebuild_round_trips_the_candidate_set() {
        let (_dir, store, engine) = engine_with_index();
        for i in 0..4 {
            store
                .insert(NewFileRecord {
                    owner_id: 1,
                    name: format!("budget-{i}.xlsx"),
                    path: format!("/files/budget-{i}.xlsx"),
                    ..NewFileRecord::default()
                })
                .unwrap();
        }
        // Index via individual upserts first.
        for record in store.list_records(1).unwrap() {
            engine
                .upsert_document(&SearchableDocument::from_record(&record))
                .unwrap();
        }
        let mut via_events: Vec<i64> = engine
            .search(&SearchRequest::new("budget", 1))
            .unwrap()
            .results
            .iter()
            .map(|h| h.record_id)
            .collect();

        assert!(engine.rebuild());
        let mut via_rebuild: Vec<i64> = engine
            .search(&SearchRequest::new("budget", 1))
            .unwrap()
            .results
            .iter()
            .map(|h| h.record_id)
            .collect();

        via_events.sort_unstable();
        via_rebuild.sort_unstable();
        assert_eq!(via_events, via_rebuild);
    }

    #[test]
    fn optimize_keeps_results_stable() {
        let (_dir, _store, engine) = engine_with_index();
        for i in 0..6 {
            engine.upsert_document(&doc(i, 1, &format!("log-{i}.txt"))).unwrap();
        }
        let before = engine.search(&SearchRequest::new("log", 1)).unwrap();
        assert!(engine.optimize());
        let after = engine.search(&SearchRequest::new("log", 1)).unwrap();
        let ids = |r: &SearchResponse| r.results.iter().map(|h| h.record_id).collect::<Vec<_>>();
        assert_eq!(ids(&before), ids(&after));
    }
}
