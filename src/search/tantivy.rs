use std::path::Path;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::Query;
use tantivy::schema::*;
use tantivy::{Index, IndexReader, IndexWriter, TantivyDocument, doc};

use crate::model::types::SearchableDocument;

const SCHEMA_VERSION: &str = "v1";

/// Writer heap budget, sized for small/medium corpora.
const WRITER_BUDGET_BYTES: usize = 50_000_000;

#[derive(Clone, Copy)]
pub struct Fields {
    pub record_id: Field,
    pub owner_id: Field,
    pub workspace_id: Field,
    pub archived: Field,
    pub name: Field,
    pub description: Field,
    pub tags: Field,
    pub path: Field,
    pub favorite: Field,
    pub importance: Field,
    pub updated_at: Field,
}

/// A raw index match before ranking: the stored document fields plus the
/// lexical (BM25) score tantivy assigned under the query-time field boosts.
#[derive(Debug, Clone)]
pub struct IndexCandidate {
    pub record_id: i64,
    pub lexical_score: f32,
    pub name: String,
    pub path: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub workspace_id: Option<i64>,
    pub is_favorite: bool,
    pub is_archived: bool,
    pub importance_score: f64,
}

/// Durable inverted index over searchable documents.
///
/// One long-lived instance per process; all writes serialize through the
/// internal writer lock, reads go through a shared reader that is reloaded
/// after every commit. A rebuild is a delete-all plus re-add inside a single
/// commit, so readers atomically flip from the old segment set to the new
/// one and a failed rebuild leaves the previous index intact.
pub struct FileIndex {
    pub index: Index,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    pub fields: Fields,
}

impl FileIndex {
    pub fn open_or_create(path: &Path) -> Result<Self> {
        let schema = build_schema();
        std::fs::create_dir_all(path)
            .with_context(|| format!("create index dir {}", path.display()))?;
        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(path)?
        } else {
            Index::create_in_dir(path, schema.clone())?
        };
        let writer = index
            .writer(WRITER_BUDGET_BYTES)
            .with_context(|| "create index writer")?;
        let reader = index.reader().with_context(|| "create index reader")?;
        let fields = fields_from_schema(&schema)?;

        Ok(Self {
            index,
            writer: Mutex::new(writer),
            reader,
            fields,
        })
    }

    /// Idempotent insert-or-replace keyed by record id.
    pub fn upsert(&self, document: &SearchableDocument) -> Result<()> {
        let writer = self.writer.lock();
        writer.delete_term(Term::from_field_i64(self.fields.record_id, document.record_id));
        writer.add_document(self.make_doc(document))?;
        self.commit_locked(writer)
    }

    /// Idempotent removal; a no-op when the record was never indexed.
    pub fn remove(&self, record_id: i64) -> Result<()> {
        let writer = self.writer.lock();
        writer.delete_term(Term::from_field_i64(self.fields.record_id, record_id));
        self.commit_locked(writer)
    }

    /// Clear and repopulate in one commit. Readers keep serving the previous
    /// segment set until the commit lands.
    pub fn rebuild_from(&self, documents: &[SearchableDocument]) -> Result<()> {
        let mut writer = self.writer.lock();
        let staged: Result<()> = (|| {
            writer.delete_all_documents()?;
            for document in documents {
                writer.add_document(self.make_doc(document))?;
            }
            writer.commit()?;
            Ok(())
        })();
        if staged.is_err() {
            let _ = writer.rollback();
        }
        drop(writer);
        self.reader.reload().context("reload index reader")?;
        staged
    }

    /// Execute a compiled query, returning up to `candidate_pool` raw
    /// candidates with their stored fields.
    pub fn lookup(&self, query: &dyn Query, candidate_pool: usize) -> Result<Vec<IndexCandidate>> {
        let searcher = self.reader.searcher();
        let top_docs = searcher
            .search(query, &TopDocs::with_limit(candidate_pool.max(1)).order_by_score())
            .context("execute index query")?;
        let mut candidates = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr).context("fetch stored document")?;
            candidates.push(self.extract_candidate(&doc, score)?);
        }
        Ok(candidates)
    }

    /// Merge all searchable segments into one. Query semantics are
    /// unchanged; readers keep serving throughout.
    pub fn optimize(&self) -> Result<()> {
        let segment_ids = self
            .index
            .searchable_segment_ids()
            .context("list searchable segments")?;
        if segment_ids.len() > 1 {
            let mut writer = self.writer.lock();
            writer
                .merge(&segment_ids)
                .wait()
                .context("merge index segments")?;
        }
        self.reader.reload().context("reload index reader")?;
        Ok(())
    }

    /// Number of live documents visible to readers.
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    fn commit_locked(&self, mut writer: parking_lot::MutexGuard<'_, IndexWriter>) -> Result<()> {
        writer.commit().context("commit index writer")?;
        drop(writer);
        self.reader.reload().context("reload index reader")?;
        Ok(())
    }

    fn make_doc(&self, document: &SearchableDocument) -> TantivyDocument {
        let f = &self.fields;
        let mut d = doc! {
            f.record_id => document.record_id,
            f.owner_id => document.owner_id,
            f.archived => document.is_archived as i64,
            f.name => document.name.clone(),
            f.path => document.path.clone(),
            f.favorite => document.is_favorite as i64,
            f.importance => document.importance_score,
            f.updated_at => document.updated_at,
        };
        if let Some(ws) = document.workspace_id {
            d.add_i64(f.workspace_id, ws);
        }
        if let Some(desc) = &document.description {
            d.add_text(f.description, desc);
        }
        for tag in &document.tags {
            d.add_text(f.tags, tag);
        }
        d
    }

    fn extract_candidate(&self, doc: &TantivyDocument, score: f32) -> Result<IndexCandidate> {
        let f = &self.fields;
        let record_id = doc
            .get_first(f.record_id)
            .and_then(|v| v.as_i64())
            .context("document missing record_id")?;
        let tags = doc
            .get_all(f.tags)
            .filter_map(|v| v.as_str())
            .map(|s| s.to_string())
            .collect();
        Ok(IndexCandidate {
            record_id,
            lexical_score: score,
            name: doc
                .get_first(f.name)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            path: doc
                .get_first(f.path)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            description: doc
                .get_first(f.description)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            tags,
            workspace_id: doc.get_first(f.workspace_id).and_then(|v| v.as_i64()),
            is_favorite: doc
                .get_first(f.favorite)
                .and_then(|v| v.as_i64())
                .unwrap_or(0)
                != 0,
            is_archived: doc
                .get_first(f.archived)
                .and_then(|v| v.as_i64())
                .unwrap_or(0)
                != 0,
            importance_score: doc
                .get_first(f.importance)
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0),
        })
    }
}

pub fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    schema_builder.add_i64_field("record_id", INDEXED | STORED);
    schema_builder.add_i64_field("owner_id", INDEXED | STORED);
    schema_builder.add_i64_field("workspace_id", INDEXED | STORED);
    schema_builder.add_i64_field("archived", INDEXED | STORED);
    schema_builder.add_text_field("name", TEXT | STORED);
    schema_builder.add_text_field("description", TEXT | STORED);
    schema_builder.add_text_field("tags", TEXT | STORED);
    schema_builder.add_text_field("path", TEXT | STORED);
    schema_builder.add_i64_field("favorite", STORED);
    schema_builder.add_f64_field("importance", STORED);
    schema_builder.add_i64_field("updated_at", STORED);
    schema_builder.build()
}

pub fn fields_from_schema(schema: &Schema) -> Result<Fields> {
    let get = |name: &str| {
        schema
            .get_field(name)
            .map_err(|_| anyhow::anyhow!("schema missing {name}"))
    };
    Ok(Fields {
        record_id: get("record_id")?,
        owner_id: get("owner_id")?,
        workspace_id: get("workspace_id")?,
        archived: get("archived")?,
        name: get("name")?,
        description: get("description")?,
        tags: get("tags")?,
        path: get("path")?,
        favorite: get("favorite")?,
        importance: get("importance")?,
        updated_at: get("updated_at")?,
    })
}

pub fn index_dir(base: &Path) -> Result<std::path::PathBuf> {
    let dir = base.join("index").join(SCHEMA_VERSION);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::SearchableDocument;
    use tantivy::query::TermQuery;
    use tempfile::TempDir;

    fn test_doc(record_id: i64, owner_id: i64, name: &str) -> SearchableDocument {
        SearchableDocument {
            record_id,
            owner_id,
            workspace_id: None,
            name: name.to_string(),
            path: format!("/files/{name}"),
            description: None,
            tags: vec!["demo".into()],
            is_favorite: false,
            is_archived: false,
            importance_score: 10.0,
            updated_at: 1,
        }
    }

    fn owner_query(index: &FileIndex, owner_id: i64) -> TermQuery {
        TermQuery::new(
            Term::from_field_i64(index.fields.owner_id, owner_id),
            IndexRecordOption::Basic,
        )
    }

    #[test]
    fn upsert_is_idempotent() -> Result<()> {
        let dir = TempDir::new()?;
        let index = FileIndex::open_or_create(dir.path())?;
        let doc = test_doc(1, 7, "alpha.txt");
        index.upsert(&doc)?;
        index.upsert(&doc)?;
        assert_eq!(index.num_docs(), 1);
        let hits = index.lookup(&owner_query(&index, 7), 10)?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record_id, 1);
        Ok(())
    }

    #[test]
    fn upsert_replaces_previous_version() -> Result<()> {
        let dir = TempDir::new()?;
        let index = FileIndex::open_or_create(dir.path())?;
        index.upsert(&test_doc(1, 7, "alpha.txt"))?;
        let mut renamed = test_doc(1, 7, "beta.txt");
        renamed.updated_at = 2;
        index.upsert(&renamed)?;
        let hits = index.lookup(&owner_query(&index, 7), 10)?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "beta.txt");
        Ok(())
    }

    #[test]
    fn remove_is_idempotent() -> Result<()> {
        let dir = TempDir::new()?;
        let index = FileIndex::open_or_create(dir.path())?;
        index.upsert(&test_doc(1, 7, "alpha.txt"))?;
        index.remove(1)?;
        index.remove(1)?;
        assert_eq!(index.num_docs(), 0);
        Ok(())
    }

    #[test]
    fn rebuild_replaces_whole_index() -> Result<()> {
        let dir = TempDir::new()?;
        let index = FileIndex::open_or_create(dir.path())?;
        index.upsert(&test_doc(1, 7, "old.txt"))?;
        let fresh = vec![test_doc(2, 7, "new-a.txt"), test_doc(3, 7, "new-b.txt")];
        index.rebuild_from(&fresh)?;
        let mut ids: Vec<i64> = index
            .lookup(&owner_query(&index, 7), 10)?
            .into_iter()
            .map(|c| c.record_id)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![2, 3]);
        Ok(())
    }

    #[test]
    fn stored_fields_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let index = FileIndex::open_or_create(dir.path())?;
        let mut doc = test_doc(5, 9, "report.pdf");
        doc.workspace_id = Some(4);
        doc.description = Some("quarterly numbers".into());
        doc.tags = vec!["Finance".into(), "q3".into()];
        doc.is_favorite = true;
        doc.importance_score = 80.0;
        index.upsert(&doc)?;

        let hits = index.lookup(&owner_query(&index, 9), 10)?;
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.workspace_id, Some(4));
        assert_eq!(hit.description.as_deref(), Some("quarterly numbers"));
        assert_eq!(hit.tags, vec!["Finance", "q3"]);
        assert!(hit.is_favorite);
        assert_eq!(hit.importance_score, 80.0);
        Ok(())
    }

    #[test]
    fn optimize_preserves_documents() -> Result<()> {
        let dir = TempDir::new()?;
        let index = FileIndex::open_or_create(dir.path())?;
        for i in 0..5 {
            index.upsert(&test_doc(i, 7, &format!("file-{i}.txt")))?;
        }
        index.optimize()?;
        assert_eq!(index.num_docs(), 5);
        Ok(())
    }
}
