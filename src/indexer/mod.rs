//! Synchronizer: maps source-record lifecycle events onto index operations.
//!
//! The source store fires `on_created`/`on_updated`/`on_deleted`; this module
//! guards against out-of-order delivery with a per-record version compare
//! (the record's `updated_at`) and keeps a tombstone floor after deletes so a
//! stale pre-delete update replayed later is discarded instead of
//! resurrecting the document. `populate_all` is the reconciliation path: it
//! streams the full non-archived record set through upsert, skipping nothing
//! but the records that individually fail.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::model::types::{FileRecord, SearchableDocument};
use crate::search::SearchEngine;
use crate::storage::sqlite::now_millis;

/// Outcome of a populate pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateSummary {
    /// Records upserted (or already current) this pass.
    pub indexed: usize,
    /// Records that failed and are left for the next rebuild.
    pub failed: usize,
}

pub struct Synchronizer {
    engine: Arc<SearchEngine>,
    /// record id -> last applied version (`updated_at`). After a delete the
    /// entry stays behind as the tombstone floor.
    versions: Mutex<HashMap<i64, i64>>,
}

impl Synchronizer {
    pub fn new(engine: Arc<SearchEngine>) -> Self {
        Synchronizer {
            engine,
            versions: Mutex::new(HashMap::new()),
        }
    }

    /// A record was created. Returns whether the event was applied.
    pub fn on_created(&self, record: &FileRecord) -> Result<bool> {
        self.apply(record)
    }

    /// A record changed (full field replace, archive flips included).
    pub fn on_updated(&self, record: &FileRecord) -> Result<bool> {
        self.apply(record)
    }

    /// A record was deleted. Idempotent; leaves a tombstone floor so stale
    /// updates cannot resurrect the document. Record ids are never reused,
    /// so the floor can only ever block genuinely stale events.
    pub fn on_deleted(&self, record_id: i64) -> Result<()> {
        {
            let mut versions = self.versions.lock();
            let floor = versions.get(&record_id).copied().unwrap_or(0);
            versions.insert(record_id, floor.max(now_millis()));
        }
        self.engine.remove_document(record_id)?;
        debug!(record_id, "record removed from index");
        Ok(())
    }

    /// Stream the full non-archived record set through upsert. Single-record
    /// failures are logged and counted, never fatal; the next `rebuild`
    /// reconciles them.
    pub fn populate_all(&self) -> Result<PopulateSummary> {
        let records = self.engine_store_records()?;
        let mut summary = PopulateSummary::default();
        for record in &records {
            match self.apply(record) {
                Ok(_) => summary.indexed += 1,
                Err(e) => {
                    warn!(record_id = record.id, error = %e, "record failed to index");
                    summary.failed += 1;
                }
            }
        }
        info!(
            indexed = summary.indexed,
            failed = summary.failed,
            "populate complete"
        );
        Ok(summary)
    }

    fn engine_store_records(&self) -> Result<Vec<FileRecord>> {
        self.engine.list_active_source_records()
    }

    fn apply(&self, record: &FileRecord) -> Result<bool> {
        {
            let mut versions = self.versions.lock();
            if let Some(&seen) = versions.get(&record.id) {
                if record.updated_at <= seen {
                    debug!(
                        record_id = record.id,
                        event_version = record.updated_at,
                        applied_version = seen,
                        "stale event discarded"
                    );
                    return Ok(false);
                }
            }
            versions.insert(record.id, record.updated_at);
        }

        let document = SearchableDocument::from_record(record);
        if let Err(e) = self.engine.upsert_document(&document) {
            // Roll the guard back so a replay of this event can retry.
            let mut versions = self.versions.lock();
            if versions.get(&record.id) == Some(&record.updated_at) {
                versions.remove(&record.id);
            }
            return Err(e);
        }
        Ok(true)
    }
}
