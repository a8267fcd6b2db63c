//! `SQLite` source-of-truth store for file records: schema, pragmas, CRUD,
//! and the substring scan backing the degraded search path.

use crate::model::types::FileRecord;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use tracing::info;

/// Fields accepted when creating a record; id and timestamps are assigned by
/// the store.
#[derive(Debug, Clone, Default)]
pub struct NewFileRecord {
    pub owner_id: i64,
    pub workspace_id: Option<i64>,
    pub name: String,
    pub path: String,
    pub description: Option<String>,
    pub ai_description: Option<String>,
    pub tags: Option<String>,
    pub ai_tags: Option<String>,
    pub is_favorite: bool,
    pub is_archived: bool,
    pub importance_score: f64,
}

/// Thread-safe handle to the records database.
///
/// The search core only reads through this handle; writes come from the CLI
/// and tests standing in for the out-of-scope CRUD layer.
pub struct RecordStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

const RECORD_COLUMNS: &str = "id, owner_id, workspace_id, name, path, description, ai_description, \
     tags, ai_tags, is_favorite, is_archived, importance_score, updated_at, created_at";

impl RecordStore {
    /// Open (creating if needed) the records database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create data dir {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open records database {}", path.display()))?;
        let store = RecordStore {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        store.init()?;
        info!(path = %path.display(), "opened records database");
        Ok(store)
    }

    /// In-memory store for tests and benches.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory records database")?;
        let store = RecordStore {
            conn: Mutex::new(conn),
            path: None,
        };
        store.init()?;
        Ok(store)
    }

    /// Path to the database file, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .context("set sqlite busy timeout")?;
        conn.execute_batch(
            r"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )
        .context("apply sqlite pragmas")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                workspace_id INTEGER,
                name TEXT NOT NULL,
                path TEXT NOT NULL,
                description TEXT,
                ai_description TEXT,
                tags TEXT,
                ai_tags TEXT,
                is_favorite INTEGER NOT NULL DEFAULT 0,
                is_archived INTEGER NOT NULL DEFAULT 0,
                importance_score REAL NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_files_owner ON files(owner_id);
            CREATE INDEX IF NOT EXISTS idx_files_owner_ws ON files(owner_id, workspace_id);",
        )
        .context("create files schema")?;
        Ok(())
    }

    /// Insert a new record; returns it with the assigned id and timestamps.
    pub fn insert(&self, new: NewFileRecord) -> Result<FileRecord> {
        let now = now_millis();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO files (owner_id, workspace_id, name, path, description, ai_description,
                                tags, ai_tags, is_favorite, is_archived, importance_score,
                                updated_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                new.owner_id,
                new.workspace_id,
                new.name,
                new.path,
                new.description,
                new.ai_description,
                new.tags,
                new.ai_tags,
                new.is_favorite as i64,
                new.is_archived as i64,
                new.importance_score,
                now,
            ],
        )
        .context("insert file record")?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.get(id)?
            .ok_or_else(|| anyhow::anyhow!("record {id} vanished after insert"))
    }

    /// Full-field replace. Bumps `updated_at` so the synchronizer's version
    /// guard sees a newer version; returns the stored row.
    pub fn update(&self, record: &FileRecord) -> Result<FileRecord> {
        let now = now_millis().max(record.updated_at + 1);
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE files SET owner_id = ?2, workspace_id = ?3, name = ?4, path = ?5,
                        description = ?6, ai_description = ?7, tags = ?8, ai_tags = ?9,
                        is_favorite = ?10, is_archived = ?11, importance_score = ?12,
                        updated_at = ?13
                 WHERE id = ?1",
                params![
                    record.id,
                    record.owner_id,
                    record.workspace_id,
                    record.name,
                    record.path,
                    record.description,
                    record.ai_description,
                    record.tags,
                    record.ai_tags,
                    record.is_favorite as i64,
                    record.is_archived as i64,
                    record.importance_score,
                    now,
                ],
            )
            .context("update file record")?;
        if changed == 0 {
            anyhow::bail!("record {} not found", record.id);
        }
        drop(conn);
        self.get(record.id)?
            .ok_or_else(|| anyhow::anyhow!("record {} vanished after update", record.id))
    }

    /// Delete a record. Returns whether a row was removed.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn
            .execute("DELETE FROM files WHERE id = ?1", params![id])
            .context("delete file record")?;
        Ok(changed > 0)
    }

    pub fn get(&self, id: i64) -> Result<Option<FileRecord>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {RECORD_COLUMNS} FROM files WHERE id = ?1");
        let rec = conn
            .query_row(&sql, params![id], row_to_record)
            .optional()
            .context("fetch file record")?;
        Ok(rec)
    }

    /// Every record belonging to `owner_id`, archived included, in source
    /// order (ascending id).
    pub fn list_records(&self, owner_id: i64) -> Result<Vec<FileRecord>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {RECORD_COLUMNS} FROM files WHERE owner_id = ?1 ORDER BY id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![owner_id], row_to_record)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .context("list owner records")
    }

    /// The full non-archived record set across owners, for index population.
    pub fn list_active_records(&self) -> Result<Vec<FileRecord>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {RECORD_COLUMNS} FROM files WHERE is_archived = 0 ORDER BY id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_record)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .context("list active records")
    }

    /// Unranked case-insensitive substring scan over the text fields, in
    /// source order. This is the degraded search path; it deliberately reads
    /// the source of truth rather than any index structure.
    pub fn substring_scan(
        &self,
        owner_id: i64,
        needle: &str,
        workspace_id: Option<i64>,
        include_archived: bool,
    ) -> Result<Vec<FileRecord>> {
        let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
        let mut sql = format!(
            "SELECT {RECORD_COLUMNS} FROM files
             WHERE owner_id = ?1
               AND (lower(name) LIKE ?2 ESCAPE '\\'
                 OR lower(coalesce(description, '')) LIKE ?2 ESCAPE '\\'
                 OR lower(coalesce(ai_description, '')) LIKE ?2 ESCAPE '\\'
                 OR lower(coalesce(tags, '')) LIKE ?2 ESCAPE '\\'
                 OR lower(coalesce(ai_tags, '')) LIKE ?2 ESCAPE '\\')"
        );
        if !include_archived {
            sql.push_str(" AND is_archived = 0");
        }
        if workspace_id.is_some() {
            sql.push_str(" AND workspace_id = ?3");
        }
        sql.push_str(" ORDER BY id");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = match workspace_id {
            Some(ws) => stmt.query_map(params![owner_id, pattern, ws], row_to_record)?,
            None => stmt.query_map(params![owner_id, pattern], row_to_record)?,
        };
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .context("substring scan")
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        workspace_id: row.get(2)?,
        name: row.get(3)?,
        path: row.get(4)?,
        description: row.get(5)?,
        ai_description: row.get(6)?,
        tags: row.get(7)?,
        ai_tags: row.get(8)?,
        is_favorite: row.get::<_, i64>(9)? != 0,
        is_archived: row.get::<_, i64>(10)? != 0,
        importance_score: row.get(11)?,
        updated_at: row.get(12)?,
        created_at: row.get(13)?,
    })
}

/// Escape LIKE metacharacters so user input matches literally.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Current wall-clock time in unix millis.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
