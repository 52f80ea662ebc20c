//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::extract::StructuredRecord;
use crate::state::RunPhase;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    AuditOutcome, CrawlAuditRecord, RunCounts, RunRecord, StoredItem, TargetKind,
};
use crate::CrawlError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, status, processed, failed, \
                           skipped, total_fetches";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(CrawlError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, CrawlError> {
        let conn = Connection::open(path).map_err(StorageError::from)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )
        .map_err(StorageError::from)?;

        initialize_schema(&conn).map_err(StorageError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, CrawlError> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(StorageError::from)?;
        initialize_schema(&conn).map_err(StorageError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunPhase::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunPhase::Failed),
        counts: RunCounts {
            processed: row.get(5)?,
            failed: row.get(6)?,
            skipped: row.get(7)?,
            total_fetches: row.get(8)?,
        },
    })
}

fn insert_audit(conn: &Connection, record: &CrawlAuditRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO crawl_audit (run_id, url, kind, outcome, http_status, error_message,
         items_extracted, duration_ms, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.run_id,
            record.url,
            record.kind.to_db_string(),
            record.outcome.to_db_string(),
            record.http_status,
            record.error_message,
            record.items_extracted,
            record.duration_ms,
            record.timestamp.to_rfc3339(),
        ],
    )?;
    Ok(())
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&self, config_hash: &str) -> StorageResult<i64> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunPhase::Idle.to_db_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update_run_phase(&self, run_id: i64, phase: RunPhase) -> StorageResult<()> {
        let updated = self.conn()?.execute(
            "UPDATE runs SET status = ?1 WHERE id = ?2",
            params![phase.to_db_string(), run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn finish_run(&self, run_id: i64, phase: RunPhase, counts: &RunCounts) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn()?.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, processed = ?3, failed = ?4,
             skipped = ?5, total_fetches = ?6 WHERE id = ?7",
            params![
                phase.to_db_string(),
                now,
                counts.processed,
                counts.failed,
                counts.skipped,
                counts.total_fetches,
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
            params![run_id],
            run_from_row,
        )
        .optional()?
        .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let conn = self.conn()?;
        let run = conn
            .query_row(
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    // ===== Items =====

    fn exists(&self, canonical_id: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT 1 FROM items WHERE canonical_id = ?1",
                params![canonical_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn save(&self, record: &StructuredRecord, run_id: i64) -> StorageResult<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO items (canonical_id, url, title, strategy, run_id, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(canonical_id) DO UPDATE SET
                url = excluded.url,
                title = excluded.title,
                strategy = excluded.strategy,
                run_id = excluded.run_id,
                updated_at = excluded.updated_at",
            params![
                record.canonical_id,
                record.url,
                record.title,
                record.strategy,
                run_id,
                now
            ],
        )?;

        let item_id: i64 = tx.query_row(
            "SELECT id FROM items WHERE canonical_id = ?1",
            params![record.canonical_id],
            |row| row.get(0),
        )?;

        tx.execute("DELETE FROM item_fields WHERE item_id = ?1", params![item_id])?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO item_fields (item_id, name, value) VALUES (?1, ?2, ?3)")?;
            for (name, value) in &record.fields {
                stmt.execute(params![item_id, name, value])?;
            }
        }

        tx.commit()?;
        Ok(item_id)
    }

    fn get_item(&self, canonical_id: &str) -> StorageResult<Option<StoredItem>> {
        let conn = self.conn()?;
        let item = conn
            .query_row(
                "SELECT id, canonical_id, url, title, strategy, run_id, updated_at
                 FROM items WHERE canonical_id = ?1",
                params![canonical_id],
                |row| {
                    Ok(StoredItem {
                        id: row.get(0)?,
                        canonical_id: row.get(1)?,
                        url: row.get(2)?,
                        title: row.get(3)?,
                        strategy: row.get(4)?,
                        run_id: row.get(5)?,
                        updated_at: row.get(6)?,
                        fields: BTreeMap::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut item) = item else {
            return Ok(None);
        };

        let mut stmt =
            conn.prepare("SELECT name, value FROM item_fields WHERE item_id = ?1 ORDER BY name")?;
        let fields = stmt
            .query_map(params![item.id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        item.fields = fields;

        Ok(Some(item))
    }

    // ===== Audit Log =====

    fn append_audit(&self, record: &CrawlAuditRecord) -> StorageResult<()> {
        let conn = self.conn()?;
        insert_audit(&conn, record)?;
        Ok(())
    }

    fn append_audit_batch(&self, records: &[CrawlAuditRecord]) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for record in records {
            insert_audit(&tx, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get_audit_records(&self, run_id: i64) -> StorageResult<Vec<CrawlAuditRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, url, kind, outcome, http_status, error_message, items_extracted,
             duration_ms, timestamp FROM crawl_audit WHERE run_id = ?1 ORDER BY id",
        )?;

        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<u16>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, u32>(6)?,
                    row.get::<_, u64>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (run_id, url, kind, outcome, http_status, error_message, items, duration, ts) in rows {
            records.push(CrawlAuditRecord {
                run_id,
                url,
                kind: TargetKind::from_db_string(&kind).ok_or_else(|| {
                    StorageError::Serialization(format!("unknown target kind '{}'", kind))
                })?,
                outcome: AuditOutcome::from_db_string(&outcome).ok_or_else(|| {
                    StorageError::Serialization(format!("unknown outcome '{}'", outcome))
                })?,
                http_status,
                error_message,
                items_extracted: items,
                duration_ms: duration,
                timestamp: DateTime::parse_from_rfc3339(&ts)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?
                    .with_timezone(&Utc),
            });
        }
        Ok(records)
    }

    // ===== Statistics =====

    fn count_items(&self) -> StorageResult<u64> {
        let count = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count)
    }

    fn count_audit_by_outcome(&self, outcome: AuditOutcome) -> StorageResult<u64> {
        let count = self.conn()?.query_row(
            "SELECT COUNT(*) FROM crawl_audit WHERE outcome = ?1",
            params![outcome.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count_runs(&self) -> StorageResult<u64> {
        let count = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(canonical_id: &str, title: &str, fields: &[(&str, &str)]) -> StructuredRecord {
        StructuredRecord {
            canonical_id: canonical_id.to_string(),
            url: format!("https://{}", canonical_id),
            title: title.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            strategy: "catalog-v2".to_string(),
        }
    }

    fn audit(run_id: i64, url: &str, outcome: AuditOutcome) -> CrawlAuditRecord {
        CrawlAuditRecord {
            run_id,
            url: url.to_string(),
            kind: TargetKind::Detail,
            outcome,
            http_status: Some(200),
            error_message: None,
            items_extracted: 1,
            duration_ms: 12,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_create_run() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("test_hash").unwrap();
        assert!(run_id > 0);

        let run = storage.get_run(run_id).unwrap();
        assert_eq!(run.config_hash, "test_hash");
        assert_eq!(run.status, RunPhase::Idle);
        assert!(run.finished_at.is_none());
    }

    #[test]
    fn test_run_lifecycle() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("hash").unwrap();

        storage
            .update_run_phase(run_id, RunPhase::Discovering)
            .unwrap();
        assert_eq!(storage.get_run(run_id).unwrap().status, RunPhase::Discovering);

        let counts = RunCounts {
            processed: 5,
            failed: 1,
            skipped: 2,
            total_fetches: 9,
        };
        storage.finish_run(run_id, RunPhase::Done, &counts).unwrap();

        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.status, RunPhase::Done);
        assert_eq!(run.counts, counts);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_unknown_run() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(
            storage.get_run(42),
            Err(StorageError::RunNotFound(42))
        ));
        assert!(matches!(
            storage.update_run_phase(42, RunPhase::Done),
            Err(StorageError::RunNotFound(42))
        ));
        assert!(storage.get_latest_run().unwrap().is_none());
    }

    #[test]
    fn test_save_and_exists() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("hash").unwrap();

        assert!(!storage.exists("example.com/item/1").unwrap());
        storage
            .save(&record("example.com/item/1", "Widget", &[("price", "10")]), run_id)
            .unwrap();
        assert!(storage.exists("example.com/item/1").unwrap());

        let item = storage.get_item("example.com/item/1").unwrap().unwrap();
        assert_eq!(item.title, "Widget");
        assert_eq!(item.fields.get("price").map(String::as_str), Some("10"));
    }

    #[test]
    fn test_save_upserts_and_replaces_fields() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("hash").unwrap();

        let first = storage
            .save(
                &record("example.com/item/1", "Widget", &[("price", "10"), ("sku", "W1")]),
                run_id,
            )
            .unwrap();
        let second = storage
            .save(&record("example.com/item/1", "Widget v2", &[("price", "12")]), run_id)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(storage.count_items().unwrap(), 1);

        let item = storage.get_item("example.com/item/1").unwrap().unwrap();
        assert_eq!(item.title, "Widget v2");
        assert_eq!(item.fields.len(), 1);
        assert_eq!(item.fields.get("price").map(String::as_str), Some("12"));
    }

    #[test]
    fn test_failed_save_leaves_nothing_behind() {
        let storage = SqliteStorage::new_in_memory().unwrap();

        // Run 99 does not exist, so the foreign key rejects the item row
        let result = storage.save(&record("example.com/item/1", "Widget", &[("a", "b")]), 99);
        assert!(result.is_err());
        assert!(!storage.exists("example.com/item/1").unwrap());

        let conn = storage.conn().unwrap();
        let fields: i64 = conn
            .query_row("SELECT COUNT(*) FROM item_fields", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fields, 0);
    }

    #[test]
    fn test_audit_roundtrip() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("hash").unwrap();

        let mut failed = audit(run_id, "https://example.com/item/2", AuditOutcome::Failed);
        failed.http_status = Some(404);
        failed.error_message = Some("HTTP 404".to_string());
        failed.items_extracted = 0;

        storage
            .append_audit(&audit(run_id, "https://example.com/item/1", AuditOutcome::Success))
            .unwrap();
        storage.append_audit(&failed).unwrap();

        let records = storage.get_audit_records(run_id).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].outcome, AuditOutcome::Success);
        assert_eq!(records[1].http_status, Some(404));
        assert_eq!(records[1].error_message.as_deref(), Some("HTTP 404"));
    }

    #[test]
    fn test_audit_batch_and_counts() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("hash").unwrap();

        let batch = vec![
            audit(run_id, "https://example.com/1", AuditOutcome::Success),
            audit(run_id, "https://example.com/2", AuditOutcome::Success),
            audit(run_id, "https://example.com/3", AuditOutcome::Skipped),
        ];
        storage.append_audit_batch(&batch).unwrap();

        assert_eq!(
            storage.count_audit_by_outcome(AuditOutcome::Success).unwrap(),
            2
        );
        assert_eq!(
            storage.count_audit_by_outcome(AuditOutcome::Skipped).unwrap(),
            1
        );
        assert_eq!(storage.count_audit_by_outcome(AuditOutcome::Failed).unwrap(), 0);
        assert_eq!(storage.count_runs().unwrap(), 1);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");

        {
            let storage = SqliteStorage::new(&path).unwrap();
            storage.create_run("hash").unwrap();
        }

        let reopened = SqliteStorage::new(&path).unwrap();
        assert_eq!(reopened.count_runs().unwrap(), 1);
    }
}
