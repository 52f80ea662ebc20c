//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::extract::StructuredRecord;
use crate::state::RunPhase;
use crate::storage::{AuditOutcome, CrawlAuditRecord, RunCounts, RunRecord, StoredItem};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Methods take `&self` so one backend can be shared across concurrently
/// running item tasks; implementations serialize access internally.
pub trait Storage: Send + Sync {
    // ===== Run Management =====

    /// Creates a new crawl run in the `idle` phase
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&self, config_hash: &str) -> StorageResult<i64>;

    /// Records a phase transition of a running crawl
    fn update_run_phase(&self, run_id: i64, phase: RunPhase) -> StorageResult<()>;

    /// Stores the final phase and counts and stamps `finished_at`
    fn finish_run(&self, run_id: i64, phase: RunPhase, counts: &RunCounts) -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Items =====

    /// Checks whether an item with this canonical identifier is stored
    fn exists(&self, canonical_id: &str) -> StorageResult<bool>;

    /// Upserts an item and replaces its fields atomically
    ///
    /// Either the item row and all of its fields are written, or nothing is.
    ///
    /// # Returns
    ///
    /// The item's row ID
    fn save(&self, record: &StructuredRecord, run_id: i64) -> StorageResult<i64>;

    /// Loads a stored item with its fields
    fn get_item(&self, canonical_id: &str) -> StorageResult<Option<StoredItem>>;

    // ===== Audit Log =====

    /// Appends one audit record
    fn append_audit(&self, record: &CrawlAuditRecord) -> StorageResult<()>;

    /// Appends several audit records in one transaction
    fn append_audit_batch(&self, records: &[CrawlAuditRecord]) -> StorageResult<()>;

    /// Gets the audit records of a run in insertion order
    fn get_audit_records(&self, run_id: i64) -> StorageResult<Vec<CrawlAuditRecord>>;

    // ===== Statistics =====

    /// Gets total item count
    fn count_items(&self) -> StorageResult<u64>;

    /// Counts audit records with the given outcome across all runs
    fn count_audit_by_outcome(&self, outcome: AuditOutcome) -> StorageResult<u64>;

    /// Gets total run count
    fn count_runs(&self) -> StorageResult<u64>;
}
