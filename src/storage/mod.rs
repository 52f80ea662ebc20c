//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Transactional item upserts with their extracted fields
//! - The append-only crawl audit log
//! - Run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::RunPhase;
use crate::CrawlError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(CrawlError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, CrawlError> {
    SqliteStorage::new(path)
}

/// What kind of page a fetch targeted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Listing,
    Detail,
    /// robots.txt document
    Policy,
}

impl TargetKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Detail => "detail",
            Self::Policy => "policy",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "listing" => Some(Self::Listing),
            "detail" => Some(Self::Detail),
            "policy" => Some(Self::Policy),
            _ => None,
        }
    }
}

/// Final outcome recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditOutcome {
    Success,
    Failed,
    Skipped,
}

impl AuditOutcome {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// One row of the audit log
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlAuditRecord {
    pub run_id: i64,
    pub url: String,
    pub kind: TargetKind,
    pub outcome: AuditOutcome,
    pub http_status: Option<u16>,
    pub error_message: Option<String>,
    pub items_extracted: u32,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl CrawlAuditRecord {
    /// Record stamped with the current time and no status, error or duration
    pub fn new(run_id: i64, url: impl Into<String>, kind: TargetKind, outcome: AuditOutcome) -> Self {
        Self {
            run_id,
            url: url.into(),
            kind,
            outcome,
            http_status: None,
            error_message: None,
            items_extracted: 0,
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunPhase,
    pub counts: RunCounts,
}

/// Totals stored on a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub processed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub total_fetches: u64,
}

/// An item as stored in the database
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    pub id: i64,
    pub canonical_id: String,
    pub url: String,
    pub title: String,
    pub strategy: String,
    pub run_id: i64,
    pub updated_at: String,
    pub fields: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_kind_roundtrip() {
        for kind in [TargetKind::Listing, TargetKind::Detail, TargetKind::Policy] {
            assert_eq!(TargetKind::from_db_string(kind.to_db_string()), Some(kind));
        }
        assert_eq!(TargetKind::from_db_string("sitemap"), None);
    }

    #[test]
    fn test_audit_outcome_roundtrip() {
        for outcome in [
            AuditOutcome::Success,
            AuditOutcome::Failed,
            AuditOutcome::Skipped,
        ] {
            assert_eq!(
                AuditOutcome::from_db_string(outcome.to_db_string()),
                Some(outcome)
            );
        }
        assert_eq!(AuditOutcome::from_db_string("invalid"), None);
    }
}
