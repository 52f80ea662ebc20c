//! Statistics generation from the catalog database
//!
//! This module provides functionality for extracting and displaying
//! stored statistics through the storage layer.

use crate::storage::{AuditOutcome, RunRecord, Storage};
use crate::CrawlError;

/// Stored catalog statistics
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Items in the catalog
    pub total_items: u64,

    /// Number of recorded runs
    pub total_runs: u64,

    /// Audit records per outcome, across all runs
    pub audit_success: u64,
    pub audit_failed: u64,
    pub audit_skipped: u64,

    /// The most recent run, if any
    pub latest_run: Option<RunRecord>,
}

impl CrawlStatistics {
    pub fn total_audits(&self) -> u64 {
        self.audit_success + self.audit_failed + self.audit_skipped
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(CrawlError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics, CrawlError> {
    Ok(CrawlStatistics {
        total_items: storage.count_items()?,
        total_runs: storage.count_runs()?,
        audit_success: storage.count_audit_by_outcome(AuditOutcome::Success)?,
        audit_failed: storage.count_audit_by_outcome(AuditOutcome::Failed)?,
        audit_skipped: storage.count_audit_by_outcome(AuditOutcome::Skipped)?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Catalog Statistics ===\n");

    println!("Overview:");
    println!("  Items stored: {}", stats.total_items);
    println!("  Runs recorded: {}", stats.total_runs);
    println!();

    println!("Fetch Outcomes:");
    for (label, count) in [
        ("success", stats.audit_success),
        ("failed", stats.audit_failed),
        ("skipped", stats.audit_skipped),
    ] {
        let percentage = if stats.total_audits() > 0 {
            (count as f64 / stats.total_audits() as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", label, count, percentage);
    }
    println!();

    if let Some(run) = &stats.latest_run {
        println!("Latest Run (#{}):", run.id);
        println!("  Status: {}", run.status);
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!(
            "  Processed: {}, failed: {}, skipped: {}, fetches: {}",
            run.counts.processed, run.counts.failed, run.counts.skipped, run.counts.total_fetches
        );
    }
}
