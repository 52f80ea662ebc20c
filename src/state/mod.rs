//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `RunPhase`: the run-level state machine (discovery, extraction, draining)
//! - `QuotaWindow`: the shared request budget owned by the scheduler
//! - `ItemLedger`: per-run processed/failed/skipped sets keyed by canonical id

mod ledger;
mod quota;
mod run_phase;

// Re-export main types
pub use ledger::{ItemLedger, SkipReason};
pub use quota::QuotaWindow;
pub use run_phase::RunPhase;
