//! Output module for the operator surface
//!
//! This module handles:
//! - Printing the summary of a finished run
//! - Reading stored catalog statistics

pub mod stats;
mod summary;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use summary::{format_run_summary, print_run_summary};
