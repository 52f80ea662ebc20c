//! Run summary formatting
//!
//! Renders a finished run's counts for the operator.

use crate::crawler::RunSummary;

/// Formats a run summary as plain text
///
/// # Arguments
///
/// * `summary` - Counts of a finished run
///
/// # Returns
///
/// A multi-line report ending with a newline
pub fn format_run_summary(summary: &RunSummary) -> String {
    let mut out = String::new();

    out.push_str("=== Crawl Summary ===\n\n");
    out.push_str(&format!("Run ID:          {}\n", summary.run_id));
    out.push_str(&format!("Status:          {}\n", summary.phase));
    if summary.cancelled {
        out.push_str("Cancelled:       yes\n");
    }
    out.push_str(&format!(
        "Duration:        {:.1}s\n",
        summary.duration.as_secs_f64()
    ));
    out.push('\n');

    out.push_str(&format!("Listing pages:   {}\n", summary.listing_pages));
    out.push_str(&format!("Items found:     {}\n", summary.discovered));
    out.push_str(&format!("Processed:       {}\n", summary.processed));
    out.push_str(&format!("Failed:          {}\n", summary.failed));
    out.push_str(&format!(
        "Skipped:         {} ({} already stored, {} disallowed)\n",
        summary.skipped_existing + summary.skipped_policy,
        summary.skipped_existing,
        summary.skipped_policy
    ));
    if summary.cancelled_items > 0 {
        out.push_str(&format!("Not attempted:   {}\n", summary.cancelled_items));
    }
    out.push_str(&format!("Total fetches:   {}\n", summary.total_fetches));

    out
}

/// Prints a run summary to stdout
pub fn print_run_summary(summary: &RunSummary) {
    print!("{}", format_run_summary(summary));
}
