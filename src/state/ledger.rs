use std::collections::HashSet;
use std::fmt;

/// Why an item was not fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The store already holds the item and `skip-existing` is set
    AlreadyStored,

    /// robots.txt disallows the item URL
    PolicyDenied,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStored => write!(f, "already stored"),
            Self::PolicyDenied => write!(f, "disallowed by robots.txt"),
        }
    }
}

/// Per-run record of which canonical identifiers were settled and how
///
/// An identifier lands in at most one of the processed, failed and skipped
/// sets. `claim` marks an identifier as in flight so a duplicate can never be
/// scheduled while the first attempt is still running.
#[derive(Debug, Default)]
pub struct ItemLedger {
    processed: HashSet<String>,
    failed: HashSet<String>,
    skipped_existing: HashSet<String>,
    skipped_policy: HashSet<String>,
    in_flight: HashSet<String>,
}

impl ItemLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the identifier was already claimed or settled this run
    pub fn is_known(&self, id: &str) -> bool {
        self.in_flight.contains(id) || self.is_settled(id)
    }

    /// Returns true if the identifier reached a final outcome this run
    pub fn is_settled(&self, id: &str) -> bool {
        self.processed.contains(id)
            || self.failed.contains(id)
            || self.skipped_existing.contains(id)
            || self.skipped_policy.contains(id)
    }

    /// Claims an identifier for an attempt
    ///
    /// Returns false if it is already in flight or settled.
    pub fn claim(&mut self, id: &str) -> bool {
        if self.is_known(id) {
            return false;
        }
        self.in_flight.insert(id.to_string())
    }

    /// Releases a claim without settling it (the run was cancelled)
    pub fn release(&mut self, id: &str) {
        self.in_flight.remove(id);
    }

    pub fn mark_processed(&mut self, id: &str) {
        self.settle(id);
        self.processed.insert(id.to_string());
    }

    pub fn mark_failed(&mut self, id: &str) {
        self.settle(id);
        self.failed.insert(id.to_string());
    }

    pub fn mark_skipped(&mut self, id: &str, reason: SkipReason) {
        self.settle(id);
        match reason {
            SkipReason::AlreadyStored => self.skipped_existing.insert(id.to_string()),
            SkipReason::PolicyDenied => self.skipped_policy.insert(id.to_string()),
        };
    }

    pub fn is_processed(&self, id: &str) -> bool {
        self.processed.contains(id)
    }

    pub fn is_failed(&self, id: &str) -> bool {
        self.failed.contains(id)
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn skipped_count(&self, reason: SkipReason) -> usize {
        match reason {
            SkipReason::AlreadyStored => self.skipped_existing.len(),
            SkipReason::PolicyDenied => self.skipped_policy.len(),
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// An identifier only ever moves out of `in_flight` into exactly one set
    fn settle(&mut self, id: &str) {
        debug_assert!(!self.is_settled(id), "{} settled twice", id);
        self.in_flight.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_once() {
        let mut ledger = ItemLedger::new();
        assert!(ledger.claim("example.com/item/1"));
        assert!(!ledger.claim("example.com/item/1"));
        assert_eq!(ledger.in_flight_count(), 1);
    }

    #[test]
    fn test_processed_cannot_be_reclaimed() {
        let mut ledger = ItemLedger::new();
        ledger.claim("a");
        ledger.mark_processed("a");

        assert!(ledger.is_processed("a"));
        assert!(!ledger.claim("a"));
        assert_eq!(ledger.in_flight_count(), 0);
    }

    #[test]
    fn test_outcomes_are_disjoint() {
        let mut ledger = ItemLedger::new();
        for id in ["a", "b", "c", "d"] {
            ledger.claim(id);
        }
        ledger.mark_processed("a");
        ledger.mark_failed("b");
        ledger.mark_skipped("c", SkipReason::AlreadyStored);
        ledger.mark_skipped("d", SkipReason::PolicyDenied);

        assert_eq!(ledger.processed_count(), 1);
        assert_eq!(ledger.failed_count(), 1);
        assert_eq!(ledger.skipped_count(SkipReason::AlreadyStored), 1);
        assert_eq!(ledger.skipped_count(SkipReason::PolicyDenied), 1);
        assert!(!ledger.is_failed("a"));
        assert!(!ledger.is_processed("b"));
    }

    #[test]
    fn test_release_allows_no_outcome() {
        let mut ledger = ItemLedger::new();
        ledger.claim("a");
        ledger.release("a");

        assert!(!ledger.is_known("a"));
        assert!(!ledger.is_settled("a"));
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::AlreadyStored.to_string(), "already stored");
        assert_eq!(
            SkipReason::PolicyDenied.to_string(),
            "disallowed by robots.txt"
        );
    }
}
