/// Run phase definitions for the crawl state machine
///
/// A run moves `Idle -> Discovering -> Extracting -> Draining -> Done`. `Failed`
/// is only reachable from `Discovering`; a cancelled discovery skips straight to
/// `Draining` so buffered audit records are still flushed.
use std::fmt;

/// Represents the current phase of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    /// Run created, nothing fetched yet
    Idle,

    /// Walking listing pages to collect item URLs
    Discovering,

    /// Fetching, extracting and persisting detail pages
    Extracting,

    /// Waiting for in-flight fetches and flushing audit records
    Draining,

    // ===== Terminal States =====
    /// Run finished; summary is available
    Done,

    /// Discovery could not produce anything (listing page 1 failed)
    Failed,
}

impl RunPhase {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Checks whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Discovering)
                | (Self::Discovering, Self::Extracting)
                | (Self::Discovering, Self::Draining)
                | (Self::Discovering, Self::Failed)
                | (Self::Extracting, Self::Draining)
                | (Self::Draining, Self::Done)
        )
    }

    /// Converts the phase to the string stored in the `runs` table
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Extracting => "extracting",
            Self::Draining => "draining",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Parses a phase from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "discovering" => Some(Self::Discovering),
            "extracting" => Some(Self::Extracting),
            "draining" => Some(Self::Draining),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible phases
    pub fn all_phases() -> Vec<Self> {
        vec![
            Self::Idle,
            Self::Discovering,
            Self::Extracting,
            Self::Draining,
            Self::Done,
            Self::Failed,
        ]
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
