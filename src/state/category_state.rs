/// Category state definitions for tracking harvest progress
use std::fmt;

/// Represents the current state of a category in the harvest pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryState {
    // ===== Active States =====
    /// Category was found on the site's index page
    Discovered,

    /// Page 1 of each listing is being fetched to size the pagination
    Paginating,

    /// Page tasks are queued or running on the category's page scheduler
    Fetching,

    /// Every page task has settled; records are being merged
    Aggregating,

    // ===== Terminal States =====
    /// Every page succeeded
    Done,

    /// At least one page failed permanently and at least one succeeded
    PartiallyFailed,

    /// No page succeeded; nothing was exported
    Failed,
}

impl CategoryState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::PartiallyFailed | Self::Failed)
    }

    /// Returns true if a category in this state produced exportable records
    pub fn is_exported(&self) -> bool {
        matches!(self, Self::Done | Self::PartiallyFailed)
    }

    /// Checks whether moving from `self` to `next` is a legal transition
    ///
    /// `Failed` is reachable from every active state because pagination can
    /// fail before any page task exists.
    pub fn can_transition_to(&self, next: CategoryState) -> bool {
        use CategoryState::*;

        match (self, next) {
            (Discovered, Paginating) => true,
            (Paginating, Fetching) => true,
            (Fetching, Aggregating) => true,
            (Aggregating, Done | PartiallyFailed | Failed) => true,
            (Discovered | Paginating | Fetching, Failed) => true,
            _ => false,
        }
    }

    /// Derives the terminal state from page outcome counts
    pub fn from_outcomes(pages_succeeded: usize, pages_failed: usize) -> Self {
        match (pages_succeeded, pages_failed) {
            (0, _) => Self::Failed,
            (_, 0) => Self::Done,
            _ => Self::PartiallyFailed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Paginating => "paginating",
            Self::Fetching => "fetching",
            Self::Aggregating => "aggregating",
            Self::Done => "done",
            Self::PartiallyFailed => "partially_failed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CategoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
