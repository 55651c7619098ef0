/// Page task state definitions
use std::fmt;

/// Lifecycle of a page task
///
/// A retried task moves from `Failed` back to `Queued`; the descriptor it
/// targets never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Waiting for admission on the page scheduler
    Queued,

    /// Admitted; the fetch is in flight
    Running,

    /// Settled with extracted records
    Succeeded,

    /// Settled with an error
    Failed,
}

impl TaskState {
    /// Returns true once the task has settled
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Failed)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
                | (Self::Failed, Self::Queued)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
