//! Per-category reports and the run summary

use crate::crawler::FetchError;
use crate::site::EntityKind;
use crate::state::CategoryState;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Failure taxonomy for page tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Timeout, connection error, 429 or 5xx; retried with a fixed delay
    TransientNetwork,

    /// Non-retryable status, or a transient failure that exhausted its retries
    PermanentHttp,

    /// Page fetched but yielded no records; informational, not a failure
    ParseEmpty,

    /// Page 1 of a listing could not be fetched, so the listing has no pages
    DiscoveryFailure,

    /// The run was shut down before the page was fetched
    Cancelled,
}

impl FailureKind {
    /// Classifies a single failed attempt
    pub fn of_attempt(error: &FetchError) -> Self {
        if error.is_retryable() {
            Self::TransientNetwork
        } else {
            Self::PermanentHttp
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient_network",
            Self::PermanentHttp => "permanent_http",
            Self::ParseEmpty => "parse_empty",
            Self::DiscoveryFailure => "discovery_failure",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A page that settled without records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    pub kind: EntityKind,
    pub page_number: u32,
    pub url: String,
    pub failure: FailureKind,
    pub reason: String,
    pub attempts: u32,
}

/// Outcome of one category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryReport {
    pub name: String,
    pub state: CategoryState,

    /// Page tasks created, one per page descriptor
    pub tasks: usize,
    pub pages_succeeded: usize,

    /// Pages that succeeded but yielded no records
    pub pages_empty: usize,

    /// Fetch attempts, retries and page 1 requests included
    pub attempts: u32,
    pub records: usize,
    pub failures: Vec<PageFailure>,

    /// Category-level error: an aborted task or a failed export
    pub error: Option<String>,
}

impl CategoryReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: CategoryState::Discovered,
            tasks: 0,
            pages_succeeded: 0,
            pages_empty: 0,
            attempts: 0,
            records: 0,
            failures: Vec::new(),
            error: None,
        }
    }

    /// Report for a category whose task never ran to completion
    pub fn aborted(name: impl Into<String>, reason: impl fmt::Display) -> Self {
        let mut report = Self::new(name);
        report.state = CategoryState::Failed;
        report.error = Some(format!("category aborted: {}", reason));
        report
    }

    pub fn pages_failed(&self) -> usize {
        self.failures.len()
    }

    /// Moves to `next`, ignoring illegal transitions
    pub fn transition(&mut self, next: CategoryState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                category = %self.name,
                from = %self.state,
                to = %next,
                "Ignoring invalid category transition"
            );
            return false;
        }

        tracing::debug!(category = %self.name, from = %self.state, to = %next, "Category state");
        self.state = next;
        true
    }
}

/// Totals for a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub site: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,

    /// Whether a shutdown request cut the run short
    pub interrupted: bool,
    pub categories: Vec<CategoryReport>,
}

impl RunSummary {
    pub fn categories_processed(&self) -> usize {
        self.categories.len()
    }

    pub fn categories_in(&self, state: CategoryState) -> usize {
        self.categories.iter().filter(|c| c.state == state).count()
    }

    pub fn categories_done(&self) -> usize {
        self.categories_in(CategoryState::Done)
    }

    pub fn categories_partial(&self) -> usize {
        self.categories_in(CategoryState::PartiallyFailed)
    }

    pub fn categories_failed(&self) -> usize {
        self.categories_in(CategoryState::Failed)
    }

    pub fn total_tasks(&self) -> usize {
        self.categories.iter().map(|c| c.tasks).sum()
    }

    pub fn total_attempts(&self) -> u32 {
        self.categories.iter().map(|c| c.attempts).sum()
    }

    pub fn pages_failed(&self) -> usize {
        self.categories.iter().map(CategoryReport::pages_failed).sum()
    }

    pub fn total_records(&self) -> usize {
        self.categories.iter().map(|c| c.records).sum()
    }

    pub fn category(&self, name: &str) -> Option<&CategoryReport> {
        self.categories.iter().find(|c| c.name == name)
    }
}
