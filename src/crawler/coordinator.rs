//! Crawl coordinator - main harvest orchestration logic
//!
//! This module drives a run from the category index to the exported files:
//! - Discovering categories on the site's index page
//! - Admitting categories through the outer scheduler
//! - Paginating each category's listings and fetching their pages through a
//!   per-category page scheduler, with a fixed-delay retry policy
//! - Aggregating page results and exporting finished categories
//! - Rolling page and category outcomes up into a run summary
//!
//! Page and category failures never abort siblings. Only a failed category
//! discovery is a run-level error.

use crate::config::CrawlerConfig;
use crate::crawler::aggregator::ResultAggregator;
use crate::crawler::paginator::{PageDescriptor, Pagination, Paginator};
use crate::crawler::report::{CategoryReport, FailureKind, PageFailure, RunSummary};
use crate::crawler::scheduler::{Scheduler, SchedulerConfig, SchedulerError};
use crate::crawler::{FetchError, Fetcher, RawDocument};
use crate::output::{assign_dir_names, Exporter};
use crate::site::{Category, Listing, Site};
use crate::state::{CategoryState, TaskState};
use crate::HarvestError;
use chrono::Utc;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a URL could not be fetched under the retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttemptError {
    Fetch(FetchError),
    Cancelled,
    Panicked(String),
}

impl AttemptError {
    fn failure_kind(&self, first_page: bool) -> FailureKind {
        match self {
            Self::Cancelled => FailureKind::Cancelled,
            _ if first_page => FailureKind::DiscoveryFailure,
            _ => FailureKind::PermanentHttp,
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "{}", e),
            Self::Cancelled => f.write_str("cancelled by shutdown"),
            Self::Panicked(message) => write!(f, "fetch task panicked: {}", message),
        }
    }
}

/// Lifecycle of one page task
///
/// Shared with each attempt submitted to the scheduler, so admission marks
/// the task running.
#[derive(Debug)]
struct PageTask {
    url: String,
    state: Mutex<TaskState>,
}

impl PageTask {
    fn new(url: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            url: url.into(),
            state: Mutex::new(TaskState::Queued),
        })
    }

    fn state(&self) -> TaskState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance(&self, next: TaskState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.can_transition_to(next) {
            tracing::debug!(url = %self.url, from = %*state, to = %next, "Page task transition");
            *state = next;
        } else {
            tracing::warn!(
                url = %self.url,
                from = %*state,
                to = %next,
                "Illegal page task transition ignored"
            );
        }
    }
}

/// Settled page task
#[derive(Debug)]
struct PageOutcome {
    state: TaskState,
    attempts: u32,
    records: usize,
    failure: Option<PageFailure>,
}

struct Shared<S: Site> {
    site: S,
    fetcher: Arc<dyn Fetcher>,
    exporter: Arc<dyn Exporter<S::Record>>,
    aggregator: ResultAggregator<S::Record>,
    paginator: Paginator,
    category_scheduler: SchedulerConfig,
    page_scheduler: SchedulerConfig,
    max_retries: u32,
    retry_delay: Duration,
    request_timeout: Duration,
    shutdown: CancellationToken,
}

/// Main harvest coordinator
///
/// Owns nothing global: every run builds its own schedulers.
pub struct Coordinator<S: Site> {
    shared: Arc<Shared<S>>,
}

impl<S: Site> Coordinator<S> {
    /// Creates a coordinator for `site`
    ///
    /// # Arguments
    ///
    /// * `site` - The site plug-in
    /// * `fetcher` - Performs the page requests
    /// * `exporter` - Receives each finished category
    /// * `config` - Scheduling and retry settings
    pub fn new(
        site: S,
        fetcher: Arc<dyn Fetcher>,
        exporter: Arc<dyn Exporter<S::Record>>,
        config: &CrawlerConfig,
    ) -> Self {
        let shared = Shared {
            site,
            fetcher,
            exporter,
            aggregator: ResultAggregator::new(),
            paginator: Paginator::new(config.page_size, config.max_pages),
            category_scheduler: SchedulerConfig::new(
                config.concurrency_outer as usize,
                config.min_interval(),
                false,
            ),
            page_scheduler: SchedulerConfig::new(
                config.concurrency_inner as usize,
                config.min_interval(),
                config.carryover,
            ),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            request_timeout: config.request_timeout(),
            shutdown: CancellationToken::new(),
        };

        Self {
            shared: Arc::new(shared),
        }
    }

    /// Token that stops the run when cancelled
    ///
    /// Queued categories and pages settle as cancelled, in-flight fetches
    /// finish, and categories with results are still exported.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shared.shutdown.clone()
    }

    /// Runs the harvest to completion
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - Every discovered category settled
    /// * `Err(HarvestError)` - The category index could not be fetched
    pub async fn run(&self) -> Result<RunSummary, HarvestError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let site = self.shared.site.name();

        tracing::info!(site, "Starting harvest");

        let categories_scheduler = Scheduler::with_shutdown(
            self.shared.category_scheduler,
            self.shared.shutdown.child_token(),
        );

        let categories = self.shared.discover_categories(&categories_scheduler).await?;

        let handles: Vec<_> = categories
            .into_iter()
            .map(|category| {
                let name = category.name.clone();
                let shared = Arc::clone(&self.shared);
                let handle = categories_scheduler
                    .submit(async move { shared.process_category(category).await });
                (name, handle)
            })
            .collect();

        let mut reports = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(SchedulerError::Cancelled) => {
                    tracing::info!(category = %name, "Category not started before shutdown");
                    reports.push(CategoryReport::aborted(name, "shut down before start"));
                }
                Err(e) => {
                    tracing::error!(category = %name, error = %e, "Category task failed");
                    reports.push(CategoryReport::aborted(name, e));
                }
            }
        }

        categories_scheduler.drain().await;

        let summary = RunSummary {
            site: site.to_string(),
            started_at,
            finished_at: Utc::now(),
            duration: clock.elapsed(),
            interrupted: self.shared.shutdown.is_cancelled(),
            categories: reports,
        };

        tracing::info!(
            site,
            categories = summary.categories_processed(),
            done = summary.categories_done(),
            partial = summary.categories_partial(),
            failed = summary.categories_failed(),
            pages_failed = summary.pages_failed(),
            records = summary.total_records(),
            duration_ms = summary.duration.as_millis() as u64,
            interrupted = summary.interrupted,
            "Harvest complete"
        );

        Ok(summary)
    }
}

impl<S: Site> Shared<S> {
    /// Fetches the category index and reads the categories from it
    ///
    /// Categories sharing a name with an earlier one are dropped.
    async fn discover_categories(
        &self,
        scheduler: &Scheduler,
    ) -> Result<Vec<Category>, HarvestError> {
        let url = self.site.index_url();
        let task = PageTask::new(url.as_str());
        let (result, attempts) = self.fetch_with_retry(scheduler, &task).await;

        let index = match result {
            Ok(index) => index,
            Err(AttemptError::Fetch(source)) => {
                tracing::error!(url = %url, attempts, error = %source, "Category discovery failed");
                return Err(HarvestError::Discovery { url, source });
            }
            Err(AttemptError::Panicked(message)) => {
                return Err(HarvestError::Discovery {
                    url,
                    source: FetchError::Network(message),
                });
            }
            Err(AttemptError::Cancelled) => return Err(HarvestError::Cancelled),
        };

        let mut seen = HashSet::new();
        let mut categories = Vec::new();
        for category in self.site.discover_categories(&index) {
            if seen.insert(category.name.clone()) {
                categories.push(category);
            } else {
                tracing::warn!(category = %category.name, "Duplicate category name, skipping");
            }
        }
        assign_dir_names(&mut categories);

        tracing::info!(
            site = self.site.name(),
            count = categories.len(),
            "Discovered categories"
        );

        Ok(categories)
    }

    /// Paginates, fetches, aggregates and exports one category
    async fn process_category(&self, category: Category) -> CategoryReport {
        let category = Arc::new(category);
        let mut report = CategoryReport::new(category.name.clone());
        report.transition(CategoryState::Paginating);

        let listings = self.site.listings(&category);
        self.aggregator
            .register(&category, listings.iter().map(|l| l.kind.clone()));

        let pages = Scheduler::with_shutdown(self.page_scheduler, self.shutdown.child_token());

        let paginations: Vec<_> = listings
            .iter()
            .map(|listing| self.paginate(&pages, &category, listing))
            .collect();
        let paginated = join_all(paginations).await;

        if paginated.iter().any(Result::is_ok) {
            report.transition(CategoryState::Fetching);
        }

        let mut outcomes = Vec::new();
        let mut remaining = Vec::new();
        for (listing, result) in listings.iter().zip(paginated) {
            match result {
                Ok((pagination, task, attempts)) => {
                    let total = pagination.page_count;
                    let mut descriptors =
                        self.paginator.descriptors(&self.site, &category, listing, total);
                    if let Some(first) = descriptors.next() {
                        outcomes.push(self.settle_page(
                            &first,
                            &pagination.first_page,
                            &task,
                            attempts,
                            total,
                        ));
                    }
                    remaining.push(descriptors.map(move |descriptor| (descriptor, total)));
                }
                Err(outcome) => outcomes.push(outcome),
            }
        }

        // Descriptors are pulled lazily; at most `queue_depth` pages are
        // queued or in flight at once
        let queue_depth = self.page_scheduler.concurrency.saturating_mul(4).max(1);
        let crawled: Vec<PageOutcome> = stream::iter(remaining.into_iter().flatten())
            .map(|(descriptor, total)| self.crawl_page(&pages, descriptor, total))
            .buffer_unordered(queue_depth)
            .collect()
            .await;
        outcomes.extend(crawled);
        pages.drain().await;

        report.tasks = outcomes.len();
        for outcome in outcomes {
            report.attempts += outcome.attempts;
            match outcome.state {
                TaskState::Succeeded => {
                    report.pages_succeeded += 1;
                    if outcome.records == 0 {
                        report.pages_empty += 1;
                    }
                }
                _ => report.failures.extend(outcome.failure),
            }
        }

        let final_state = CategoryState::from_outcomes(report.pages_succeeded, report.pages_failed());

        if report.state == CategoryState::Fetching {
            report.transition(CategoryState::Aggregating);
        }

        let result = self.aggregator.finalize(&category);
        report.records = result.total_records();

        if final_state.is_exported() {
            if let Err(e) = self.exporter.export(&result) {
                tracing::error!(category = %category.name, error = %e, "Export failed");
                report.error = Some(format!("export failed: {}", e));
            }
        }

        report.transition(final_state);

        tracing::info!(
            category = %category.name,
            state = %report.state,
            pages = report.tasks,
            pages_failed = report.pages_failed(),
            records = report.records,
            "Category finished"
        );

        report
    }

    /// Fetches page 1 of a listing and sizes the listing
    ///
    /// On failure the listing contributes a single failed page.
    async fn paginate(
        &self,
        pages: &Scheduler,
        category: &Arc<Category>,
        listing: &Listing,
    ) -> Result<(Pagination, Arc<PageTask>, u32), PageOutcome> {
        let task = PageTask::new(listing.first_page_url.as_str());
        let attempts = AtomicU32::new(0);

        let paginated = self
            .paginator
            .discover(&self.site, category, listing, |_| {
                let (attempts, task) = (&attempts, &task);
                async move {
                    let (result, used) = self.fetch_with_retry(pages, task).await;
                    attempts.store(used, Ordering::Relaxed);
                    result
                }
            })
            .await;

        let attempts = attempts.into_inner();
        match paginated {
            Ok(pagination) => Ok((pagination, task, attempts)),
            Err(error) => {
                tracing::warn!(
                    category = %category.name,
                    kind = %listing.kind,
                    url = %listing.first_page_url,
                    error = %error,
                    "Listing discovery failed"
                );
                let descriptor = PageDescriptor {
                    category: Arc::clone(category),
                    kind: listing.kind.clone(),
                    page_number: 1,
                    url: listing.first_page_url.clone(),
                };
                Err(fail_page(&descriptor, &task, &error, true, attempts))
            }
        }
    }

    /// Runs the page task for one descriptor
    async fn crawl_page(
        &self,
        pages: &Scheduler,
        descriptor: PageDescriptor,
        total: u32,
    ) -> PageOutcome {
        let task = PageTask::new(descriptor.url.as_str());
        let (result, attempts) = self.fetch_with_retry(pages, &task).await;

        match result {
            Ok(document) => self.settle_page(&descriptor, &document, &task, attempts, total),
            Err(error) => {
                tracing::warn!(
                    category = %descriptor.category.name,
                    kind = %descriptor.kind,
                    page = descriptor.page_number,
                    attempts,
                    error = %error,
                    "Page failed"
                );
                fail_page(&descriptor, &task, &error, false, attempts)
            }
        }
    }

    /// Extracts a fetched page and hands its records to the aggregator
    fn settle_page(
        &self,
        descriptor: &PageDescriptor,
        document: &RawDocument,
        task: &PageTask,
        attempts: u32,
        total: u32,
    ) -> PageOutcome {
        let records = self
            .site
            .extract(document, &descriptor.category, &descriptor.kind);
        let count = records.len();

        if count == 0 {
            tracing::info!(
                category = %descriptor.category.name,
                kind = %descriptor.kind,
                page = descriptor.page_number,
                failure = %FailureKind::ParseEmpty,
                "No data on page"
            );
        }

        self.aggregator.add(
            &descriptor.category,
            &descriptor.kind,
            descriptor.page_number,
            records,
        );

        tracing::info!(
            category = %descriptor.category.name,
            kind = %descriptor.kind,
            page = descriptor.page_number,
            total,
            records = count,
            "Page done"
        );

        PageOutcome {
            state: task.state(),
            attempts,
            records: count,
            failure: None,
        }
    }

    /// Fetches a task's URL through `scheduler`, retrying transient failures
    ///
    /// Makes at most `1 + max_retries` attempts, each admitted by the
    /// scheduler, separated by the fixed retry delay. Returns the outcome and
    /// the number of attempts that actually ran; `task` is left settled.
    async fn fetch_with_retry(
        &self,
        scheduler: &Scheduler,
        task: &Arc<PageTask>,
    ) -> (Result<RawDocument, AttemptError>, u32) {
        let mut attempts = 0;

        loop {
            let fetcher = Arc::clone(&self.fetcher);
            let attempt = Arc::clone(task);
            let timeout = self.request_timeout;

            let outcome = scheduler
                .submit(async move {
                    attempt.advance(TaskState::Running);
                    fetcher.fetch(&attempt.url, timeout).await
                })
                .await;

            let error = match outcome {
                Ok(Ok(document)) => {
                    task.advance(TaskState::Succeeded);
                    return (Ok(document), attempts + 1);
                }
                Ok(Err(error)) => {
                    task.advance(TaskState::Failed);
                    attempts += 1;
                    error
                }
                Err(SchedulerError::Cancelled) => {
                    task.advance(TaskState::Failed);
                    return (Err(AttemptError::Cancelled), attempts);
                }
                Err(SchedulerError::Panicked(message)) => {
                    task.advance(TaskState::Failed);
                    return (Err(AttemptError::Panicked(message)), attempts + 1);
                }
            };

            if !error.is_retryable() || attempts > self.max_retries {
                return (Err(AttemptError::Fetch(error)), attempts);
            }

            tracing::warn!(
                url = %task.url,
                attempt = attempts,
                max_attempts = self.max_retries + 1,
                failure = %FailureKind::of_attempt(&error),
                error = %error,
                delay_ms = self.retry_delay.as_millis() as u64,
                "Transient failure, retrying"
            );

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    return (Err(AttemptError::Cancelled), attempts);
                }
                _ = tokio::time::sleep(self.retry_delay) => {}
            }

            task.advance(TaskState::Queued);
        }
    }
}

/// Builds the outcome of a page that settled without records
fn fail_page(
    descriptor: &PageDescriptor,
    task: &PageTask,
    error: &AttemptError,
    first_page: bool,
    attempts: u32,
) -> PageOutcome {
    PageOutcome {
        state: task.state(),
        attempts,
        records: 0,
        failure: Some(PageFailure {
            kind: descriptor.kind.clone(),
            page_number: descriptor.page_number,
            url: descriptor.url.clone(),
            failure: error.failure_kind(first_page),
            reason: error.to_string(),
            attempts,
        }),
    }
}
