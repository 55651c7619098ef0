//! Crawler module for fetching, scheduling and aggregating pages
//!
//! This module contains the core harvesting logic, including:
//! - HTTP fetching with failure classification
//! - Start-interval and concurrency scheduling
//! - Pagination discovery
//! - Result aggregation
//! - Overall run coordination

mod aggregator;
mod coordinator;
mod fetcher;
mod paginator;
mod report;
mod scheduler;

pub use aggregator::{CategoryResult, KindRecords, ResultAggregator};
pub use coordinator::Coordinator;
pub use fetcher::{build_http_client, fetch_url, FetchError, Fetcher, HttpFetcher, RawDocument};
pub use paginator::{
    last_page_in, total_items_in, PageDescriptor, Pagination, Paginator, MAX_PAGE_COUNT,
};
pub use report::{CategoryReport, FailureKind, PageFailure, RunSummary};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError, TaskHandle};

use crate::config::Config;
use crate::output::{self, Exporter};
use crate::site::{Kworb, MusicBrainz, Rigla, Site};
use crate::HarvestError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs a complete harvest for the configured site
///
/// This is the main entry point for starting a run. It will:
/// 1. Build the HTTP client and the configured exporters
/// 2. Discover the site's categories
/// 3. Paginate, fetch and extract every category
/// 4. Export each finished category
/// 5. Write the markdown run summary
///
/// Cancelling `shutdown` stops the run gracefully.
///
/// # Returns
///
/// * `Ok(RunSummary)` - The run completed, possibly with failed pages
/// * `Err(HarvestError)` - The run could not start or discover categories
pub async fn harvest(
    config: &Config,
    shutdown: CancellationToken,
) -> Result<RunSummary, HarvestError> {
    let base_url = config.site.base_url.clone();

    match config.site.name.as_str() {
        "musicbrainz" => run_site(MusicBrainz::new(base_url), config, shutdown).await,
        "kworb" => run_site(Kworb::new(base_url), config, shutdown).await,
        "rigla" => run_site(Rigla::new(base_url), config, shutdown).await,
        other => Err(HarvestError::UnknownSite(other.to_string())),
    }
}

async fn run_site<S: Site>(
    site: S,
    config: &Config,
    shutdown: CancellationToken,
) -> Result<RunSummary, HarvestError> {
    let site_name = site.name();
    let fetcher = Arc::new(HttpFetcher::from_config(&config.user_agent)?);
    let exporter: Arc<dyn Exporter<S::Record>> =
        Arc::new(output::build_exporters::<S::Record>(&config.output, site_name));

    let coordinator = Coordinator::new(site, fetcher, exporter, &config.crawler);

    // Forward the caller's shutdown request to the coordinator
    let token = coordinator.shutdown_token();
    if shutdown.is_cancelled() {
        token.cancel();
    }
    let forward = tokio::spawn(async move {
        shutdown.cancelled().await;
        token.cancel();
    });

    let outcome = coordinator.run().await;
    forward.abort();
    let summary = outcome?;

    let summary_path = output::site_output_dir(&config.output, site_name).join("summary.md");
    output::generate_markdown_summary(&summary, &summary_path)?;
    tracing::info!(path = %summary_path.display(), "Wrote run summary");

    Ok(summary)
}
