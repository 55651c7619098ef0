use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Sumi-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    pub site: SiteConfig,
}

/// Crawl scheduling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum number of categories processed at once
    #[serde(rename = "concurrency-outer")]
    pub concurrency_outer: u32,

    /// Maximum number of in-flight page fetches within one category
    #[serde(rename = "concurrency-inner")]
    pub concurrency_inner: u32,

    /// Minimum time between successive task starts on a scheduler (milliseconds)
    #[serde(rename = "min-interval-ms")]
    pub min_interval_ms: u64,

    /// Whether idle time banks start slots for a later burst (page scheduler only)
    pub carryover: bool,

    /// Number of resubmissions after a retryable page failure
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Fixed delay before a failed page is resubmitted (milliseconds)
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Upper bound on a single request (milliseconds)
    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,

    /// Number of items per listing page, used with total-count indicators
    #[serde(rename = "page-size")]
    pub page_size: u32,

    /// Maximum pages fetched per listing (0 = unlimited)
    #[serde(rename = "max-pages")]
    pub max_pages: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency_outer: 2,
            concurrency_inner: 5,
            min_interval_ms: 1000,
            carryover: true,
            max_retries: 2,
            retry_delay_ms: 2000,
            request_timeout_ms: 10_000,
            page_size: 25,
            max_pages: 0,
        }
    }
}

impl CrawlerConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Root directory for exported files
    pub directory: String,

    /// Export formats to write for every category
    pub formats: Vec<ExportFormat>,
}

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Markdown,
    Xlsx,
}

/// Target site selection
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site plug-in name (`musicbrainz`, `kworb`, `rigla`)
    pub name: String,

    /// Overrides the site's default base URL
    #[serde(rename = "base-url", default)]
    pub base_url: Option<String>,
}
