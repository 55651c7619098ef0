//! HTTP fetcher implementation
//!
//! This module handles every network request the harvester makes:
//! - Building the HTTP client with the identifying user agent
//! - Issuing exactly one GET per call with an upper-bound timeout
//! - Classifying failures into timeouts, HTTP statuses and network errors
//!
//! Retrying is the caller's job; see the coordinator's retry policy.

use crate::config::UserAgentConfig;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// A fetched document, ready for extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    /// Final URL after redirects
    pub url: String,

    /// HTTP status code
    pub status_code: u16,

    /// Response body
    pub body: String,
}

impl RawDocument {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status_code: 200,
            body: body.into(),
        }
    }
}

/// Classified fetch failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("network error: {0}")]
    Network(String),
}

impl FetchError {
    /// Returns true if another attempt may succeed
    ///
    /// | Failure | Retryable |
    /// |---------|-----------|
    /// | Timeout | yes |
    /// | Network error | yes |
    /// | HTTP 429, 5xx | yes |
    /// | Other HTTP statuses (404, 410, ...) | no |
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) => true,
            Self::HttpStatus(code) => *code == 429 || (500..600).contains(code),
        }
    }
}

/// One network request per call
///
/// Implemented by [`HttpFetcher`]; a browser-backed source or a test double
/// can stand in without touching the coordinator.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<RawDocument, FetchError>;
}

/// Builds an HTTP client with the identifying user agent
///
/// # Example
///
/// ```no_run
/// use sumi_harvest::config::UserAgentConfig;
/// use sumi_harvest::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "SumiHarvest".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed [`Fetcher`]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds the client from the user agent configuration
    pub fn from_config(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<RawDocument, FetchError> {
        fetch_url(&self.client, url, timeout).await
    }
}

/// Fetches a URL once and classifies the outcome
pub async fn fetch_url(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<RawDocument, FetchError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(classify_error)?;

    let status = response.status();
    if !status.is_success() {
        tracing::debug!(url, status = status.as_u16(), "Non-success response");
        return Err(FetchError::HttpStatus(status.as_u16()));
    }

    let final_url = response.url().to_string();
    let body = response.text().await.map_err(classify_error)?;

    Ok(RawDocument {
        url: final_url,
        status_code: status.as_u16(),
        body,
    })
}

fn classify_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else if let Some(status) = error.status() {
        FetchError::HttpStatus(status.as_u16())
    } else if error.is_connect() {
        FetchError::Network(format!("connection failed: {}", error))
    } else {
        FetchError::Network(error.to_string())
    }
}
