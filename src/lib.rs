//! Sumi-Harvest: a polite category harvester
//!
//! This crate discovers the categories of a site, paginates each category,
//! fetches the pages under a two-level politeness budget, extracts typed
//! records with a site plug-in, and exports the aggregated results.

pub mod config;
pub mod crawler;
pub mod output;
pub mod site;
pub mod state;

use thiserror::Error;

/// Main error type for Sumi-Harvest runs
///
/// Only run-level failures surface here. Page and category failures are
/// contained by the coordinator and reported in the run summary.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Category discovery failed for {url}: {source}")]
    Discovery {
        url: String,
        source: crawler::FetchError,
    },

    #[error("Run cancelled before category discovery finished")]
    Cancelled,

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Unknown site: {0}")]
    UnknownSite(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, RunSummary};
pub use site::{Category, EntityKind, Record, Site};
pub use state::{CategoryState, TaskState};
