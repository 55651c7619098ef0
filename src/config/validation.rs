use crate::config::types::{Config, CrawlerConfig, OutputConfig, SiteConfig, UserAgentConfig};
use crate::crawler::MAX_PAGE_COUNT;
use crate::site::SITE_NAMES;
use crate::ConfigError;
use url::Url;

const MAX_CONCURRENCY: u32 = 32;
const MAX_RETRIES: u32 = 10;
const MIN_REQUEST_TIMEOUT_MS: u64 = 100;
const MAX_DELAY_MS: u64 = 3_600_000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_site_config(&config.site)?;
    Ok(())
}

/// Validates crawl scheduling limits
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("concurrency_outer", config.concurrency_outer),
        ("concurrency_inner", config.concurrency_inner),
    ] {
        if !(1..=MAX_CONCURRENCY).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "{} must be between 1 and {}, got {}",
                name, MAX_CONCURRENCY, value
            )));
        }
    }

    if config.max_retries > MAX_RETRIES {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= {}, got {}",
            MAX_RETRIES, config.max_retries
        )));
    }

    for (name, value) in [
        ("min_interval_ms", config.min_interval_ms),
        ("retry_delay_ms", config.retry_delay_ms),
        ("request_timeout_ms", config.request_timeout_ms),
    ] {
        if value > MAX_DELAY_MS {
            return Err(ConfigError::Validation(format!(
                "{} must be <= {}ms, got {}ms",
                name, MAX_DELAY_MS, value
            )));
        }
    }

    if config.max_pages > MAX_PAGE_COUNT {
        return Err(ConfigError::Validation(format!(
            "max_pages must be <= {} (0 = up to {}), got {}",
            MAX_PAGE_COUNT, MAX_PAGE_COUNT, config.max_pages
        )));
    }

    if config.request_timeout_ms < MIN_REQUEST_TIMEOUT_MS {
        return Err(ConfigError::Validation(format!(
            "request_timeout_ms must be >= {}ms, got {}ms",
            MIN_REQUEST_TIMEOUT_MS, config.request_timeout_ms
        )));
    }

    if config.page_size < 1 {
        return Err(ConfigError::Validation(
            "page_size must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    if config.formats.is_empty() {
        return Err(ConfigError::Validation(
            "at least one output format is required".to_string(),
        ));
    }

    Ok(())
}

fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    if !SITE_NAMES.contains(&config.name.as_str()) {
        return Err(ConfigError::Validation(format!(
            "unknown site '{}', expected one of: {}",
            config.name,
            SITE_NAMES.join(", ")
        )));
    }

    if let Some(base_url) = &config.base_url {
        let url = Url::parse(base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url '{}': {}", base_url, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "base-url '{}' must use http or https",
                base_url
            )));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
