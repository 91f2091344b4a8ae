//! Configuration management for the site mapper
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Command-line flags are layered on top by the
//! binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::crawler::limiter::replenish_period;
use crate::utils::retry::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Crawler configuration
    pub crawler: CrawlerConfig,

    /// Export configuration
    pub export: ExportConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Crawler-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum number of simultaneously in-flight fetches
    pub max_concurrent: usize,

    /// Rate limit (requests per second)
    pub requests_per_second: f64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Retries after the first attempt for transient failures
    pub max_retries: u32,

    /// Base delay for exponential backoff
    pub retry_base_delay_ms: u64,

    /// Cap for exponential backoff
    pub retry_max_delay_ms: u64,

    /// Upper bound of random jitter added to backoff delays
    pub retry_jitter_ms: u64,

    /// Redirect hops followed before giving up
    pub max_redirects: usize,

    /// Page-count ceiling (bounded/test runs)
    pub max_pages: Option<usize>,

    /// Wall-clock deadline for the whole crawl, in seconds
    pub deadline_secs: Option<u64>,

    /// User agent string
    pub user_agent: String,

    /// Require links to share the seed's scheme family to count as same-site
    pub match_scheme: bool,

    /// Drop query strings during normalization
    pub strip_query: bool,

    /// Path extensions recorded but never fetched (e.g. "pdf", "jpg")
    pub skip_extensions: Vec<String>,
}

/// Export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory where inventories are written
    pub output_dir: PathBuf,

    /// Output format (csv, json, both)
    pub format: String,

    /// Site name replaced by the root marker in hierarchy labels
    pub site_prefix: Option<String>,

    /// Label used for the root of every hierarchy path
    pub root_marker: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let max_concurrent =
            env_parse("SITEMAPPER_MAX_CONCURRENT").unwrap_or(defaults.crawler.max_concurrent);

        let requests_per_second =
            env_parse("SITEMAPPER_RATE_LIMIT").unwrap_or(defaults.crawler.requests_per_second);

        let request_timeout_secs = env_parse("SITEMAPPER_REQUEST_TIMEOUT")
            .unwrap_or(defaults.crawler.request_timeout_secs);

        let max_retries =
            env_parse("SITEMAPPER_MAX_RETRIES").unwrap_or(defaults.crawler.max_retries);

        let max_pages = env_parse("SITEMAPPER_MAX_PAGES");

        let deadline_secs = env_parse("SITEMAPPER_DEADLINE");

        let user_agent = std::env::var("SITEMAPPER_USER_AGENT")
            .unwrap_or_else(|_| defaults.crawler.user_agent.clone());

        let output_dir = std::env::var("SITEMAPPER_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| defaults.export.output_dir.clone());

        let log_level =
            std::env::var("SITEMAPPER_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));

        let log_format =
            std::env::var("SITEMAPPER_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        Ok(Self {
            crawler: CrawlerConfig {
                max_concurrent,
                requests_per_second,
                request_timeout_secs,
                max_retries,
                max_pages,
                deadline_secs,
                user_agent,
                ..defaults.crawler
            },
            export: ExportConfig {
                output_dir,
                ..defaults.export
            },
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.crawler.validate()?;

        match self.export.format.as_str() {
            "csv" | "json" | "both" => {}
            other => anyhow::bail!("export format must be csv, json or both (got {other})"),
        }

        self.logging.validate()?;

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.crawler.request_timeout()
    }
}

impl CrawlerConfig {
    /// Validate crawler settings
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            anyhow::bail!("max_concurrent must be greater than 0");
        }

        if !self.requests_per_second.is_finite() || self.requests_per_second <= 0.0 {
            anyhow::bail!("requests_per_second must be positive");
        }

        if replenish_period(self.requests_per_second).is_none() {
            anyhow::bail!(
                "requests_per_second {} is too low",
                self.requests_per_second
            );
        }

        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        if self.max_redirects == 0 {
            anyhow::bail!("max_redirects must be greater than 0");
        }

        if self.max_pages == Some(0) {
            anyhow::bail!("max_pages must be greater than 0 when set");
        }

        Ok(())
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    /// Backoff policy for transient fetch failures
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay_ms: self.retry_base_delay_ms,
            max_delay_ms: self.retry_max_delay_ms,
            backoff_multiplier: 2.0,
            jitter_ms: self.retry_jitter_ms,
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            requests_per_second: 5.0,
            request_timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 10_000,
            retry_jitter_ms: 250,
            max_redirects: 5,
            max_pages: None,
            deadline_secs: None,
            user_agent: format!("sitemapper/{}", env!("CARGO_PKG_VERSION")),
            match_scheme: false,
            strip_query: false,
            skip_extensions: Vec::new(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            format: String::from("csv"),
            site_prefix: None,
            root_marker: String::from("Root"),
        }
    }
}

impl LoggingConfig {
    const LEVELS: [&'static str; 5] = ["trace", "debug", "info", "warn", "error"];

    /// Validate level and format names
    pub fn validate(&self) -> Result<()> {
        if !Self::LEVELS.contains(&self.level.to_ascii_lowercase().as_str()) {
            anyhow::bail!(
                "log level must be one of {} (got {})",
                Self::LEVELS.join(", "),
                self.level
            );
        }
        match self.format.as_str() {
            "text" | "json" => Ok(()),
            other => anyhow::bail!("log format must be text or json (got {other})"),
        }
    }

    /// Filter directive used when `RUST_LOG` is unset
    ///
    /// The crate logs at the configured level and dependencies at `warn`;
    /// `verbose` raises the crate to `debug` and dependencies to `info`.
    /// Unknown levels fall back to `info`.
    #[must_use]
    pub fn filter_directive(&self, verbose: bool) -> String {
        if verbose {
            return String::from("sitemapper=debug,info");
        }
        let level = self.level.to_ascii_lowercase();
        let level = if Self::LEVELS.contains(&level.as_str()) {
            level
        } else {
            String::from("info")
        };
        format!("sitemapper={level},warn")
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}
