//! Error types for the site mapper
//!
//! This module defines the domain error types used throughout the crawler.

use crate::models::{NetworkErrorKind, PageStatus, SkipReason};
use thiserror::Error;

/// Errors produced while normalizing a raw link
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    /// Raw link was empty or whitespace
    #[error("Empty URL")]
    Empty,

    /// Raw link is not a well-formed absolute or relative URL
    #[error("Invalid URL: {0}")]
    Invalid(String),

    /// Scheme other than http/https
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// http(s) URL without a host
    #[error("URL has no host: {0}")]
    MissingHost(String),
}

impl UrlError {
    /// Skip reason recorded for a link rejected with this error
    pub fn skip_reason(&self) -> SkipReason {
        match self {
            Self::UnsupportedScheme(_) => SkipReason::UnsupportedScheme,
            _ => SkipReason::Invalid,
        }
    }
}

/// Errors that can occur during HTTP fetching operations
#[derive(Error, Debug)]
pub enum FetchError {
    /// Non-success, non-redirect status code
    #[error("HTTP status {0}")]
    Status(u16),

    /// Request timed out
    #[error("Request timeout")]
    Timeout,

    /// Could not connect to the host
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Redirect chain longer than the hop limit
    #[error("Too many redirects ({hops} hops)")]
    RedirectLoop { hops: usize },

    /// Redirect without a usable Location header
    #[error("Invalid redirect: {0}")]
    InvalidRedirect(String),

    /// Redirect pointing outside the crawled site
    #[error("Redirect leaves the site: {0}")]
    ExternalRedirect(String),

    /// Other HTTP client failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Concurrency gate was closed while waiting for a slot
    #[error("Concurrency gate closed")]
    GateClosed,
}

impl FetchError {
    /// Classify a reqwest error into timeout, connect or generic failure
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Http(err)
        }
    }

    /// Whether another attempt may succeed
    ///
    /// 5xx, timeouts and transport failures are transient. 4xx and redirect
    /// problems are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status(code) => *code >= 500,
            Self::Timeout | Self::Connect(_) | Self::Http(_) => true,
            Self::RedirectLoop { .. }
            | Self::InvalidRedirect(_)
            | Self::ExternalRedirect(_)
            | Self::GateClosed => false,
        }
    }

    /// Terminal page status recorded for a fetch that ended with this error
    pub fn page_status(&self) -> PageStatus {
        match self {
            Self::Status(code) => PageStatus::HttpError(*code),
            Self::Timeout => PageStatus::NetworkError(NetworkErrorKind::Timeout),
            Self::Connect(_) => PageStatus::NetworkError(NetworkErrorKind::Connection),
            Self::RedirectLoop { .. } => PageStatus::NetworkError(NetworkErrorKind::RedirectLoop),
            Self::InvalidRedirect(_) => {
                PageStatus::NetworkError(NetworkErrorKind::InvalidRedirect)
            }
            Self::ExternalRedirect(_) => PageStatus::Skipped(SkipReason::ExternalRedirect),
            Self::Http(_) | Self::GateClosed => {
                PageStatus::NetworkError(NetworkErrorKind::Other)
            }
        }
    }
}

/// Errors that end a crawl before it produces an inventory
#[derive(Error, Debug)]
pub enum CrawlError {
    /// Invalid crawler settings
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Seed URL could not be normalized
    #[error("Invalid seed URL: {0}")]
    InvalidSeed(#[from] UrlError),

    /// Seed page could not be fetched after retries
    #[error("Seed URL {url} could not be fetched: {reason}")]
    SeedUnreachable { url: String, reason: String },

    /// HTTP client could not be built
    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    /// Concurrency gate could not be allocated
    #[error("Failed to allocate concurrency gate: {0}")]
    Gate(String),
}

/// Errors raised while writing or reading exported inventories
#[derive(Error, Debug)]
pub enum ExportError {
    /// File system error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_retry_classification() {
        assert!(FetchError::Status(500).is_retryable());
        assert!(FetchError::Status(503).is_retryable());
        assert!(!FetchError::Status(404).is_retryable());
        assert!(!FetchError::Status(429).is_retryable());
        assert!(FetchError::Timeout.is_retryable());
        assert!(!FetchError::RedirectLoop { hops: 5 }.is_retryable());
    }

    #[test]
    fn test_page_status_mapping() {
        assert_eq!(FetchError::Status(404).page_status(), PageStatus::HttpError(404));
        // a 5xx that outlives its retries keeps its code
        assert_eq!(FetchError::Status(503).page_status(), PageStatus::HttpError(503));
        assert_eq!(
            FetchError::Timeout.page_status(),
            PageStatus::NetworkError(NetworkErrorKind::Timeout)
        );
        assert_eq!(
            FetchError::RedirectLoop { hops: 5 }.page_status(),
            PageStatus::NetworkError(NetworkErrorKind::RedirectLoop)
        );
        assert_eq!(
            FetchError::ExternalRedirect("https://other.test/".into()).page_status(),
            PageStatus::Skipped(SkipReason::ExternalRedirect)
        );
    }

    #[test]
    fn test_url_error_skip_reason() {
        assert_eq!(
            UrlError::UnsupportedScheme("ftp".into()).skip_reason(),
            SkipReason::UnsupportedScheme
        );
        assert_eq!(UrlError::Invalid("::".into()).skip_reason(), SkipReason::Invalid);
    }
}
