//! sitemapper - Concurrent, rate-limited website mapper
//!
//! Starting from a seed URL, sitemapper walks every same-site page
//! breadth-first and produces an inventory of pages with their depth,
//! parent, status and title, ready to export as CSV or JSON.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`crawler`] - URL normalization, rate limiting, fetching, page analysis
//!   and the crawl engine
//! - [`models`] - Page records, inventory and crawl report types
//! - [`export`] - CSV/JSON export with hierarchy labels
//! - [`utils`] - Errors, retry policy and text helpers
//!
//! # Example
//!
//! ```no_run
//! use sitemapper::config::Config;
//! use sitemapper::crawler::Crawler;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let crawler = Crawler::new(config.crawler)?;
//!     let report = crawler.crawl("https://example.com/").await?;
//!     println!("{} pages", report.inventory.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod export;
pub mod models;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::fetcher::{FetchResult, FetchedPage, PageFetcher};
    pub use crate::crawler::{CancelHandle, Crawler};
    pub use crate::export::HierarchyLabeler;
    pub use crate::models::{
        AttentionPoint, CrawlProgress, CrawlReport, CrawlStats, PageAnalysis, PageInventory,
        PageLayout, PageRecord, PageStatus, StopReason,
    };
    pub use crate::utils::error::{CrawlError, ExportError, FetchError, UrlError};
}

// Direct re-exports for convenience
pub use models::{CrawlReport, CrawlStats, PageInventory, PageRecord, PageStatus};
