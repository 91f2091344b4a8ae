//! Site crawling with rate limiting and bounded concurrency
//!
//! This module implements the breadth-first site mapper: URL normalization,
//! the rate limiter and concurrency gate, the HTTP fetcher, link extraction,
//! page analysis and the crawl engine that ties them together.

pub mod content;
pub mod engine;
pub mod fetcher;
pub mod limiter;
pub mod links;
pub mod url;

use std::sync::Arc;
use tokio::sync::watch;

use crate::config::CrawlerConfig;
use crate::models::{CrawlProgress, CrawlReport};
use crate::utils::error::CrawlError;

use self::engine::{CrawlRun, RunSettings};
use self::fetcher::{HttpFetcher, PageFetcher};
use self::limiter::{ConcurrencyGate, RateLimiter};
use self::links::LinkExtractor;
use self::url::{SitePolicy, UrlNormalizer};

/// Requests cooperative cancellation of a running crawl
///
/// Cancelling stops new dispatches; in-flight fetches finish and the crawl
/// still returns its partial inventory. A cancelled crawler stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Main crawler structure
pub struct Crawler {
    /// Configuration
    config: CrawlerConfig,

    /// Rate limiter shared by every fetch
    limiter: RateLimiter,

    /// Concurrency gate shared by every fetch
    gate: ConcurrencyGate,

    /// Fetcher override; the HTTP fetcher is built per crawl otherwise
    fetcher: Option<Arc<dyn PageFetcher>>,

    normalizer: UrlNormalizer,

    cancel: Arc<watch::Sender<bool>>,

    progress: Arc<watch::Sender<CrawlProgress>>,
}

impl Crawler {
    /// Create a new crawler instance
    ///
    /// # Errors
    ///
    /// Returns `CrawlError::Config` for invalid settings and `CrawlError::Gate`
    /// when the concurrency gate cannot be allocated
    pub fn new(config: CrawlerConfig) -> Result<Self, CrawlError> {
        config
            .validate()
            .map_err(|e| CrawlError::Config(format!("{e:#}")))?;

        let limiter = RateLimiter::new(config.requests_per_second)?;
        let gate = ConcurrencyGate::new(config.max_concurrent)?;
        let normalizer = UrlNormalizer::from_config(&config);
        let (cancel, _) = watch::channel(false);
        let (progress, _) = watch::channel(CrawlProgress::default());

        Ok(Self {
            config,
            limiter,
            gate,
            fetcher: None,
            normalizer,
            cancel: Arc::new(cancel),
            progress: Arc::new(progress),
        })
    }

    /// Create a crawler that retrieves pages through `fetcher`
    pub fn with_fetcher(
        config: CrawlerConfig,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Result<Self, CrawlError> {
        let mut crawler = Self::new(config)?;
        crawler.fetcher = Some(fetcher);
        Ok(crawler)
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// Receive progress counters; advisory only
    pub fn subscribe(&self) -> watch::Receiver<CrawlProgress> {
        self.progress.subscribe()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            sender: Arc::clone(&self.cancel),
        }
    }

    /// Map the site reachable from `seed`
    ///
    /// # Errors
    ///
    /// - `CrawlError::InvalidSeed` when the seed is empty or not an http(s) URL
    /// - `CrawlError::SeedUnreachable` when the seed page itself fails
    pub async fn crawl(&self, seed: &str) -> Result<CrawlReport, CrawlError> {
        let root = self.normalizer.normalize(seed, None)?;
        let policy = SitePolicy::from_root(&root, self.config.match_scheme);

        let fetcher: Arc<dyn PageFetcher> = match &self.fetcher {
            Some(fetcher) => Arc::clone(fetcher),
            None => Arc::new(
                HttpFetcher::new(&self.config, self.limiter.clone(), self.gate.clone())?
                    .with_scope(policy.clone()),
            ),
        };

        let settings = RunSettings {
            fetcher,
            normalizer: self.normalizer.clone(),
            extractor: LinkExtractor::new(),
            policy,
            max_in_flight: self.gate.capacity(),
            max_pages: self.config.max_pages,
            deadline: self.config.deadline(),
            cancel: self.cancel.subscribe(),
            progress: Arc::clone(&self.progress),
        };

        CrawlRun::new(settings).run(seed, root).await
    }
}
