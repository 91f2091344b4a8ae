use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use sitemapper::config::Config;
use sitemapper::crawler::Crawler;
use sitemapper::export::export_report;
use sitemapper::models::{CrawlProgress, CrawlReport};

/// Page ceiling applied by `--test`
const TEST_PAGE_LIMIT: usize = 30;

/// Completed-page interval between progress log lines
const PROGRESS_EVERY: usize = 25;

#[derive(Args, Debug)]
pub struct MapArgs {
    /// Seed URL (https:// is assumed when no scheme is given)
    pub url: String,

    /// Maximum simultaneous fetches
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Requests per second
    #[arg(short, long)]
    pub rate: Option<f64>,

    /// Stop admitting pages after this many records
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Short test run capped at 30 pages
    #[arg(long, default_value = "false")]
    pub test: bool,

    /// Wall-clock deadline in seconds
    #[arg(long)]
    pub deadline: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// TOML configuration file (environment variables are used otherwise)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format (csv, json, both)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Site name replaced by the root marker in hierarchy labels
    #[arg(long)]
    pub site_prefix: Option<String>,

    /// Comma-separated extensions recorded but never fetched
    #[arg(long, value_delimiter = ',')]
    pub skip_ext: Vec<String>,

    /// Treat http and https as different sites
    #[arg(long, default_value = "false")]
    pub match_scheme: bool,

    /// Drop query strings when normalizing URLs
    #[arg(long, default_value = "false")]
    pub strip_query: bool,
}

impl MapArgs {
    /// Layer command-line flags over file or environment settings
    fn apply(&self, config: &mut Config) {
        let crawler = &mut config.crawler;
        if let Some(concurrency) = self.concurrency {
            crawler.max_concurrent = concurrency;
        }
        if let Some(rate) = self.rate {
            crawler.requests_per_second = rate;
        }
        if let Some(max_pages) = self.max_pages {
            crawler.max_pages = Some(max_pages);
        }
        if self.test {
            crawler.max_pages = Some(crawler.max_pages.map_or(TEST_PAGE_LIMIT, |n| {
                n.min(TEST_PAGE_LIMIT)
            }));
        }
        if let Some(deadline) = self.deadline {
            crawler.deadline_secs = Some(deadline);
        }
        if let Some(timeout) = self.timeout {
            crawler.request_timeout_secs = timeout;
        }
        if !self.skip_ext.is_empty() {
            crawler.skip_extensions = self.skip_ext.clone();
        }
        crawler.match_scheme |= self.match_scheme;
        crawler.strip_query |= self.strip_query;

        let export = &mut config.export;
        if let Some(output) = &self.output {
            export.output_dir = output.clone();
        }
        if let Some(format) = &self.format {
            export.format = format.to_lowercase();
        }
        if self.site_prefix.is_some() {
            export.site_prefix = self.site_prefix.clone();
        }
    }
}

pub async fn map(args: MapArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let seed = with_default_scheme(&args.url);

    println!("Mapping {seed}");
    println!("========================");
    println!("  Concurrency: {}", config.crawler.max_concurrent);
    println!("  Rate: {} req/s", config.crawler.requests_per_second);
    if let Some(max_pages) = config.crawler.max_pages {
        println!("  Max pages: {max_pages}");
    }
    if let Some(deadline) = config.crawler.deadline_secs {
        println!("  Deadline: {deadline}s");
    }

    let crawler = Crawler::new(config.crawler.clone())?;
    let progress = spawn_progress_logger(crawler.subscribe());

    let cancel = crawler.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight requests");
            cancel.cancel();
        }
    });

    let result = crawler.crawl(&seed).await;
    interrupt.abort();
    progress.abort();

    let report = result.with_context(|| format!("Failed to map {seed}"))?;
    let written = export_report(&report, &config.export).context("Failed to write inventory")?;

    print_summary(&report);
    for path in written {
        println!("  Written: {}", path.display());
    }

    Ok(())
}

fn with_default_scheme(url: &str) -> String {
    let url = url.trim();
    if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

fn spawn_progress_logger(mut progress: watch::Receiver<CrawlProgress>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_logged = 0;
        while progress.changed().await.is_ok() {
            let current = *progress.borrow_and_update();
            if current.completed >= last_logged + PROGRESS_EVERY {
                last_logged = current.completed;
                tracing::info!(
                    discovered = current.discovered,
                    completed = current.completed,
                    in_flight = current.in_flight,
                    "Crawl progress"
                );
            }
        }
    })
}

fn print_summary(report: &CrawlReport) {
    let stats = &report.stats;

    println!("\nCrawl Summary");
    println!("========================");
    println!("  Pages discovered: {}", stats.pages_discovered);
    println!("  Pages fetched: {}", stats.pages_fetched);
    println!("  Successful: {}", stats.successes);
    println!("  HTTP errors: {}", stats.http_errors);
    println!("  Network errors: {}", stats.network_errors);
    println!("  Skipped: {}", stats.skipped);
    println!("  External links ignored: {}", stats.external_links_ignored);
    println!("  Error rate: {:.1}%", stats.error_rate());
    println!("  Rate: {:.1} pages/min", stats.crawl_rate());
    println!("  Stopped: {:?}", report.stop_reason);
    if report.truncated {
        println!("  Inventory is partial");
    }
}
