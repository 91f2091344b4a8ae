//! Breadth-first crawl state machine
//!
//! A [`CrawlRun`] owns the frontier, the page inventory (whose index is the
//! visited set) and all counters for one crawl. Fetch tasks run on a
//! [`JoinSet`] and only hand their results back; every mutation happens in
//! the run loop.
//!
//! Completed fetches are committed in dispatch order. Dispatch order is
//! frontier order, so parent assignment, depth and `discovered_at` depend
//! only on the link graph, never on which response arrived first.

use chrono::Utc;
use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::crawler::fetcher::{FetchResult, PageFetcher};
use crate::crawler::links::{LinkExtractor, PageLinks};
use crate::crawler::url::{SitePolicy, UrlNormalizer};
use crate::models::{
    CrawlProgress, CrawlReport, CrawlStats, NetworkErrorKind, PageInventory, PageRecord,
    PageStatus, SkipReason, StopReason,
};
use crate::utils::error::{CrawlError, FetchError};

/// Page awaiting dispatch
#[derive(Debug, Clone)]
struct FrontierEntry {
    /// Position of the page's record in the inventory
    position: usize,
    url: Url,
    depth: usize,
}

/// What a fetch task hands back to the run loop
enum Completion {
    Fetched {
        result: FetchResult,
        links: Option<PageLinks>,
    },
    /// The task panicked; the page is recorded as a network failure
    Crashed,
}

/// Limits and collaborators for one run
pub(crate) struct RunSettings {
    pub fetcher: Arc<dyn PageFetcher>,
    pub normalizer: UrlNormalizer,
    pub extractor: LinkExtractor,
    pub policy: SitePolicy,
    pub max_in_flight: usize,
    pub max_pages: Option<usize>,
    pub deadline: Option<Duration>,
    pub cancel: watch::Receiver<bool>,
    pub progress: Arc<watch::Sender<CrawlProgress>>,
}

pub(crate) struct CrawlRun {
    settings: RunSettings,
    inventory: PageInventory,
    frontier: VecDeque<FrontierEntry>,
    /// Dispatched pages not yet committed, in dispatch order
    pending: VecDeque<usize>,
    /// Finished fetches waiting for earlier dispatches to commit
    finished: HashMap<usize, Completion>,
    /// Inventory position of every running fetch task
    task_positions: HashMap<task::Id, usize>,
    in_flight: usize,
    completed: usize,
    ceiling_hit: bool,
    stop: Option<StopReason>,
    external_links: usize,
}

impl CrawlRun {
    pub(crate) fn new(settings: RunSettings) -> Self {
        Self {
            settings,
            inventory: PageInventory::new(),
            frontier: VecDeque::new(),
            pending: VecDeque::new(),
            finished: HashMap::new(),
            task_positions: HashMap::new(),
            in_flight: 0,
            completed: 0,
            ceiling_hit: false,
            stop: None,
            external_links: 0,
        }
    }

    /// Crawl from `seed` (already normalized) until the frontier drains,
    /// the deadline passes or cancellation is requested
    pub(crate) async fn run(
        mut self,
        raw_seed: &str,
        seed: Url,
    ) -> Result<CrawlReport, CrawlError> {
        let started_at = Utc::now();
        let started = Instant::now();
        let deadline = self.settings.deadline.map(|d| started + d);
        let mut cancel_open = true;

        info!(
            seed = %seed,
            max_concurrent = self.settings.max_in_flight,
            max_pages = ?self.settings.max_pages,
            "Starting crawl"
        );

        self.admit_root(raw_seed, seed);

        let mut tasks = JoinSet::new();

        loop {
            if self.stop.is_none() && *self.settings.cancel.borrow() {
                self.halt(StopReason::Cancelled);
            }
            if self.stop.is_none() {
                self.dispatch(&mut tasks);
            }
            self.publish_progress();

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                changed = self.settings.cancel.changed(), if cancel_open && self.stop.is_none() => {
                    // the loop head reads the new value; a dropped sender just stops this branch
                    if changed.is_err() {
                        cancel_open = false;
                    }
                }

                () = wait_until(deadline), if self.stop.is_none() => {
                    self.halt(StopReason::Deadline);
                }

                joined = tasks.join_next_with_id() => {
                    if let Some(joined) = joined {
                        self.joined(joined);
                    }
                }
            }
        }

        // Only reachable if a task vanished without reporting back
        self.task_positions.clear();
        while let Some(position) = self.pending.pop_front() {
            let completion = self.finished.remove(&position).unwrap_or(Completion::Crashed);
            self.commit(position, completion);
        }
        self.publish_progress();

        self.into_report(raw_seed, started_at, started.elapsed())
    }

    fn admit_root(&mut self, raw_seed: &str, seed: Url) {
        let record = PageRecord {
            url: raw_seed.trim().to_string(),
            normalized_url: seed.to_string(),
            depth: 0,
            parent_url: None,
            status: PageStatus::Skipped(SkipReason::NotFetched),
            title: None,
            content_type: None,
            discovered_at: 0,
            children: Vec::new(),
            redirect_target: None,
            attempts: 0,
            anchor_text: None,
            analysis: None,
        };

        if let Some(position) = self.inventory.push(record) {
            self.frontier.push_back(FrontierEntry {
                position,
                url: seed,
                depth: 0,
            });
        }
    }

    /// Start fetches until the in-flight bound or the frontier runs out
    fn dispatch(&mut self, tasks: &mut JoinSet<Completion>) {
        while self.in_flight < self.settings.max_in_flight {
            let Some(entry) = self.frontier.pop_front() else {
                break;
            };

            debug!(url = %entry.url, depth = entry.depth, "Dispatching fetch");

            let fetcher = Arc::clone(&self.settings.fetcher);
            let extractor = self.settings.extractor;
            let FrontierEntry { position, url, .. } = entry;

            let handle = tasks.spawn(async move {
                let work = async {
                    let result = fetcher.fetch(&url).await;
                    let links = match &result.outcome {
                        Ok(page) => page
                            .body
                            .as_deref()
                            .map(|body| extractor.extract(body, &page.final_url)),
                        Err(_) => None,
                    };
                    Completion::Fetched { result, links }
                };

                AssertUnwindSafe(work)
                    .catch_unwind()
                    .await
                    .unwrap_or(Completion::Crashed)
            });

            self.task_positions.insert(handle.id(), position);
            self.pending.push_back(position);
            self.in_flight += 1;
        }
    }

    /// Route a joined task back to its page
    ///
    /// A task that was aborted or escaped `catch_unwind` still commits its
    /// page as crashed so later pages are not held behind it.
    fn joined(&mut self, joined: Result<(task::Id, Completion), JoinError>) {
        let (id, completion) = match joined {
            Ok((id, completion)) => (id, completion),
            Err(err) => {
                error!(error = %err, "Fetch task did not complete");
                (err.id(), Completion::Crashed)
            }
        };

        match self.task_positions.remove(&id) {
            Some(position) => self.finish(position, completion),
            None => self.in_flight = self.in_flight.saturating_sub(1),
        }
    }

    /// Park a finished fetch, then commit everything that is now in order
    fn finish(&mut self, position: usize, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.finished.insert(position, completion);

        while let Some(&front) = self.pending.front() {
            let Some(completion) = self.finished.remove(&front) else {
                break;
            };
            self.pending.pop_front();
            self.commit(front, completion);
        }
    }

    /// Record the terminal status of a page and enqueue what it links to
    fn commit(&mut self, position: usize, completion: Completion) {
        self.completed += 1;

        let mut discovered = None;
        let Some(record) = self.inventory.record_mut(position) else {
            return;
        };

        match completion {
            Completion::Crashed => {
                error!(url = %record.normalized_url, "Fetch task panicked");
                record.status = PageStatus::NetworkError(NetworkErrorKind::Other);
                record.attempts = record.attempts.max(1);
            }
            Completion::Fetched { result, links } => {
                record.attempts = result.attempts;
                match result.outcome {
                    Ok(page) => {
                        record.content_type = page.content_type.clone();
                        if page.was_redirected() {
                            record.redirect_target = Some(page.final_url.to_string());
                        }
                        if page.is_html() {
                            record.status = PageStatus::Success;
                            record.title = links.as_ref().and_then(|l| l.title.clone());
                            record.analysis = links.as_ref().map(|l| l.analysis.clone());
                            discovered = links;
                        } else {
                            record.status = PageStatus::Skipped(SkipReason::NonHtmlContent);
                        }
                    }
                    Err(err) => {
                        if let FetchError::ExternalRedirect(target) = &err {
                            record.redirect_target = Some(target.clone());
                        }
                        record.status = err.page_status();
                        warn!(
                            url = %record.normalized_url,
                            status = %record.status,
                            attempts = record.attempts,
                            error = %err,
                            "Page failed"
                        );
                    }
                }
            }
        }

        debug!(
            url = %record.normalized_url,
            status = %record.status,
            depth = record.depth,
            "Page completed"
        );

        if self.stop.is_none() {
            if let Some(links) = discovered {
                self.discover(position, links);
            }
        }
    }

    /// Normalize and filter the links of a page, admitting unseen same-site ones
    fn discover(&mut self, parent: usize, links: PageLinks) {
        let Some(parent_record) = self.inventory.records().get(parent) else {
            return;
        };
        let parent_key = parent_record.normalized_url.clone();
        let depth = parent_record.depth + 1;

        for link in links.links {
            let original = links
                .base
                .join(&link.href)
                .map(String::from)
                .unwrap_or_else(|_| link.href.clone());

            match self.settings.normalizer.normalize(&link.href, Some(&links.base)) {
                Ok(url) => {
                    if !self.settings.policy.is_same_site(&url) {
                        self.external_links += 1;
                        continue;
                    }
                    if self.inventory.contains(url.as_str()) {
                        continue;
                    }

                    let admission = if self.settings.normalizer.has_skipped_extension(&url) {
                        Admission::Record(SkipReason::ExcludedExtension)
                    } else {
                        Admission::Enqueue
                    };
                    self.admit(
                        url.to_string(),
                        Some(url),
                        original,
                        &parent_key,
                        depth,
                        link.text,
                        admission,
                    );
                }
                Err(err) => {
                    let Some(key) = self.skipped_key(&link.href, &links.base) else {
                        self.external_links += 1;
                        continue;
                    };
                    if self.inventory.contains(&key) {
                        continue;
                    }
                    debug!(href = %link.href, error = %err, "Recording unusable link");
                    let admission = Admission::Record(err.skip_reason());
                    self.admit(key, None, original, &parent_key, depth, link.text, admission);
                }
            }
        }
    }

    /// Dedup key for a link the normalizer rejected, or `None` if it points off-site
    fn skipped_key(&self, href: &str, base: &Url) -> Option<String> {
        match base.join(href.trim()) {
            Ok(mut url) => {
                url.set_fragment(None);
                match url.host_str() {
                    Some(host) if !host.eq_ignore_ascii_case(self.settings.policy.host()) => None,
                    _ => Some(url.to_string()),
                }
            }
            Err(_) => Some(href.trim().to_string()),
        }
    }

    /// Create a record under `parent_key`; returns false once the page ceiling is reached
    #[allow(clippy::too_many_arguments)]
    fn admit(
        &mut self,
        key: String,
        url: Option<Url>,
        original: String,
        parent_key: &str,
        depth: usize,
        anchor_text: Option<String>,
        admission: Admission,
    ) -> bool {
        if let Some(max) = self.settings.max_pages {
            if self.inventory.len() >= max {
                if !self.ceiling_hit {
                    warn!(max_pages = max, "Page ceiling reached, further discoveries dropped");
                }
                self.ceiling_hit = true;
                return false;
            }
        }

        let status = match admission {
            Admission::Enqueue => PageStatus::Skipped(SkipReason::NotFetched),
            Admission::Record(reason) => PageStatus::Skipped(reason),
        };

        let record = PageRecord {
            url: original,
            normalized_url: key.clone(),
            depth,
            parent_url: Some(parent_key.to_string()),
            status,
            title: None,
            content_type: None,
            discovered_at: self.inventory.len() as u64,
            children: Vec::new(),
            redirect_target: None,
            attempts: 0,
            anchor_text,
            analysis: None,
        };

        let Some(position) = self.inventory.push(record) else {
            return false;
        };

        if let Some(parent) = self
            .inventory
            .position(parent_key)
            .and_then(|p| self.inventory.record_mut(p))
        {
            parent.children.push(key);
        }

        if let (Admission::Enqueue, Some(url)) = (admission, url) {
            self.frontier.push_back(FrontierEntry {
                position,
                url,
                depth,
            });
        }
        true
    }

    /// Stop dispatching; queued pages stay `NotFetched`
    fn halt(&mut self, reason: StopReason) {
        info!(
            reason = ?reason,
            queued = self.frontier.len(),
            in_flight = self.in_flight,
            "Stopping crawl, waiting for in-flight fetches"
        );
        self.stop = Some(reason);
        self.frontier.clear();
    }

    fn publish_progress(&self) {
        self.settings.progress.send_replace(CrawlProgress {
            discovered: self.inventory.len(),
            completed: self.completed,
            in_flight: self.in_flight,
        });
    }

    fn into_report(
        self,
        raw_seed: &str,
        started_at: chrono::DateTime<Utc>,
        elapsed: Duration,
    ) -> Result<CrawlReport, CrawlError> {
        if let Some(root) = self.inventory.root() {
            if root.status.is_failure() {
                error!(url = %root.normalized_url, status = %root.status, "Seed could not be fetched");
                return Err(CrawlError::SeedUnreachable {
                    url: root.normalized_url.clone(),
                    reason: root.status.to_string(),
                });
            }
            if root.status == PageStatus::Skipped(SkipReason::ExternalRedirect) {
                let target = root.redirect_target.as_deref().unwrap_or("another host");
                error!(
                    url = %root.normalized_url,
                    target,
                    "Seed redirects off-site; use the redirect target as the seed"
                );
                return Err(CrawlError::SeedUnreachable {
                    url: root.normalized_url.clone(),
                    reason: format!("redirects off-site to {target}"),
                });
            }
        }

        let stop_reason = match self.stop {
            Some(reason) => reason,
            None if self.ceiling_hit => StopReason::PageLimit,
            None => StopReason::Exhausted,
        };
        let truncated = stop_reason != StopReason::Exhausted;

        let mut stats = CrawlStats::tally(&self.inventory);
        stats.external_links_ignored = self.external_links;
        stats.duration_ms = elapsed.as_millis() as u64;

        info!(
            pages = stats.pages_discovered,
            fetched = stats.pages_fetched,
            errors = stats.http_errors + stats.network_errors,
            truncated,
            stop_reason = ?stop_reason,
            duration_ms = stats.duration_ms,
            "Crawl finished"
        );

        Ok(CrawlReport {
            seed: raw_seed.trim().to_string(),
            started_at,
            truncated,
            stop_reason,
            stats,
            inventory: self.inventory,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Admission {
    /// Queue for fetching
    Enqueue,
    /// Record with a terminal skip status, never fetched
    Record(SkipReason),
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
