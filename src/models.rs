// Core data structures for the site mapper

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Why a page was recorded without being crawled further
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Link used a scheme other than http/https
    UnsupportedScheme,
    /// Link could not be parsed as a URL
    Invalid,
    /// Page answered 2xx with a non-HTML content type
    NonHtmlContent,
    /// Path ends with an extension from the skip list
    ExcludedExtension,
    /// Redirect chain left the site
    ExternalRedirect,
    /// Queued but never dispatched (deadline or cancellation)
    NotFetched,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedScheme => "unsupported_scheme",
            Self::Invalid => "invalid",
            Self::NonHtmlContent => "non_html_content",
            Self::ExcludedExtension => "excluded_extension",
            Self::ExternalRedirect => "external_redirect",
            Self::NotFetched => "not_fetched",
        }
    }
}

/// Transport-level failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkErrorKind {
    Timeout,
    Connection,
    RedirectLoop,
    InvalidRedirect,
    Other,
}

impl NetworkErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::RedirectLoop => "redirect_loop",
            Self::InvalidRedirect => "invalid_redirect",
            Self::Other => "other",
        }
    }
}

/// Terminal status of a page record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PageStatus {
    Success,
    HttpError(u16),
    NetworkError(NetworkErrorKind),
    Skipped(SkipReason),
}

impl PageStatus {
    /// Short machine-readable label used in tabular output
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::HttpError(_) => "http_error",
            Self::NetworkError(_) => "network_error",
            Self::Skipped(_) => "skipped",
        }
    }

    /// HTTP status code, if the status carries one
    pub fn http_code(&self) -> Option<u16> {
        match self {
            Self::HttpError(code) => Some(*code),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// True for statuses that mean the page could not be retrieved
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::HttpError(_) | Self::NetworkError(_))
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::HttpError(code) => write!(f, "http_error({code})"),
            Self::NetworkError(kind) => write!(f, "network_error({})", kind.as_str()),
            Self::Skipped(reason) => write!(f, "skipped({})", reason.as_str()),
        }
    }
}

/// Page feature that needs special handling when the page is migrated
///
/// Only the first match is reported, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionPoint {
    Collapsible,
    Tabs,
    Form,
    /// More than two tables
    ComplexTables,
}

impl AttentionPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collapsible => "collapsible",
            Self::Tabs => "tabs",
            Self::Form => "form",
            Self::ComplexTables => "complex_tables",
        }
    }
}

/// Column layout of a page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageLayout {
    #[default]
    SingleColumn,
    /// Side menu next to the content (30/70 split)
    Sidebar,
}

impl PageLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleColumn => "single_column",
            Self::Sidebar => "sidebar",
        }
    }
}

/// Structure of a fetched HTML page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageAnalysis {
    /// Same-host links to downloadable files inside the main content
    pub file_links: usize,
    /// Sections, widgets and other content containers, capped at 20
    pub content_blocks: usize,
    pub attention: Option<AttentionPoint>,
    pub layout: PageLayout,
    /// Heading of the side menu, when there is one
    pub sidebar_title: Option<String>,
    /// Breadcrumb entries below the home page, ending with this page
    pub breadcrumb: Vec<String>,
}

/// One page visited or attempted during a crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    /// URL as first discovered (resolved, before normalization)
    pub url: String,
    /// Deduplication key
    pub normalized_url: String,
    /// Distance from the root page (root = 0)
    pub depth: usize,
    /// Normalized URL of the page that first linked here
    pub parent_url: Option<String>,
    pub status: PageStatus,
    pub title: Option<String>,
    pub content_type: Option<String>,
    /// Enqueue sequence index
    pub discovered_at: u64,
    /// Normalized URLs whose parent is this page, in discovery order
    #[serde(default)]
    pub children: Vec<String>,
    /// Final URL when the fetch was redirected
    #[serde(default)]
    pub redirect_target: Option<String>,
    /// Number of request attempts made for this page
    #[serde(default)]
    pub attempts: u32,
    /// Text of the first link that led to this page
    #[serde(default)]
    pub anchor_text: Option<String>,
    /// Content analysis, present for pages fetched as HTML
    #[serde(default)]
    pub analysis: Option<PageAnalysis>,
}

impl PageRecord {
    pub fn is_root(&self) -> bool {
        self.parent_url.is_none()
    }
}

/// Ordered collection of page records indexed by normalized URL
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<PageRecord>", into = "Vec<PageRecord>")]
pub struct PageInventory {
    records: Vec<PageRecord>,
    index: HashMap<String, usize>,
}

impl PageInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, normalized_url: &str) -> bool {
        self.index.contains_key(normalized_url)
    }

    pub fn get(&self, normalized_url: &str) -> Option<&PageRecord> {
        self.index.get(normalized_url).map(|&i| &self.records[i])
    }

    /// First record, which is always the crawl root
    pub fn root(&self) -> Option<&PageRecord> {
        self.records.first()
    }

    pub fn records(&self) -> &[PageRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageRecord> {
        self.records.iter()
    }

    /// Append a record, returning its position.
    ///
    /// Returns `None` when the normalized URL is already present.
    pub(crate) fn push(&mut self, record: PageRecord) -> Option<usize> {
        if self.index.contains_key(&record.normalized_url) {
            return None;
        }
        let position = self.records.len();
        self.index.insert(record.normalized_url.clone(), position);
        self.records.push(record);
        Some(position)
    }

    pub(crate) fn record_mut(&mut self, position: usize) -> Option<&mut PageRecord> {
        self.records.get_mut(position)
    }

    pub(crate) fn position(&self, normalized_url: &str) -> Option<usize> {
        self.index.get(normalized_url).copied()
    }

    pub fn parent_of(&self, record: &PageRecord) -> Option<&PageRecord> {
        record.parent_url.as_deref().and_then(|p| self.get(p))
    }

    /// Chain of records from the root down to `record` (inclusive)
    pub fn lineage<'a>(&'a self, record: &'a PageRecord) -> Vec<&'a PageRecord> {
        let mut chain = vec![record];
        let mut current = record;
        while let Some(parent) = self.parent_of(current) {
            if chain.len() > self.records.len() {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }

    /// Site name derived from the root title, without " - Suffix" or " | Suffix"
    pub fn site_name(&self) -> Option<String> {
        static SUFFIX_RE: OnceLock<Regex> = OnceLock::new();

        let title = self.root()?.title.as_deref()?;
        let re = SUFFIX_RE.get_or_init(|| Regex::new(r"\s*[-|]\s*.*$").expect("Invalid regex pattern"));

        let stripped = re.replace(title, "");
        let name = stripped.trim();
        if name.is_empty() {
            Some(title.trim().to_string())
        } else {
            Some(name.to_string())
        }
    }
}

impl From<Vec<PageRecord>> for PageInventory {
    fn from(records: Vec<PageRecord>) -> Self {
        let index = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.normalized_url.clone(), i))
            .collect();
        Self { records, index }
    }
}

impl From<PageInventory> for Vec<PageRecord> {
    fn from(inventory: PageInventory) -> Self {
        inventory.records
    }
}

/// Why a crawl stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Frontier drained with nothing in flight
    Exhausted,
    /// Page ceiling reached
    PageLimit,
    /// Wall-clock deadline passed
    Deadline,
    /// Cancellation requested
    Cancelled,
}

/// Live crawl counters published to progress subscribers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrawlProgress {
    pub discovered: usize,
    pub completed: usize,
    pub in_flight: usize,
}

/// Crawl statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlStats {
    pub pages_discovered: usize,
    pub pages_fetched: usize,
    pub successes: usize,
    pub http_errors: usize,
    pub network_errors: usize,
    pub skipped: usize,
    pub external_links_ignored: usize,
    pub duration_ms: u64,
}

impl CrawlStats {
    /// Count statuses across an inventory
    pub fn tally(inventory: &PageInventory) -> Self {
        let mut stats = Self {
            pages_discovered: inventory.len(),
            ..Default::default()
        };
        for record in inventory.iter() {
            if record.attempts > 0 {
                stats.pages_fetched += 1;
            }
            match record.status {
                PageStatus::Success => stats.successes += 1,
                PageStatus::HttpError(_) => stats.http_errors += 1,
                PageStatus::NetworkError(_) => stats.network_errors += 1,
                PageStatus::Skipped(_) => stats.skipped += 1,
            }
        }
        stats
    }

    /// Calculate error rate as percentage of fetched pages
    pub fn error_rate(&self) -> f64 {
        if self.pages_fetched == 0 {
            0.0
        } else {
            ((self.http_errors + self.network_errors) as f64 / self.pages_fetched as f64) * 100.0
        }
    }

    /// Calculate crawl rate (pages per minute)
    pub fn crawl_rate(&self) -> f64 {
        if self.duration_ms == 0 {
            0.0
        } else {
            (self.pages_fetched as f64 / self.duration_ms as f64) * 60_000.0
        }
    }
}

/// Result of one crawl: the page inventory plus how the run ended
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    pub seed: String,
    pub started_at: DateTime<Utc>,
    pub truncated: bool,
    pub stop_reason: StopReason,
    pub stats: CrawlStats,
    pub inventory: PageInventory,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(normalized: &str, parent: Option<&str>, depth: usize, seq: u64) -> PageRecord {
        PageRecord {
            url: normalized.to_string(),
            normalized_url: normalized.to_string(),
            depth,
            parent_url: parent.map(str::to_string),
            status: PageStatus::Success,
            title: None,
            content_type: Some("text/html".to_string()),
            discovered_at: seq,
            children: Vec::new(),
            redirect_target: None,
            attempts: 1,
            anchor_text: None,
            analysis: None,
        }
    }

    #[test]
    fn test_push_rejects_duplicate_key() {
        let mut inventory = PageInventory::new();
        assert_eq!(inventory.push(record("https://a.test/", None, 0, 0)), Some(0));
        assert_eq!(inventory.push(record("https://a.test/", None, 0, 1)), None);
        assert_eq!(inventory.len(), 1);
    }

    #[test]
    fn test_lineage_walks_to_root() {
        let mut inventory = PageInventory::new();
        inventory.push(record("https://a.test/", None, 0, 0));
        inventory.push(record("https://a.test/x", Some("https://a.test/"), 1, 1));
        inventory.push(record("https://a.test/x/y", Some("https://a.test/x"), 2, 2));

        let leaf = inventory.get("https://a.test/x/y").unwrap();
        let chain: Vec<_> = inventory
            .lineage(leaf)
            .iter()
            .map(|r| r.normalized_url.as_str())
            .collect();
        assert_eq!(chain, vec!["https://a.test/", "https://a.test/x", "https://a.test/x/y"]);
    }

    #[test]
    fn test_site_name_strips_suffix() {
        let mut root = record("https://a.test/", None, 0, 0);
        root.title = Some("Secretaria de Economia - Governo do Estado".to_string());
        let inventory = PageInventory::from(vec![root]);
        assert_eq!(inventory.site_name().as_deref(), Some("Secretaria de Economia"));

        let mut root = record("https://a.test/", None, 0, 0);
        root.title = Some("Portal | Home".to_string());
        let inventory = PageInventory::from(vec![root]);
        assert_eq!(inventory.site_name().as_deref(), Some("Portal"));
    }

    #[test]
    fn test_site_name_missing_title() {
        let inventory = PageInventory::from(vec![record("https://a.test/", None, 0, 0)]);
        assert!(inventory.site_name().is_none());
    }

    #[test]
    fn test_inventory_serde_rebuilds_index() {
        let inventory = PageInventory::from(vec![
            record("https://a.test/", None, 0, 0),
            record("https://a.test/b", Some("https://a.test/"), 1, 1),
        ]);
        let json = serde_json::to_string(&inventory).unwrap();
        let back: PageInventory = serde_json::from_str(&json).unwrap();
        assert!(back.contains("https://a.test/b"));
        assert_eq!(back.root().unwrap().normalized_url, "https://a.test/");
    }

    #[test]
    fn test_status_serialization_shape() {
        let json = serde_json::to_string(&PageStatus::HttpError(404)).unwrap();
        assert_eq!(json, r#"{"kind":"http_error","detail":404}"#);
        let json = serde_json::to_string(&PageStatus::Success).unwrap();
        assert_eq!(json, r#"{"kind":"success"}"#);
    }

    #[test]
    fn test_stats_tally_and_error_rate() {
        let mut failed = record("https://a.test/f", Some("https://a.test/"), 1, 1);
        failed.status = PageStatus::HttpError(500);
        let mut skipped = record("https://a.test/s", Some("https://a.test/"), 1, 2);
        skipped.status = PageStatus::Skipped(SkipReason::NotFetched);
        skipped.attempts = 0;

        let inventory =
            PageInventory::from(vec![record("https://a.test/", None, 0, 0), failed, skipped]);
        let stats = CrawlStats::tally(&inventory);
        assert_eq!(stats.pages_discovered, 3);
        assert_eq!(stats.pages_fetched, 2);
        assert_eq!(stats.http_errors, 1);
        assert_eq!(stats.skipped, 1);
        assert!((stats.error_rate() - 50.0).abs() < f64::EPSILON);
    }
}
