//! Inventory export
//!
//! Turns a [`CrawlReport`] into a CSV table (one row per page, with a
//! "Root > Section > Page" hierarchy label) or a JSON document that can be
//! re-exported later.

use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use url::Url;

use crate::config::ExportConfig;
use crate::models::{CrawlReport, PageInventory, PageRecord};
use crate::utils::error::ExportError;
use crate::utils::sanitize_filename;

const SEPARATOR: &str = " > ";

/// Builds hierarchy labels from parent back-references
#[derive(Debug, Clone)]
pub struct HierarchyLabeler {
    site_prefix: Option<String>,
    root_marker: String,
}

impl HierarchyLabeler {
    pub fn new(root_marker: impl Into<String>) -> Self {
        Self {
            site_prefix: None,
            root_marker: root_marker.into(),
        }
    }

    /// Text replaced by the root marker wherever it appears in a segment
    #[must_use]
    pub fn with_site_prefix(mut self, site_prefix: Option<String>) -> Self {
        self.site_prefix = site_prefix
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        self
    }

    /// Labeler for `inventory`, defaulting the prefix to the detected site name
    pub fn from_config(config: &ExportConfig, inventory: &PageInventory) -> Self {
        let prefix = config.site_prefix.clone().or_else(|| inventory.site_name());
        Self::new(config.root_marker.clone()).with_site_prefix(prefix)
    }

    pub fn root_marker(&self) -> &str {
        &self.root_marker
    }

    /// Full label of `record`, root marker first
    pub fn label(&self, inventory: &PageInventory, record: &PageRecord) -> String {
        let mut segments: Vec<String> = Vec::new();
        for page in inventory.lineage(record) {
            let segment = if page.is_root() {
                self.root_marker.clone()
            } else {
                self.clean(&segment_text(page))
            };
            if segments.last() != Some(&segment) {
                segments.push(segment);
            }
        }
        segments.join(SEPARATOR)
    }

    /// Remove the site prefix from a segment; a segment that was only the
    /// prefix becomes the root marker
    fn clean(&self, segment: &str) -> String {
        let Some(prefix) = self.site_prefix.as_deref() else {
            return segment.to_string();
        };
        if !segment.contains(prefix) {
            return segment.to_string();
        }

        let stripped = segment.replace(prefix, "");
        let stripped = stripped.trim_matches(|c: char| c.is_whitespace() || c == '-' || c == '|');
        if stripped.is_empty() {
            self.root_marker.clone()
        } else {
            stripped.to_string()
        }
    }
}

/// Page title, else the discovering link's text, else the last path segment
fn segment_text(record: &PageRecord) -> String {
    if let Some(title) = record.title.as_deref().filter(|t| !t.is_empty()) {
        return title.to_string();
    }
    if let Some(text) = record.anchor_text.as_deref().filter(|t| !t.is_empty()) {
        return text.to_string();
    }

    Url::parse(&record.normalized_url)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| record.normalized_url.clone())
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    discovered_at: u64,
    url: &'a str,
    normalized_url: &'a str,
    depth: usize,
    parent_url: &'a str,
    status: String,
    http_status: Option<u16>,
    title: &'a str,
    content_type: &'a str,
    redirect_target: &'a str,
    attempts: u32,
    children: usize,
    file_links: Option<usize>,
    content_blocks: Option<usize>,
    attention: &'a str,
    layout: &'a str,
    sidebar_title: &'a str,
    breadcrumb: String,
    hierarchy: String,
}

/// Write one CSV row per page, in discovery order
pub fn write_csv<W: Write>(
    report: &CrawlReport,
    labeler: &HierarchyLabeler,
    writer: W,
) -> Result<(), ExportError> {
    let mut csv = csv::Writer::from_writer(writer);
    let inventory = &report.inventory;

    for record in inventory.iter() {
        let analysis = record.analysis.as_ref();
        csv.serialize(CsvRow {
            discovered_at: record.discovered_at,
            url: &record.url,
            normalized_url: &record.normalized_url,
            depth: record.depth,
            parent_url: record.parent_url.as_deref().unwrap_or_default(),
            status: record.status.to_string(),
            http_status: record.status.http_code(),
            title: record.title.as_deref().unwrap_or_default(),
            content_type: record.content_type.as_deref().unwrap_or_default(),
            redirect_target: record.redirect_target.as_deref().unwrap_or_default(),
            attempts: record.attempts,
            children: record.children.len(),
            file_links: analysis.map(|a| a.file_links),
            content_blocks: analysis.map(|a| a.content_blocks),
            attention: analysis
                .and_then(|a| a.attention)
                .map(|point| point.as_str())
                .unwrap_or_default(),
            layout: analysis.map(|a| a.layout.as_str()).unwrap_or_default(),
            sidebar_title: analysis
                .and_then(|a| a.sidebar_title.as_deref())
                .unwrap_or_default(),
            breadcrumb: analysis
                .map(|a| a.breadcrumb.join(SEPARATOR))
                .unwrap_or_default(),
            hierarchy: labeler.label(inventory, record),
        })?;
    }

    csv.flush()?;
    Ok(())
}

/// Serialize the full report as pretty-printed JSON
pub fn write_json<W: Write>(report: &CrawlReport, writer: W) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(writer, report)?;
    Ok(())
}

/// Load a report previously written with [`write_json`]
pub fn read_json<R: Read>(reader: R) -> Result<CrawlReport, ExportError> {
    Ok(serde_json::from_reader(reader)?)
}

pub fn read_json_file(path: &Path) -> Result<CrawlReport, ExportError> {
    read_json(BufReader::new(File::open(path)?))
}

/// Base file name for a report: `<host>_<timestamp>`
pub fn report_stem(report: &CrawlReport) -> String {
    let host = report
        .inventory
        .root()
        .and_then(|root| Url::parse(&root.normalized_url).ok())
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| String::from("site"));

    format!(
        "{}_{}",
        sanitize_filename(&host),
        report.started_at.format("%Y%m%d_%H%M%S")
    )
}

/// Write the report into `config.output_dir` in the configured format(s)
///
/// Returns the paths written.
pub fn export_report(
    report: &CrawlReport,
    config: &ExportConfig,
) -> Result<Vec<PathBuf>, ExportError> {
    fs::create_dir_all(&config.output_dir)?;
    let stem = report_stem(report);
    let mut written = Vec::new();

    if matches!(config.format.as_str(), "json" | "both") {
        let path = config.output_dir.join(format!("{stem}.json"));
        let mut file = BufWriter::new(File::create(&path)?);
        write_json(report, &mut file)?;
        file.flush()?;
        written.push(path);
    }

    if matches!(config.format.as_str(), "csv" | "both") {
        let path = config.output_dir.join(format!("{stem}.csv"));
        let labeler = HierarchyLabeler::from_config(config, &report.inventory);
        write_csv(report, &labeler, BufWriter::new(File::create(&path)?))?;
        written.push(path);
    }

    for path in &written {
        info!(path = %path.display(), pages = report.inventory.len(), "Inventory written");
    }

    Ok(written)
}
