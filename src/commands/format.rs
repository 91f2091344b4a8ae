use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use sitemapper::config::ExportConfig;
use sitemapper::export::{export_report, read_json_file};

/// Re-export a saved JSON report as CSV
pub fn format(report_path: &Path, output: PathBuf, site_prefix: Option<String>) -> Result<()> {
    let report = read_json_file(report_path)
        .with_context(|| format!("Failed to read report: {}", report_path.display()))?;

    println!(
        "Formatting {} ({} pages)",
        report.seed,
        report.inventory.len()
    );

    let export = ExportConfig {
        output_dir: output,
        format: String::from("csv"),
        site_prefix,
        ..Default::default()
    };

    for path in export_report(&report, &export)? {
        println!("  Written: {}", path.display());
    }

    Ok(())
}
