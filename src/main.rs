use anyhow::Result;
use clap::{Parser, Subcommand};
use sitemapper::config::{Config, LoggingConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(
    name = "sitemapper",
    version,
    about = "Concurrent, rate-limited website mapper",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Map every page of a site reachable from a seed URL
    Map(commands::map::MapArgs),

    /// Re-export a saved JSON report as CSV
    Format {
        /// JSON report written by `map --format json`
        report: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Site name replaced by the root marker in hierarchy labels
        #[arg(long)]
        site_prefix: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    let logging = logging_config(&cli.command);
    setup_tracing(&logging, cli.log_format.as_deref(), cli.verbose)?;

    tracing::info!("sitemapper starting");

    match cli.command {
        Commands::Map(args) => {
            tracing::info!(
                url = %args.url,
                concurrency = ?args.concurrency,
                rate = ?args.rate,
                max_pages = ?args.max_pages,
                test = %args.test,
                "Starting map command"
            );
            commands::map(args).await?;
        }

        Commands::Format {
            report,
            output,
            site_prefix,
        } => {
            tracing::info!(
                report = %report.display(),
                output = %output.display(),
                site_prefix = ?site_prefix,
                "Starting format command"
            );
            commands::format(&report, output, site_prefix)?;
        }
    }

    tracing::info!("sitemapper completed successfully");
    Ok(())
}

/// Logging settings from the same source the command loads its config from
///
/// Load failures fall back to defaults here; the command reports them once
/// logging is up.
fn logging_config(command: &Commands) -> LoggingConfig {
    let loaded = match command {
        Commands::Map(args) => match &args.config {
            Some(path) => Config::from_file(path),
            None => Config::from_env(),
        },
        Commands::Format { .. } => Config::from_env(),
    };
    loaded.map(|config| config.logging).unwrap_or_default()
}

fn setup_tracing(logging: &LoggingConfig, format: Option<&str>, verbose: bool) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(logging.filter_directive(verbose))
    });

    match format.unwrap_or(logging.format.as_str()) {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
