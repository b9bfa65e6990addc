//! CLI entry point for the PNAD unemployment pipeline.
//!
//! Provides subcommands to fetch the quarterly series into the raw history
//! table, rebuild the derived tables and CSV export from it, do both in one
//! go, and verify the persisted final table.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use pnad_pipeline::{
    config::PipelineConfig,
    error::PipelineError,
    fetch::{BasicClient, fetch_table},
    normalize::{FIELD_MAPPING, validate_mapping},
    output::print_json,
    parser::parse_table,
    pipeline,
    records::RawTable,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "pnad_pipeline")]
#[command(about = "Builds an analytics-ready quarterly unemployment dataset", long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// JSON config file; missing keys use built-in defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides config)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// CSV export path (overrides config)
    #[arg(long, global = true)]
    export: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the series, then rebuild every table and the CSV export
    Run {
        /// URL or local JSON file (defaults to the configured source URL)
        #[arg(value_name = "FILE_OR_URL")]
        source: Option<String>,
    },
    /// Fetch the series and replace the raw history table only
    Extract {
        /// URL or local JSON file (defaults to the configured source URL)
        #[arg(value_name = "FILE_OR_URL")]
        source: Option<String>,
    },
    /// Rebuild normalized and derived tables and the CSV from raw history
    Transform,
    /// Summarize the persisted final table
    Verify {
        /// Also log the summary as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/pnad_pipeline.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("pnad_pipeline.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.common)?;
    validate_mapping(FIELD_MAPPING).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Run { source } => {
            let source = source.unwrap_or_else(|| config.source_url.clone());
            let Some(raw) = no_data_is_ok(fetcher(&source).await)? else {
                return Ok(());
            };
            if no_data_is_ok(pipeline::run(&config, &raw))?.is_some() {
                info!(export = %config.export_path.display(), "Pipeline finished");
            }
        }
        Commands::Extract { source } => {
            let source = source.unwrap_or_else(|| config.source_url.clone());
            let Some(raw) = no_data_is_ok(fetcher(&source).await)? else {
                return Ok(());
            };
            if no_data_is_ok(pipeline::store_raw(&config, &raw))?.is_some() {
                info!(rows = raw.len(), table = %config.tables.raw, "Raw history saved");
            }
        }
        Commands::Transform => {
            pipeline::transform_stored(&config)?;
        }
        Commands::Verify { json } => {
            let summary = pipeline::verify(&config)?;
            for (year, count) in &summary.rows_per_year {
                info!(year, count, "Periods per year");
            }
            let incomplete = summary.incomplete_years();
            if !incomplete.is_empty() {
                warn!(?incomplete, "Years with fewer than four quarters");
            }
            if json {
                print_json(&summary)?;
            }
        }
    }

    Ok(())
}

/// Config file (if any) with CLI overrides applied.
fn load_config(args: &CommonArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(database) = &args.database {
        config.database_path = database.clone();
    }
    if let Some(export) = &args.export {
        config.export_path = export.clone();
    }
    Ok(config)
}

/// Turns "source unavailable" into a logged no-op; everything else propagates.
fn no_data_is_ok<T>(result: Result<T, PipelineError>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_source_unavailable() => {
            warn!(error = %e, "No data available, nothing written");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Loads the source table from a local JSON file or fetches it over HTTP.
#[tracing::instrument(skip_all, fields(source = %source))]
async fn fetcher(source: &str) -> Result<RawTable, PipelineError> {
    if is_http_url(source) {
        let client = BasicClient::new();
        fetch_table(&client, source).await
    } else {
        let bytes = std::fs::read(source).map_err(|e| PipelineError::SourceUnavailable {
            reason: format!("{source}: {e}"),
        })?;
        parse_table(&bytes)
    }
}

/// True only for absolute `http`/`https` URLs; anything else is a file path.
fn is_http_url(source: &str) -> bool {
    reqwest::Url::parse(source).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}
