//! Pipeline entry points.
//!
//! raw table -> normalize -> filter -> metrics -> assemble -> persist/export.
//! Every stage consumes its whole input before the next one starts, and any
//! structural failure is reported with the stage and row count it reached.

use serde::Serialize;
use tracing::{info, warn};

use crate::assemble::{Dataset, assemble};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result, Stage};
use crate::filter::{FilterReport, filter_canonical};
use crate::metrics::compute;
use crate::normalize::normalize_table;
use crate::output::export_csv;
use crate::records::{CanonicalRecord, DerivedRecord, RawTable};
use crate::stats::SeriesSummary;
use crate::store::Store;
use crate::table::Table;

/// Row counts of a completed run, for data-quality auditing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub rows_raw: usize,
    pub rows_normalized: usize,
    pub unparseable_values: usize,
    pub filter: FilterReport,
    pub rows_final: usize,
    pub year_span: Option<(i32, i32)>,
}

/// In-memory result of the core stages.
#[derive(Debug, Clone, Default)]
pub struct Processed {
    pub canonical: Vec<CanonicalRecord>,
    pub dataset: Dataset,
    pub report: RunReport,
}

/// Runs the pure core: normalize, filter, compute metrics, assemble.
#[tracing::instrument(skip_all, fields(rows = raw.len()))]
pub fn process(raw: &RawTable) -> Result<Processed> {
    // The header check runs before any row is read.
    let normalized = normalize_table(raw).map_err(|e| e.at_stage(Stage::Normalize, 0))?;
    let rows_normalized = normalized.records.len();

    let (canonical, filter) = filter_canonical(normalized.records);
    let derived = compute(canonical.clone());
    let dataset = assemble(derived);

    let report = RunReport {
        rows_raw: raw.len(),
        rows_normalized,
        unparseable_values: normalized.unparseable_values,
        filter,
        rows_final: dataset.len(),
        year_span: dataset.year_span(),
    };

    Ok(Processed {
        canonical,
        dataset,
        report,
    })
}

/// Refuses headerless payloads: there is nothing to store.
fn ensure_has_data(raw: &RawTable) -> Result<()> {
    if raw.header.is_empty() {
        return Err(PipelineError::SourceUnavailable {
            reason: "source returned an empty payload".to_string(),
        }
        .at_stage(Stage::Extract, 0));
    }
    Ok(())
}

fn open_store(config: &PipelineConfig) -> Result<Store> {
    Store::open(&config.database_path).map_err(|e| e.at_stage(Stage::Persist, 0))
}

fn write_raw(store: &mut Store, config: &PipelineConfig, raw: &RawTable) -> Result<()> {
    store
        .replace_table(&config.tables.raw, &Table::from_raw(raw))
        .map_err(|e| e.at_stage(Stage::Persist, 0))
}

/// Writes the normalized and derived tables, then the flat export.
fn write_outputs(store: &mut Store, config: &PipelineConfig, processed: &Processed) -> Result<()> {
    store
        .replace_table(
            &config.tables.normalized,
            &Table::from_records(&processed.canonical),
        )
        .map_err(|e| e.at_stage(Stage::Persist, processed.canonical.len()))?;

    store
        .replace_table(&config.tables.derived, &processed.dataset.to_table())
        .map_err(|e| e.at_stage(Stage::Persist, processed.dataset.len()))?;

    export_csv(&config.export_path, &processed.dataset)
        .map_err(|e| e.at_stage(Stage::Export, processed.dataset.len()))
}

fn log_report(report: &RunReport) {
    if report.filter.rows_after == 0 && report.rows_raw > 0 {
        warn!(rows_raw = report.rows_raw, "No canonical quarters in source data");
    }
    info!(
        rows_raw = report.rows_raw,
        rows_normalized = report.rows_normalized,
        unparseable_values = report.unparseable_values,
        rows_before_filter = report.filter.rows_before,
        rows_after_filter = report.filter.rows_after,
        duplicate_periods = report.filter.duplicate_periods,
        rows_final = report.rows_final,
        "Run complete"
    );
}

/// Replaces only the raw history table.
#[tracing::instrument(skip_all, fields(table = %config.tables.raw))]
pub fn store_raw(config: &PipelineConfig, raw: &RawTable) -> Result<()> {
    ensure_has_data(raw)?;
    let mut store = open_store(config)?;
    write_raw(&mut store, config, raw)
}

/// Full run on a freshly fetched table: raw history, core stages, all outputs.
///
/// The store connection lives for this call only.
#[tracing::instrument(skip_all)]
pub fn run(config: &PipelineConfig, raw: &RawTable) -> Result<RunReport> {
    ensure_has_data(raw)?;
    // Core first, so a schema failure leaves every table untouched.
    let processed = process(raw)?;

    let mut store = open_store(config)?;
    write_raw(&mut store, config, raw)?;
    write_outputs(&mut store, config, &processed)?;

    log_report(&processed.report);
    Ok(processed.report)
}

/// Rebuilds every derived output from the stored raw history.
#[tracing::instrument(skip_all, fields(table = %config.tables.raw))]
pub fn transform_stored(config: &PipelineConfig) -> Result<RunReport> {
    let mut store = open_store(config)?;
    let raw = store
        .read_table(&config.tables.raw)
        .map_err(|e| e.at_stage(Stage::Extract, 0))?
        .into_raw();

    let processed = process(&raw)?;
    write_outputs(&mut store, config, &processed)?;

    log_report(&processed.report);
    Ok(processed.report)
}

/// Reads the persisted final table back.
pub fn load_final(config: &PipelineConfig) -> Result<Vec<DerivedRecord>> {
    let store = open_store(config)?;
    let table = store
        .read_table(&config.tables.derived)
        .map_err(|e| e.at_stage(Stage::Assemble, 0))?;
    DerivedRecord::from_table(&config.tables.derived, &table)
        .map_err(|e| e.at_stage(Stage::Assemble, table.len()))
}

/// Summary of the persisted final table.
#[tracing::instrument(skip_all, fields(table = %config.tables.derived))]
pub fn verify(config: &PipelineConfig) -> Result<SeriesSummary> {
    let records = load_final(config)?;
    let summary = SeriesSummary::from_records(&records);
    info!(
        total_rows = summary.total_rows,
        distinct_years = summary.distinct_years(),
        latest_period = ?summary.latest_period,
        latest_rate = ?summary.latest_rate,
        mean_rate = ?summary.mean_rate,
        "Verified final table"
    );
    Ok(summary)
}
