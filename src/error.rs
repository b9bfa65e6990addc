//! Error taxonomy for the pipeline.
//!
//! Row-level problems (unparseable values, irregular quarter labels) never
//! show up here: they are absorbed into nulls or filtered out and counted.
//! Everything in [`PipelineError`] is structural and aborts the run.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A pipeline stage, used to attribute failures and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Normalize,
    Filter,
    Metrics,
    Assemble,
    Persist,
    Export,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Normalize => "normalize",
            Stage::Filter => "filter",
            Stage::Metrics => "metrics",
            Stage::Assemble => "assemble",
            Stage::Persist => "persist",
            Stage::Export => "export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Upstream fetch failed or answered with a non-success status.
    #[error("source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    /// Upstream answered, but the body is not a tabular JSON payload.
    #[error("malformed source payload: {reason}")]
    Payload { reason: String },

    /// A required raw field is absent from the source header.
    #[error("schema mismatch in {stage}: required field '{field}' is missing")]
    SchemaMismatch { stage: Stage, field: String },

    #[error("store error in {stage} on table '{table}': {source}")]
    Store {
        stage: Stage,
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cannot create table '{table}' without columns")]
    NoColumns { table: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("export to {path} failed: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A persisted row could not be decoded back into a record.
    #[error("corrupt row {row} in table '{table}': {reason}")]
    CorruptRow {
        table: String,
        row: usize,
        reason: String,
    },

    #[error("invalid config {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("{stage} stage failed after {rows_processed} rows: {source}")]
    Aborted {
        stage: Stage,
        rows_processed: usize,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Wraps the error with the stage it happened in and the row count reached.
    ///
    /// Already-attributed errors are returned unchanged.
    pub fn at_stage(self, stage: Stage, rows_processed: usize) -> Self {
        match self {
            aborted @ PipelineError::Aborted { .. } => aborted,
            other => PipelineError::Aborted {
                stage,
                rows_processed,
                source: Box::new(other),
            },
        }
    }

    /// True when the upstream had no data to give; callers report this as
    /// "no data available" instead of failing.
    pub fn is_source_unavailable(&self) -> bool {
        match self {
            PipelineError::SourceUnavailable { .. } => true,
            PipelineError::Aborted { source, .. } => source.is_source_unavailable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
