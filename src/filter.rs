//! Keeps only the four regular calendar quarters.

use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::records::{CanonicalRecord, NormalizedRecord, Quarter};

/// Row counts around the filter, for data-quality auditing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterReport {
    pub rows_before: usize,
    pub rows_after: usize,
    /// Kept rows whose `period` already appeared earlier in the batch.
    pub duplicate_periods: usize,
}

impl FilterReport {
    pub fn dropped(&self) -> usize {
        self.rows_before - self.rows_after
    }
}

/// Converts a record whose label is a canonical quarter and whose year was
/// parsed. Anything else (moving windows, annual aggregates, unparsed
/// periods) yields `None`.
pub fn to_canonical(record: NormalizedRecord) -> Option<CanonicalRecord> {
    let quarter = record.quarter_label.as_deref().and_then(Quarter::from_label)?;
    let year = record.year?;

    Some(CanonicalRecord {
        period: record.period,
        year,
        quarter,
        rate: record.rate,
        locality: record.locality,
        indicator: record.indicator,
        unit_code: record.unit_code,
        unit: record.unit,
    })
}

/// Counts kept rows repeating an earlier `period`.
fn count_duplicate_periods(records: &[CanonicalRecord]) -> usize {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .iter()
        .filter(|r| !seen.insert(r.period.as_str()))
        .count()
}

/// Drops every non-canonical row. Order of surviving rows is preserved.
///
/// Repeated periods are kept but counted and logged: they skew the
/// sequential metrics.
#[tracing::instrument(skip_all)]
pub fn filter_canonical(records: Vec<NormalizedRecord>) -> (Vec<CanonicalRecord>, FilterReport) {
    let rows_before = records.len();
    let kept: Vec<CanonicalRecord> = records.into_iter().filter_map(to_canonical).collect();

    let report = FilterReport {
        rows_before,
        rows_after: kept.len(),
        duplicate_periods: count_duplicate_periods(&kept),
    };
    if report.duplicate_periods > 0 {
        warn!(
            duplicate_periods = report.duplicate_periods,
            "Source repeats periods; variation and rolling mean will be skewed"
        );
    }
    info!(
        rows_before = report.rows_before,
        rows_after = report.rows_after,
        dropped = report.dropped(),
        "Filtered to canonical quarters"
    );

    (kept, report)
}
