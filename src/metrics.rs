//! Derived time-series metrics over a canonical-quarter batch.
//!
//! Every statistic here treats a null rate as absent, never as zero, and
//! propagates nulls instead of failing. The two labels are never null: a
//! missing rate reads as [`StatusLabel::BelowMean`] and
//! [`LevelCategory::Moderate`].

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::records::{CanonicalRecord, DerivedRecord, LevelCategory, StatusLabel};

/// Month used for every record's reference date, whatever its quarter.
pub const REFERENCE_MONTH: u32 = 4;

/// Inclusive upper bound of [`LevelCategory::Low`].
pub const LOW_MAX: f64 = 7.0;
/// Inclusive upper bound of [`LevelCategory::Moderate`].
pub const MODERATE_MAX: f64 = 10.0;

pub const ROLLING_WINDOW: usize = 4;

/// `year-04-01`. Only year granularity: same-year quarters share a date.
pub fn reference_date(year: i32) -> NaiveDate {
    // Years come from a four-digit match, always inside chrono's range.
    NaiveDate::from_ymd_opt(year, REFERENCE_MONTH, 1).unwrap_or(NaiveDate::MIN)
}

/// Arithmetic mean of the non-null values, `None` if there are none.
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Ties (a deviation of exactly zero) and a missing deviation are
/// [`StatusLabel::BelowMean`].
pub fn status_label(deviation: Option<f64>) -> StatusLabel {
    match deviation {
        Some(d) if d > 0.0 => StatusLabel::AboveMean,
        _ => StatusLabel::BelowMean,
    }
}

/// Buckets a rate. Boundary values belong to the lower bracket.
///
/// | Rate           | Category |
/// |----------------|----------|
/// | <= 7           | LOW      |
/// | > 7 and <= 10  | MODERATE |
/// | > 10           | HIGH     |
/// | null           | MODERATE |
pub fn level_category(rate: Option<f64>) -> LevelCategory {
    match rate {
        Some(r) if r <= LOW_MAX => LevelCategory::Low,
        Some(r) if r > MODERATE_MAX => LevelCategory::High,
        _ => LevelCategory::Moderate,
    }
}

/// Percentage change from `previous` to `current`.
///
/// `None` when either side is null or `previous` is zero.
pub fn variation_pct(previous: Option<f64>, current: Option<f64>) -> Option<f64> {
    match (previous, current) {
        (Some(prev), Some(cur)) if prev != 0.0 => Some((cur - prev) / prev * 100.0),
        _ => None,
    }
}

/// Trailing mean over `rates[i+1-window..=i]`, clamped at the start.
pub fn rolling_mean(rates: &[Option<f64>], i: usize, window: usize) -> Option<f64> {
    let start = (i + 1).saturating_sub(window);
    mean(rates[start..=i].iter().copied())
}

/// Computes every derived field for the batch.
///
/// Records are stably sorted by reference date first, so quarters of the same
/// year keep their source order. The historical mean is taken over the whole
/// batch, rows after the current one included.
#[tracing::instrument(skip_all, fields(rows = records.len()))]
pub fn compute(records: Vec<CanonicalRecord>) -> Vec<DerivedRecord> {
    if records.is_empty() {
        info!("No canonical rows, nothing to compute");
        return Vec::new();
    }

    let mut dated: Vec<(NaiveDate, CanonicalRecord)> = records
        .into_iter()
        .map(|r| (reference_date(r.year), r))
        .collect();
    dated.sort_by_key(|(date, _)| *date);

    let rates: Vec<Option<f64>> = dated.iter().map(|(_, r)| r.rate).collect();
    let historical_mean = mean(rates.iter().copied());
    debug!(?historical_mean, "Batch historical mean");

    let derived: Vec<DerivedRecord> = dated
        .into_iter()
        .enumerate()
        .map(|(i, (reference_date, record))| {
            let deviation = match (record.rate, historical_mean) {
                (Some(rate), Some(mean)) => Some(rate - mean),
                _ => None,
            };
            let previous = if i == 0 { None } else { rates[i - 1] };

            DerivedRecord {
                reference_date,
                period: record.period,
                year: record.year,
                quarter_label: record.quarter,
                rate: record.rate,
                variation_pct: variation_pct(previous, record.rate),
                historical_mean_deviation: deviation,
                status_label: status_label(deviation),
                level_category: level_category(record.rate),
                rolling_mean_4: rolling_mean(&rates, i, ROLLING_WINDOW),
                locality: record.locality,
            }
        })
        .collect();

    info!(rows = derived.len(), ?historical_mean, "Computed derived metrics");
    derived
}
