use serde::Serialize;
use std::collections::BTreeMap;

use crate::metrics::mean;
use crate::records::DerivedRecord;

/// Verification summary of a persisted final table.
#[derive(Debug, Default, Serialize)]
pub struct SeriesSummary {
    pub total_rows: usize,
    pub rows_per_year: BTreeMap<i32, usize>,

    pub latest_period: Option<String>,
    pub latest_rate: Option<f64>,

    // rate statistics, nulls excluded
    pub mean_rate: Option<f64>,
    pub min_rate: Option<f64>,
    pub max_rate: Option<f64>,
    pub null_rates: usize,
}

impl SeriesSummary {
    /// Builds the summary from rows in chronological order.
    pub fn from_records(records: &[DerivedRecord]) -> Self {
        let mut s = SeriesSummary {
            total_rows: records.len(),
            ..Default::default()
        };

        for r in records {
            *s.rows_per_year.entry(r.year).or_default() += 1;

            match r.rate {
                Some(rate) => {
                    s.min_rate = Some(s.min_rate.map_or(rate, |m| m.min(rate)));
                    s.max_rate = Some(s.max_rate.map_or(rate, |m| m.max(rate)));
                }
                None => s.null_rates += 1,
            }
        }

        s.mean_rate = mean(records.iter().map(|r| r.rate));

        if let Some(last) = records.last() {
            s.latest_period = Some(last.period.clone());
            s.latest_rate = last.rate;
        }

        s
    }

    pub fn distinct_years(&self) -> usize {
        self.rows_per_year.len()
    }

    /// Years with fewer than four quarters, usually the current partial year.
    pub fn incomplete_years(&self) -> Vec<i32> {
        self.rows_per_year
            .iter()
            .filter(|(_, count)| **count < 4)
            .map(|(year, _)| *year)
            .collect()
    }
}
