//! Final dataset assembly.

use tracing::info;

use crate::records::DerivedRecord;
use crate::table::{Table, Tabular};

/// Export column order.
pub fn final_columns() -> Vec<&'static str> {
    DerivedRecord::COLUMNS.iter().map(|(name, _)| *name).collect()
}

/// Ordered, projected rows ready for the store and the flat export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub records: Vec<DerivedRecord>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_table(&self) -> Table {
        Table::from_records(&self.records)
    }

    /// First and last year covered, if any rows.
    pub fn year_span(&self) -> Option<(i32, i32)> {
        let first = self.records.first()?.year;
        let last = self.records.last()?.year;
        Some((first, last))
    }
}

/// Sorts by reference date; the sort is stable, so rows sharing a date keep
/// the order they arrived in (the source's chronological order).
#[tracing::instrument(skip_all, fields(rows = records.len()))]
pub fn assemble(mut records: Vec<DerivedRecord>) -> Dataset {
    records.sort_by_key(|r| r.reference_date);

    let dataset = Dataset { records };
    match dataset.year_span() {
        Some((from, to)) => info!(rows = dataset.len(), from, to, "Assembled final dataset"),
        None => info!("Assembled empty dataset"),
    }
    dataset
}
