//! In-memory tabular dataset exchanged with the store.
//!
//! Stages work on typed records; a [`Table`] only exists at the persistence
//! boundary. Record types opt in through [`Tabular`].

use chrono::NaiveDate;
pub use rusqlite::types::Value;

use crate::error::{PipelineError, Result};
use crate::records::{CanonicalRecord, DerivedRecord, RawTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
}

impl ColumnKind {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn from_records<T: Tabular>(records: &[T]) -> Self {
        Self {
            columns: T::COLUMNS
                .iter()
                .map(|(name, kind)| Column::new(*name, *kind))
                .collect(),
            rows: records.iter().map(Tabular::to_row).collect(),
        }
    }

    /// Raw history is kept verbatim: every source column as TEXT.
    pub fn from_raw(raw: &RawTable) -> Self {
        Self {
            columns: raw
                .header
                .iter()
                .map(|h| Column::new(h.clone(), ColumnKind::Text))
                .collect(),
            rows: raw
                .rows
                .iter()
                .map(|row| row.iter().cloned().map(Value::Text).collect())
                .collect(),
        }
    }

    /// Inverse of [`Table::from_raw`]. Non-text cells are stringified.
    pub fn into_raw(self) -> RawTable {
        let header = self.columns.into_iter().map(|c| c.name).collect();
        let rows = self
            .rows
            .into_iter()
            .map(|row| row.into_iter().map(value_to_string).collect())
            .collect();
        RawTable::new(header, rows)
    }
}

fn value_to_string(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s,
        Value::Blob(b) => String::from_utf8_lossy(&b).into_owned(),
    }
}

/// A record type with a fixed column layout.
pub trait Tabular {
    const COLUMNS: &'static [(&'static str, ColumnKind)];

    /// Cells in `COLUMNS` order.
    fn to_row(&self) -> Vec<Value>;
}

fn opt_real(v: Option<f64>) -> Value {
    v.map(Value::Real).unwrap_or(Value::Null)
}

impl Tabular for CanonicalRecord {
    const COLUMNS: &'static [(&'static str, ColumnKind)] = &[
        ("period", ColumnKind::Text),
        ("year", ColumnKind::Integer),
        ("quarter_label", ColumnKind::Text),
        ("rate", ColumnKind::Real),
        ("locality", ColumnKind::Text),
        ("indicator", ColumnKind::Text),
        ("unit_code", ColumnKind::Text),
        ("unit", ColumnKind::Text),
    ];

    fn to_row(&self) -> Vec<Value> {
        vec![
            Value::Text(self.period.clone()),
            Value::Integer(self.year.into()),
            Value::Text(self.quarter.label().to_string()),
            opt_real(self.rate),
            Value::Text(self.locality.clone()),
            Value::Text(self.indicator.clone()),
            Value::Text(self.unit_code.clone()),
            Value::Text(self.unit.clone()),
        ]
    }
}

impl Tabular for DerivedRecord {
    const COLUMNS: &'static [(&'static str, ColumnKind)] = &[
        ("reference_date", ColumnKind::Text),
        ("period", ColumnKind::Text),
        ("year", ColumnKind::Integer),
        ("quarter_label", ColumnKind::Text),
        ("rate", ColumnKind::Real),
        ("variation_pct", ColumnKind::Real),
        ("historical_mean_deviation", ColumnKind::Real),
        ("status_label", ColumnKind::Text),
        ("level_category", ColumnKind::Text),
        ("rolling_mean_4", ColumnKind::Real),
        ("locality", ColumnKind::Text),
    ];

    fn to_row(&self) -> Vec<Value> {
        vec![
            Value::Text(self.reference_date.format("%Y-%m-%d").to_string()),
            Value::Text(self.period.clone()),
            Value::Integer(self.year.into()),
            Value::Text(self.quarter_label.label().to_string()),
            opt_real(self.rate),
            opt_real(self.variation_pct),
            opt_real(self.historical_mean_deviation),
            Value::Text(self.status_label.as_str().to_string()),
            Value::Text(self.level_category.as_str().to_string()),
            opt_real(self.rolling_mean_4),
            Value::Text(self.locality.clone()),
        ]
    }
}

/// Cell accessor that knows which table/row it is reading, for error messages.
struct RowReader<'a> {
    table: &'a str,
    index: usize,
    cells: &'a [Value],
}

impl RowReader<'_> {
    fn corrupt(&self, reason: String) -> PipelineError {
        PipelineError::CorruptRow {
            table: self.table.to_string(),
            row: self.index,
            reason,
        }
    }

    fn cell(&self, col: usize) -> Result<&Value> {
        self.cells
            .get(col)
            .ok_or_else(|| self.corrupt(format!("missing column {col}")))
    }

    fn text(&self, col: usize) -> Result<String> {
        match self.cell(col)? {
            Value::Text(s) => Ok(s.clone()),
            other => Err(self.corrupt(format!("column {col}: expected text, got {other:?}"))),
        }
    }

    fn opt_text(&self, col: usize) -> Result<Option<String>> {
        match self.cell(col)? {
            Value::Null => Ok(None),
            _ => self.text(col).map(Some),
        }
    }

    fn integer(&self, col: usize) -> Result<i64> {
        match self.cell(col)? {
            Value::Integer(i) => Ok(*i),
            other => Err(self.corrupt(format!("column {col}: expected integer, got {other:?}"))),
        }
    }

    fn opt_real(&self, col: usize) -> Result<Option<f64>> {
        match self.cell(col)? {
            Value::Null => Ok(None),
            Value::Real(f) => Ok(Some(*f)),
            Value::Integer(i) => Ok(Some(*i as f64)),
            other => Err(self.corrupt(format!("column {col}: expected real, got {other:?}"))),
        }
    }

    fn parsed<T: std::str::FromStr<Err = String>>(&self, col: usize) -> Result<Option<T>> {
        self.opt_text(col)?
            .map(|s| s.parse::<T>().map_err(|e| self.corrupt(e)))
            .transpose()
    }

    fn required<T: std::str::FromStr<Err = String>>(&self, col: usize, name: &str) -> Result<T> {
        self.parsed(col)?.ok_or_else(|| self.corrupt(format!("{name} is null")))
    }
}

impl DerivedRecord {
    /// Decodes every row of a derived table read back from the store.
    ///
    /// Columns are matched by name, so a table with the derived layout in any
    /// column order is accepted.
    pub fn from_table(name: &str, table: &Table) -> Result<Vec<Self>> {
        let names = table.column_names();
        let mut positions = Vec::with_capacity(Self::COLUMNS.len());
        for (column, _) in Self::COLUMNS {
            let pos = names.iter().position(|n| n == column).ok_or_else(|| {
                PipelineError::SchemaMismatch {
                    stage: crate::error::Stage::Assemble,
                    field: (*column).to_string(),
                }
            })?;
            positions.push(pos);
        }

        table
            .rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let cells: Vec<Value> = positions
                    .iter()
                    .map(|&p| row.get(p).cloned().unwrap_or(Value::Null))
                    .collect();
                let reader = RowReader {
                    table: name,
                    index,
                    cells: &cells,
                };

                let date_text = reader.text(0)?;
                let reference_date = NaiveDate::parse_from_str(&date_text, "%Y-%m-%d")
                    .map_err(|e| reader.corrupt(format!("reference_date '{date_text}': {e}")))?;
                let year = i32::try_from(reader.integer(2)?)
                    .map_err(|e| reader.corrupt(format!("year: {e}")))?;
                let quarter_label = reader.required(3, "quarter_label")?;

                Ok(DerivedRecord {
                    reference_date,
                    period: reader.text(1)?,
                    year,
                    quarter_label,
                    rate: reader.opt_real(4)?,
                    variation_pct: reader.opt_real(5)?,
                    historical_mean_deviation: reader.opt_real(6)?,
                    status_label: reader.required(7, "status_label")?,
                    level_category: reader.required(8, "level_category")?,
                    rolling_mean_4: reader.opt_real(9)?,
                    locality: reader.text(10)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{LevelCategory, Quarter, StatusLabel};

    fn derived(period: &str, rate: Option<f64>) -> DerivedRecord {
        DerivedRecord {
            reference_date: NaiveDate::from_ymd_opt(2023, 4, 1).unwrap(),
            period: period.to_string(),
            year: 2023,
            quarter_label: Quarter::AbrMaiJun,
            rate,
            variation_pct: None,
            historical_mean_deviation: rate.map(|r| r - 8.0),
            status_label: StatusLabel::AboveMean,
            level_category: LevelCategory::Moderate,
            rolling_mean_4: rate,
            locality: "Brasil".to_string(),
        }
    }

    #[test]
    fn test_from_records_uses_fixed_column_order() {
        let table = Table::from_records(&[derived("abr-mai-jun 2023", Some(8.0))]);
        assert_eq!(
            table.column_names(),
            vec![
                "reference_date",
                "period",
                "year",
                "quarter_label",
                "rate",
                "variation_pct",
                "historical_mean_deviation",
                "status_label",
                "level_category",
                "rolling_mean_4",
                "locality",
            ]
        );
        assert_eq!(table.rows[0][0], Value::Text("2023-04-01".into()));
        assert_eq!(table.rows[0][5], Value::Null);
    }

    #[test]
    fn test_derived_rows_decode_from_table() {
        let original = vec![
            derived("abr-mai-jun 2023", Some(8.0)),
            derived("jul-ago-set 2023", None),
        ];
        let table = Table::from_records(&original);
        let decoded = DerivedRecord::from_table("dashboard_pnad", &table).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_reports_corrupt_row() {
        let mut table = Table::from_records(&[derived("abr-mai-jun 2023", Some(8.0))]);
        table.rows[0][2] = Value::Text("not a year".into());

        let err = DerivedRecord::from_table("dashboard_pnad", &table).unwrap_err();
        assert!(matches!(err, PipelineError::CorruptRow { row: 0, .. }));
    }

    #[test]
    fn test_decode_rejects_null_status_label() {
        let mut table = Table::from_records(&[derived("abr-mai-jun 2023", Some(8.0))]);
        assert_eq!(table.rows[0][7], Value::Text("ABOVE_MEAN".into()));
        table.rows[0][7] = Value::Null;

        let err = DerivedRecord::from_table("dashboard_pnad", &table).unwrap_err();
        assert!(matches!(err, PipelineError::CorruptRow { row: 0, .. }));
    }

    #[test]
    fn test_decode_requires_every_column() {
        let mut table = Table::from_records(&[derived("abr-mai-jun 2023", Some(8.0))]);
        table.columns.pop();
        for row in &mut table.rows {
            row.pop();
        }

        let err = DerivedRecord::from_table("dashboard_pnad", &table).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { ref field, .. } if field == "locality"));
    }

    #[test]
    fn test_raw_table_survives_text_round_trip() {
        let raw = RawTable::new(
            vec!["V".into(), "D3N".into()],
            vec![vec!["8.5".into(), "jan-fev-mar 2023".into()]],
        );
        assert_eq!(Table::from_raw(&raw).into_raw(), raw);
    }
}
