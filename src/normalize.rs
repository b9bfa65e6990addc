//! Schema normalization: source field codes to canonical typed records.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result, Stage};
use crate::records::{NormalizedRecord, RawRecord, RawTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    Rate,
    Locality,
    Indicator,
    Period,
    UnitCode,
    Unit,
}

/// One `source code -> canonical field` pair.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub source: &'static str,
    pub canonical: CanonicalField,
    /// Missing required fields are a [`PipelineError::SchemaMismatch`];
    /// missing optional ones read as empty strings.
    pub required: bool,
}

/// Source codes used by the statistical API (`V` value, `DnN` dimension
/// names, `MC`/`MN` unit of measure). Unlisted source columns are dropped.
pub const FIELD_MAPPING: &[FieldMapping] = &[
    FieldMapping {
        source: "V",
        canonical: CanonicalField::Rate,
        required: true,
    },
    FieldMapping {
        source: "D1N",
        canonical: CanonicalField::Locality,
        required: true,
    },
    FieldMapping {
        source: "D2N",
        canonical: CanonicalField::Indicator,
        required: false,
    },
    FieldMapping {
        source: "D3N",
        canonical: CanonicalField::Period,
        required: true,
    },
    FieldMapping {
        source: "MC",
        canonical: CanonicalField::UnitCode,
        required: false,
    },
    FieldMapping {
        source: "MN",
        canonical: CanonicalField::Unit,
        required: false,
    },
];

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]{4})").expect("static regex"));
static QUARTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w{3}-\w{3}-\w{3})").expect("static regex"));

/// Checks that the mapping is total and one-to-one.
pub fn validate_mapping(mapping: &[FieldMapping]) -> std::result::Result<(), String> {
    for (i, m) in mapping.iter().enumerate() {
        for other in &mapping[i + 1..] {
            if m.source == other.source {
                return Err(format!("source field '{}' is mapped twice", m.source));
            }
            if m.canonical == other.canonical {
                return Err(format!("canonical field {:?} has two sources", m.canonical));
            }
        }
    }
    for required in [CanonicalField::Rate, CanonicalField::Locality, CanonicalField::Period] {
        if !mapping.iter().any(|m| m.canonical == required && m.required) {
            return Err(format!("canonical field {required:?} has no required source"));
        }
    }
    Ok(())
}

/// Header positions of each mapped field, resolved once per table.
#[derive(Debug)]
struct SourceColumns {
    rate: usize,
    locality: usize,
    period: usize,
    indicator: Option<usize>,
    unit_code: Option<usize>,
    unit: Option<usize>,
}

impl SourceColumns {
    fn resolve(table: &RawTable, mapping: &[FieldMapping]) -> Result<Self> {
        let find = |field: CanonicalField| -> Result<Option<usize>> {
            let Some(m) = mapping.iter().find(|m| m.canonical == field) else {
                return Ok(None);
            };
            match table.column_index(m.source) {
                Some(idx) => Ok(Some(idx)),
                None if m.required => Err(PipelineError::SchemaMismatch {
                    stage: Stage::Normalize,
                    field: m.source.to_string(),
                }),
                None => {
                    debug!(source = m.source, "Optional source field absent");
                    Ok(None)
                }
            }
        };
        let required = |field: CanonicalField| -> Result<usize> {
            find(field)?.ok_or_else(|| PipelineError::SchemaMismatch {
                stage: Stage::Normalize,
                field: format!("{field:?}"),
            })
        };

        Ok(Self {
            rate: required(CanonicalField::Rate)?,
            locality: required(CanonicalField::Locality)?,
            period: required(CanonicalField::Period)?,
            indicator: find(CanonicalField::Indicator)?,
            unit_code: find(CanonicalField::UnitCode)?,
            unit: find(CanonicalField::Unit)?,
        })
    }

    fn record(&self, row: &[String]) -> RawRecord {
        let get = |idx: usize| row.get(idx).cloned().unwrap_or_default();
        let opt = |idx: Option<usize>| idx.map(&get).unwrap_or_default();
        RawRecord {
            period: get(self.period),
            value: get(self.rate),
            locality: get(self.locality),
            indicator: opt(self.indicator),
            unit_code: opt(self.unit_code),
            unit: opt(self.unit),
        }
    }
}

/// Projects a source table onto [`RawRecord`]s.
///
/// # Errors
///
/// [`PipelineError::SchemaMismatch`] naming the first required source field
/// missing from the header. Checked before any row is read.
pub fn raw_records(table: &RawTable) -> Result<Vec<RawRecord>> {
    let columns = SourceColumns::resolve(table, FIELD_MAPPING)?;
    Ok(table.rows.iter().map(|row| columns.record(row)).collect())
}

/// Parses a decimal rate. Anything non-numeric (including NaN/inf) is `None`.
pub fn parse_rate(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// First four-digit run in the period label.
pub fn extract_year(period: &str) -> Option<i32> {
    YEAR_RE
        .captures(period)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// First `xxx-xxx-xxx` run in the period label, e.g. `abr-mai-jun`.
pub fn extract_quarter_label(period: &str) -> Option<String> {
    QUARTER_RE
        .captures(period)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn normalize_record(raw: RawRecord) -> NormalizedRecord {
    NormalizedRecord {
        year: extract_year(&raw.period),
        quarter_label: extract_quarter_label(&raw.period),
        rate: parse_rate(&raw.value),
        period: raw.period,
        locality: raw.locality,
        indicator: raw.indicator,
        unit_code: raw.unit_code,
        unit: raw.unit,
    }
}

/// Result of normalizing a table, with the row-level audit count.
#[derive(Debug, Default)]
pub struct Normalized {
    pub records: Vec<NormalizedRecord>,
    /// Rows whose value could not be parsed and became a null rate.
    pub unparseable_values: usize,
}

#[tracing::instrument(skip_all, fields(rows = table.len()))]
pub fn normalize_table(table: &RawTable) -> Result<Normalized> {
    // An empty payload has no header to validate.
    if table.header.is_empty() && table.is_empty() {
        info!("Source table is empty");
        return Ok(Normalized::default());
    }

    let raws = raw_records(table)?;

    let mut unparseable_values = 0;
    let records: Vec<NormalizedRecord> = raws
        .into_iter()
        .map(|raw| {
            let record = normalize_record(raw);
            if record.rate.is_none() {
                unparseable_values += 1;
            }
            record
        })
        .collect();

    if unparseable_values > 0 {
        warn!(unparseable_values, "Non-numeric values recorded as null rates");
    }
    info!(rows = records.len(), unparseable_values, "Normalized source rows");

    Ok(Normalized {
        records,
        unparseable_values,
    })
}
