//! Typed records for each pipeline stage.
//!
//! Raw rows come in as strings ([`RawTable`] / [`RawRecord`]), get typed by the
//! normalizer ([`NormalizedRecord`]), narrowed to regular calendar quarters by
//! the period filter ([`CanonicalRecord`]) and finally enriched by the metrics
//! engine ([`DerivedRecord`]). Each stage builds new values; nothing is
//! mutated in place across stages.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Source table exactly as the upstream API returned it: header plus string rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { header, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `name` in the header, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }
}

/// One source row, with only the fields the pipeline consumes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub period: String,
    pub value: String,
    pub locality: String,
    pub indicator: String,
    pub unit_code: String,
    pub unit: String,
}

/// A raw record with canonical names and types.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub period: String,
    pub year: Option<i32>,
    pub quarter_label: Option<String>,
    /// `None` when the source value was not numeric.
    pub rate: Option<f64>,
    pub locality: String,
    pub indicator: String,
    pub unit_code: String,
    pub unit: String,
}

/// The four regular calendar quarters of the series.
///
/// The upstream series also publishes moving three-month windows
/// (`fev-mar-abr`, ...) and yearly aggregates; those are not quarters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Quarter {
    #[serde(rename = "jan-fev-mar")]
    JanFevMar,
    #[serde(rename = "abr-mai-jun")]
    AbrMaiJun,
    #[serde(rename = "jul-ago-set")]
    JulAgoSet,
    #[serde(rename = "out-nov-dez")]
    OutNovDez,
}

impl Quarter {
    pub const ALL: [Quarter; 4] = [
        Quarter::JanFevMar,
        Quarter::AbrMaiJun,
        Quarter::JulAgoSet,
        Quarter::OutNovDez,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Quarter::JanFevMar => "jan-fev-mar",
            Quarter::AbrMaiJun => "abr-mai-jun",
            Quarter::JulAgoSet => "jul-ago-set",
            Quarter::OutNovDez => "out-nov-dez",
        }
    }

    /// Exact match against the canonical labels. No case folding.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.label() == label)
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Quarter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| format!("not a canonical quarter: '{s}'"))
    }
}

/// A normalized record known to belong to a regular quarter of a known year.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub period: String,
    pub year: i32,
    pub quarter: Quarter,
    pub rate: Option<f64>,
    pub locality: String,
    pub indicator: String,
    pub unit_code: String,
    pub unit: String,
}

/// Sign of a rate's deviation from the batch mean. Zero counts as below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusLabel {
    AboveMean,
    BelowMean,
}

impl StatusLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusLabel::AboveMean => "ABOVE_MEAN",
            StatusLabel::BelowMean => "BELOW_MEAN",
        }
    }
}

impl FromStr for StatusLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ABOVE_MEAN" => Ok(StatusLabel::AboveMean),
            "BELOW_MEAN" => Ok(StatusLabel::BelowMean),
            other => Err(format!("unknown status label '{other}'")),
        }
    }
}

/// Unemployment level bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LevelCategory {
    Low,
    Moderate,
    High,
}

impl LevelCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LevelCategory::Low => "LOW",
            LevelCategory::Moderate => "MODERATE",
            LevelCategory::High => "HIGH",
        }
    }
}

impl FromStr for LevelCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(LevelCategory::Low),
            "MODERATE" => Ok(LevelCategory::Moderate),
            "HIGH" => Ok(LevelCategory::High),
            other => Err(format!("unknown level category '{other}'")),
        }
    }
}

/// Final, metric-enriched row. Field order is the export column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedRecord {
    pub reference_date: NaiveDate,
    pub period: String,
    pub year: i32,
    pub quarter_label: Quarter,
    pub rate: Option<f64>,
    pub variation_pct: Option<f64>,
    pub historical_mean_deviation: Option<f64>,
    pub status_label: StatusLabel,
    pub level_category: LevelCategory,
    pub rolling_mean_4: Option<f64>,
    pub locality: String,
}
