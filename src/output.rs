//! Output formatting and flat-file export of the final dataset.
//!
//! Supports JSON logging and a BOM-prefixed CSV export that spreadsheet tools
//! open with accented characters intact.

use csv::WriterBuilder;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::assemble::{Dataset, final_columns};
use crate::error::{PipelineError, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Logs a value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| PipelineError::Payload {
        reason: e.to_string(),
    })?;
    info!("{}", json);
    Ok(())
}

/// Writes the dataset to `path` as UTF-8 CSV with a byte-order mark.
///
/// The file is truncated first, so the export always mirrors exactly one run.
/// The header is written even when the dataset is empty.
pub fn export_csv(path: impl AsRef<Path>, dataset: &Dataset) -> Result<()> {
    let path = path.as_ref();
    let io_err = |source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    };
    let csv_err = |source| PipelineError::Export {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut file = File::create(path).map_err(io_err)?;
    file.write_all(UTF8_BOM).map_err(io_err)?;

    let mut writer = WriterBuilder::new()
        .has_headers(false) // empty exports still get a header
        .from_writer(file);

    writer.write_record(final_columns()).map_err(csv_err)?;
    for record in &dataset.records {
        writer.serialize(record).map_err(csv_err)?;
    }
    writer.flush().map_err(io_err)?;

    info!(path = %path.display(), rows = dataset.len(), "Exported CSV");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::reference_date;
    use crate::records::{DerivedRecord, LevelCategory, Quarter, StatusLabel};
    use std::fs;
    use tempfile::tempdir;

    fn dataset() -> Dataset {
        Dataset {
            records: vec![
                DerivedRecord {
                    reference_date: reference_date(2023),
                    period: "jan-fev-mar 2023".to_string(),
                    year: 2023,
                    quarter_label: Quarter::JanFevMar,
                    rate: Some(8.5),
                    variation_pct: None,
                    historical_mean_deviation: Some(0.5),
                    status_label: StatusLabel::AboveMean,
                    level_category: LevelCategory::Moderate,
                    rolling_mean_4: Some(8.5),
                    locality: "São Paulo".to_string(),
                },
                DerivedRecord {
                    reference_date: reference_date(2023),
                    period: "abr-mai-jun 2023".to_string(),
                    year: 2023,
                    quarter_label: Quarter::AbrMaiJun,
                    rate: None,
                    variation_pct: None,
                    historical_mean_deviation: None,
                    status_label: StatusLabel::BelowMean,
                    level_category: LevelCategory::Moderate,
                    rolling_mean_4: Some(8.5),
                    locality: "São Paulo".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&dataset().records).unwrap();
    }

    #[test]
    fn test_export_writes_bom_header_and_rows() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("out/pnad.csv");

        export_csv(&path, &dataset()).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));

        let content = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "reference_date,period,year,quarter_label,rate,variation_pct,historical_mean_deviation,status_label,level_category,rolling_mean_4,locality"
        );
        assert_eq!(
            lines[1],
            "2023-04-01,jan-fev-mar 2023,2023,jan-fev-mar,8.5,,0.5,ABOVE_MEAN,MODERATE,8.5,São Paulo"
        );
        assert_eq!(
            lines[2],
            "2023-04-01,abr-mai-jun 2023,2023,abr-mai-jun,,,,BELOW_MEAN,MODERATE,8.5,São Paulo"
        );
    }

    #[test]
    fn test_export_replaces_previous_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("pnad.csv");

        export_csv(&path, &dataset()).unwrap();
        export_csv(&path, &dataset()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.contains("reference_date")).count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_export_empty_dataset_writes_header_only() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("empty.csv");

        export_csv(&path, &Dataset::default()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}
