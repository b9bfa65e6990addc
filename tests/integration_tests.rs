use pnad_pipeline::config::PipelineConfig;
use pnad_pipeline::error::{PipelineError, Stage};
use pnad_pipeline::parser::parse_table;
use pnad_pipeline::pipeline::{load_final, run, store_raw, transform_stored, verify};
use pnad_pipeline::records::{LevelCategory, Quarter, RawTable, StatusLabel};
use pnad_pipeline::store::Store;
use std::fs;
use tempfile::{TempDir, tempdir};

fn fixture() -> RawTable {
    let bytes = include_bytes!("fixtures/sidra_6381.json");
    parse_table(bytes).expect("Failed to parse fixture")
}

fn config_in(dir: &TempDir) -> PipelineConfig {
    PipelineConfig {
        database_path: dir.path().join("data/ibge_analise.db"),
        export_path: dir.path().join("data/pnad_powerbi_pronto.csv"),
        ..Default::default()
    }
}

#[test]
fn test_full_pipeline() {
    let tmp = tempdir().unwrap();
    let config = config_in(&tmp);

    let report = run(&config, &fixture()).unwrap();

    assert_eq!(report.rows_raw, 11);
    assert_eq!(report.filter.rows_before, 11);
    assert_eq!(report.filter.rows_after, 8);
    assert_eq!(report.filter.duplicate_periods, 0);
    assert_eq!(report.unparseable_values, 1);
    assert_eq!(report.rows_final, 8);
    assert_eq!(report.year_span, Some((2022, 2023)));

    let rows = load_final(&config).unwrap();
    assert_eq!(rows.len(), 8);
    assert!(rows.iter().all(|r| Quarter::ALL.contains(&r.quarter_label)));

    let periods: Vec<&str> = rows.iter().map(|r| r.period.as_str()).collect();
    assert_eq!(
        periods,
        vec![
            "jan-fev-mar 2022",
            "abr-mai-jun 2022",
            "jul-ago-set 2022",
            "out-nov-dez 2022",
            "jan-fev-mar 2023",
            "abr-mai-jun 2023",
            "jul-ago-set 2023",
            "out-nov-dez 2023",
        ]
    );

    // mean of the seven numeric quarters is 8.7
    assert_eq!(rows[0].rate, Some(11.1));
    assert_eq!(rows[0].rolling_mean_4, Some(11.1));
    assert_eq!(rows[0].variation_pct, None);
    assert_eq!(rows[0].status_label, StatusLabel::AboveMean);
    assert_eq!(rows[0].level_category, LevelCategory::High);
    assert!((rows[0].historical_mean_deviation.unwrap() - 2.4).abs() < 1e-9);

    // null rate and the row after it
    assert_eq!(rows[5].rate, None);
    assert_eq!(rows[5].variation_pct, None);
    assert_eq!(rows[5].historical_mean_deviation, None);
    assert_eq!(rows[5].status_label, StatusLabel::BelowMean);
    assert_eq!(rows[5].level_category, LevelCategory::Moderate);
    assert_eq!(rows[6].variation_pct, None);
    assert_eq!(rows[7].level_category, LevelCategory::Low);

    let store = Store::open(&config.database_path).unwrap();
    assert_eq!(store.read_table(&config.tables.raw).unwrap().len(), 11);
    assert_eq!(store.read_table(&config.tables.normalized).unwrap().len(), 8);
}

#[test]
fn test_export_has_bom_header_and_accents() {
    let tmp = tempdir().unwrap();
    let config = config_in(&tmp);
    run(&config, &fixture()).unwrap();

    let bytes = fs::read(&config.export_path).unwrap();
    assert!(bytes.starts_with(b"\xEF\xBB\xBF"));

    let content = String::from_utf8(bytes[3..].to_vec()).unwrap();
    let mut lines = content.lines();
    assert_eq!(
        lines.next(),
        Some(
            "reference_date,period,year,quarter_label,rate,variation_pct,historical_mean_deviation,status_label,level_category,rolling_mean_4,locality"
        )
    );
    assert_eq!(lines.count(), 8);
}

#[test]
fn test_running_twice_is_idempotent() {
    let tmp = tempdir().unwrap();
    let config = config_in(&tmp);

    run(&config, &fixture()).unwrap();
    let first_rows = load_final(&config).unwrap();
    let first_csv = fs::read(&config.export_path).unwrap();

    run(&config, &fixture()).unwrap();
    let second_rows = load_final(&config).unwrap();
    let second_csv = fs::read(&config.export_path).unwrap();

    assert_eq!(first_rows, second_rows);
    assert_eq!(first_csv, second_csv);

    let store = Store::open(&config.database_path).unwrap();
    assert_eq!(store.read_table(&config.tables.raw).unwrap().len(), 11);
}

#[test]
fn test_transform_from_stored_raw_matches_direct_run() {
    let direct_dir = tempdir().unwrap();
    let direct = config_in(&direct_dir);
    run(&direct, &fixture()).unwrap();

    let staged_dir = tempdir().unwrap();
    let staged = config_in(&staged_dir);
    store_raw(&staged, &fixture()).unwrap();
    let report = transform_stored(&staged).unwrap();

    assert_eq!(report.rows_final, 8);
    assert_eq!(load_final(&direct).unwrap(), load_final(&staged).unwrap());
}

#[test]
fn test_schema_mismatch_aborts_without_writing() {
    let tmp = tempdir().unwrap();
    let config = config_in(&tmp);
    let raw = RawTable::new(
        vec!["V".into(), "D1N".into()],
        vec![vec!["8.5".into(), "Brasil".into()]],
    );

    let err = run(&config, &raw).unwrap_err();
    match err {
        PipelineError::Aborted { stage, source, .. } => {
            assert_eq!(stage, Stage::Normalize);
            assert!(
                matches!(*source, PipelineError::SchemaMismatch { ref field, .. } if field == "D3N")
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(!config.database_path.exists());
    assert!(!config.export_path.exists());
}

#[test]
fn test_verify_summarizes_final_table() {
    let tmp = tempdir().unwrap();
    let config = config_in(&tmp);
    run(&config, &fixture()).unwrap();

    let summary = verify(&config).unwrap();
    assert_eq!(summary.total_rows, 8);
    assert_eq!(summary.distinct_years(), 2);
    assert_eq!(summary.latest_period.as_deref(), Some("out-nov-dez 2023"));
    assert_eq!(summary.latest_rate, Some(7.4));
    assert_eq!(summary.null_rates, 1);
    assert!((summary.mean_rate.unwrap() - 8.7).abs() < 1e-9);
}

#[test]
fn test_verify_without_final_table_fails() {
    let tmp = tempdir().unwrap();
    let config = config_in(&tmp);
    store_raw(&config, &fixture()).unwrap();

    assert!(verify(&config).is_err());
}
