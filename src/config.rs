use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

pub const DEFAULT_SOURCE_URL: &str =
    "https://apisidra.ibge.gov.br/values/t/6381/n1/all/v/4099/p/all";

/// Names of the tables written by a run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TableNames {
    /// Source rows exactly as fetched.
    pub raw: String,
    /// Normalized, canonical-quarter rows.
    pub normalized: String,
    /// Final derived dataset read by visualization tools.
    pub derived: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            raw: "pnad_historico".to_string(),
            normalized: "powerbi_otimizado".to_string(),
            derived: "dashboard_pnad".to_string(),
        }
    }
}

/// Everything a run needs to know about where data comes from and goes to.
///
/// Stored as a JSON object on disk; every key is optional:
/// ```json
/// {
///   "source_url": "https://apisidra.ibge.gov.br/values/t/6381/n1/all/v/4099/p/all",
///   "database_path": "data/ibge_analise.db",
///   "tables": { "raw": "pnad_historico", "derived": "dashboard_pnad" },
///   "export_path": "data/pnad_powerbi_pronto.csv"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source_url: String,
    pub database_path: PathBuf,
    pub tables: TableNames,
    pub export_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            database_path: PathBuf::from("data/ibge_analise.db"),
            tables: TableNames::default(),
            export_path: PathBuf::from("data/pnad_powerbi_pronto.csv"),
        }
    }
}

impl PipelineConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| PipelineError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let tables = [&self.tables.raw, &self.tables.normalized, &self.tables.derived];
        if tables.iter().any(|t| t.trim().is_empty()) {
            return Err(PipelineError::Config {
                path: path.to_path_buf(),
                reason: "table names must not be empty".to_string(),
            });
        }
        if tables[0] == tables[1] || tables[0] == tables[2] || tables[1] == tables[2] {
            return Err(PipelineError::Config {
                path: path.to_path_buf(),
                reason: "table names must be distinct".to_string(),
            });
        }
        Ok(())
    }
}
