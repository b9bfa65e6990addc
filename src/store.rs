//! SQLite-backed table store with replace semantics.
//!
//! A [`Store`] owns one connection for the whole run; dropping it closes the
//! connection on every exit path.

use rusqlite::{Connection, params_from_iter};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{PipelineError, Result, Stage};
use crate::table::{Column, ColumnKind, Table, Value};

pub struct Store {
    conn: Connection,
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl Store {
    /// Opens (or creates) the database file, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| PipelineError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path).map_err(|source| PipelineError::Store {
            stage: Stage::Persist,
            table: String::new(),
            source,
        })?;
        debug!(path = %path.display(), "Opened store");
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| PipelineError::Store {
            stage: Stage::Persist,
            table: String::new(),
            source,
        })?;
        Ok(Self { conn })
    }

    /// Drops `name` and recreates it with the table's exact schema and rows,
    /// inside a single transaction.
    pub fn replace_table(&mut self, name: &str, table: &Table) -> Result<()> {
        if table.columns.is_empty() {
            return Err(PipelineError::NoColumns {
                table: name.to_string(),
            });
        }
        let err = |source| PipelineError::Store {
            stage: Stage::Persist,
            table: name.to_string(),
            source,
        };

        let tx = self.conn.transaction().map_err(err)?;
        tx.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)), [])
            .map_err(err)?;

        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.kind.sql_type()))
            .collect();
        tx.execute(
            &format!("CREATE TABLE {} ({})", quote_ident(name), columns.join(", ")),
            [],
        )
        .map_err(err)?;

        {
            let placeholders = vec!["?"; table.columns.len()].join(", ");
            let sql = format!("INSERT INTO {} VALUES ({})", quote_ident(name), placeholders);
            let mut stmt = tx.prepare(&sql).map_err(err)?;
            for row in &table.rows {
                stmt.execute(params_from_iter(row.iter())).map_err(err)?;
            }
        }

        tx.commit().map_err(err)?;
        info!(table = name, rows = table.len(), "Replaced table");
        Ok(())
    }

    /// Reads every row of `name` in insertion order.
    pub fn read_table(&self, name: &str) -> Result<Table> {
        let err = |source| PipelineError::Store {
            stage: Stage::Persist,
            table: name.to_string(),
            source,
        };

        let columns = self.table_columns(name)?;
        let sql = format!("SELECT * FROM {} ORDER BY rowid", quote_ident(name));
        let mut stmt = self.conn.prepare(&sql).map_err(err)?;
        let width = columns.len();

        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })
            .map_err(err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(err)?;

        debug!(table = name, rows = rows.len(), "Read table");
        Ok(Table { columns, rows })
    }

    #[cfg(test)]
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count > 0)
            .map_err(|source| PipelineError::Store {
                stage: Stage::Persist,
                table: name.to_string(),
                source,
            })
    }

    fn table_columns(&self, name: &str) -> Result<Vec<Column>> {
        let err = |source| PipelineError::Store {
            stage: Stage::Persist,
            table: name.to_string(),
            source,
        };

        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(name)))
            .map_err(err)?;
        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let decl: String = row.get(2)?;
                Ok(Column::new(name, column_kind(&decl)))
            })
            .map_err(err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(err)?;

        if columns.is_empty() {
            return Err(err(rusqlite::Error::QueryReturnedNoRows));
        }
        Ok(columns)
    }
}

fn column_kind(decl: &str) -> ColumnKind {
    match decl.to_ascii_uppercase().as_str() {
        "INTEGER" => ColumnKind::Integer,
        "REAL" => ColumnKind::Real,
        _ => ColumnKind::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(rows: usize) -> Table {
        Table {
            columns: vec![
                Column::new("period", ColumnKind::Text),
                Column::new("year", ColumnKind::Integer),
                Column::new("rate", ColumnKind::Real),
            ],
            rows: (0..rows)
                .map(|i| {
                    vec![
                        Value::Text(format!("p{i}")),
                        Value::Integer(2020 + i as i64),
                        if i % 2 == 0 { Value::Real(8.5) } else { Value::Null },
                    ]
                })
                .collect(),
        }
    }

    #[test]
    fn test_replace_then_read_preserves_rows_and_order() {
        let mut store = Store::open_in_memory().unwrap();
        let table = sample(5);
        store.replace_table("dashboard", &table).unwrap();

        assert_eq!(store.read_table("dashboard").unwrap(), table);
    }

    #[test]
    fn test_replace_discards_previous_content() {
        let mut store = Store::open_in_memory().unwrap();
        store.replace_table("dashboard", &sample(5)).unwrap();
        store.replace_table("dashboard", &sample(2)).unwrap();

        assert_eq!(store.read_table("dashboard").unwrap().len(), 2);
    }

    #[test]
    fn test_replace_recreates_schema() {
        let mut store = Store::open_in_memory().unwrap();
        store.replace_table("t", &sample(1)).unwrap();

        let narrower = Table {
            columns: vec![Column::new("only", ColumnKind::Text)],
            rows: vec![vec![Value::Text("x".into())]],
        };
        store.replace_table("t", &narrower).unwrap();
        assert_eq!(store.read_table("t").unwrap(), narrower);
    }

    #[test]
    fn test_replace_without_columns_is_rejected() {
        let mut store = Store::open_in_memory().unwrap();
        let err = store.replace_table("raw", &Table::default()).unwrap_err();
        assert!(matches!(err, PipelineError::NoColumns { .. }));
    }

    #[test]
    fn test_read_missing_table_is_store_error() {
        let store = Store::open_in_memory().unwrap();
        let err = store.read_table("missing").unwrap_err();
        assert!(matches!(err, PipelineError::Store { ref table, .. } if table == "missing"));
        assert!(!store.table_exists("missing").unwrap());
    }

    #[test]
    fn test_open_creates_parent_dirs_and_persists() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested/dir/analysis.db");

        {
            let mut store = Store::open(&path).unwrap();
            store.replace_table("raw", &sample(3)).unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert!(store.table_exists("raw").unwrap());
        assert_eq!(store.read_table("raw").unwrap().len(), 3);
    }
}
