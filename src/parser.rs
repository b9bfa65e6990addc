//! JSON parser for statistical API responses.
//!
//! The API answers with a JSON array whose first element is the header. Two
//! shapes are accepted:
//!
//! - array of arrays: row 0 holds column names, later rows hold values by position;
//! - array of objects: row 0 maps column codes to human descriptions, later
//!   rows map the same codes to values. The codes become the header.

use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::records::RawTable;

/// Decodes a raw JSON body into a [`RawTable`].
///
/// # Errors
///
/// Returns [`PipelineError::Payload`] if the body is not JSON, not an array,
/// or mixes row shapes. An empty array yields an empty table.
pub fn parse_table(bytes: &[u8]) -> Result<RawTable> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| PipelineError::Payload {
        reason: e.to_string(),
    })?;

    let Value::Array(rows) = value else {
        return Err(payload("top-level value is not an array"));
    };

    let Some(first) = rows.first() else {
        return Ok(RawTable::default());
    };

    match first {
        Value::Array(header) => parse_positional(header, &rows[1..]),
        Value::Object(header) => {
            let columns: Vec<String> = header.keys().cloned().collect();
            parse_keyed(columns, &rows[1..])
        }
        _ => Err(payload("header row is neither an array nor an object")),
    }
}

fn payload(reason: &str) -> PipelineError {
    PipelineError::Payload {
        reason: reason.to_string(),
    }
}

fn parse_positional(header: &[Value], rows: &[Value]) -> Result<RawTable> {
    let header: Vec<String> = header.iter().map(cell_to_string).collect();

    let mut out = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let Value::Array(cells) = row else {
            return Err(PipelineError::Payload {
                reason: format!("row {} is not an array", i + 1),
            });
        };
        let mut cells: Vec<String> = cells.iter().map(cell_to_string).collect();
        // Short rows are padded so every row is header-aligned.
        cells.resize(header.len(), String::new());
        out.push(cells);
    }

    Ok(RawTable::new(header, out))
}

fn parse_keyed(columns: Vec<String>, rows: &[Value]) -> Result<RawTable> {
    let mut out = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let Value::Object(fields) = row else {
            return Err(PipelineError::Payload {
                reason: format!("row {} is not an object", i + 1),
            });
        };
        out.push(
            columns
                .iter()
                .map(|c| fields.get(c).map(cell_to_string).unwrap_or_default())
                .collect(),
        );
    }

    Ok(RawTable::new(columns, out))
}

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
