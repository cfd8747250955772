//! JSON Lines dataset IO.

use crate::error::EvalError;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Read one JSON value per non-blank line.
pub fn read_jsonl(path: &Path) -> Result<Vec<Value>, EvalError> {
    let text = fs::read_to_string(path)?;
    parse_jsonl(&text)
}

/// Parse JSON Lines text; line numbers in errors are 1-based.
pub fn parse_jsonl(text: &str) -> Result<Vec<Value>, EvalError> {
    let mut rows = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value = serde_json::from_str(line).map_err(|e| EvalError::Dataset {
            line: i + 1,
            message: e.to_string(),
        })?;
        rows.push(value);
    }
    debug!(rows = rows.len(), "Parsed JSONL");
    Ok(rows)
}

/// Write one compact JSON value per line.
pub fn write_jsonl<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), EvalError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(fs::File::create(path)?);
    for row in rows {
        serde_json::to_writer(&mut out, row)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
