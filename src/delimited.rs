//! Helper for loading delimited text files into JSON-style rows.
//!
//! The first row is the header row; every following row becomes a map of
//! header name to trimmed cell text. Not used by the orchestration core.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::Result;

pub const DEFAULT_SEPARATOR: char = ',';

/// Read every non-blank line of `path` as a row of raw cells.
pub fn read_rows(path: impl AsRef<Path>, separator: char) -> Result<Vec<Vec<String>>> {
    let contents = std::fs::read_to_string(path)?;

    Ok(contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split(separator).map(str::to_string).collect())
        .collect())
}

/// Read `path` as a table: the first row names the columns, each later row
/// becomes one map. Missing or empty header names fall back to
/// `column_{n}` (1-based), as do cells beyond the header row's width. Cell
/// values and header names are trimmed.
pub fn read_file(path: impl AsRef<Path>, separator: char) -> Result<Vec<Map<String, Value>>> {
    let rows = read_rows(path, separator)?;
    let Some((headers, data_rows)) = rows.split_first() else {
        return Ok(Vec::new());
    };

    let mut contents = Vec::with_capacity(data_rows.len());
    for row in data_rows {
        if row.is_empty() {
            continue;
        }

        let mut content = Map::new();
        for (index, cell) in row.iter().enumerate() {
            let name = headers
                .get(index)
                .map(|header| header.trim())
                .filter(|header| !header.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("column_{}", index + 1));
            content.insert(name, Value::String(cell.trim().to_string()));
        }
        contents.push(content);
    }

    Ok(contents)
}
