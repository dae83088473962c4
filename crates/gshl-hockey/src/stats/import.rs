// Bulk import of raw stat lines from CSV exports of the league sheets.
//
// Every cell is kept as a string; typed extraction (`schema::parse_stats`)
// and classification read them leniently later. Empty cells are dropped so
// that field-presence checks behave the same as for sparse JSON rows.

use std::io::Read;
use std::path::Path;

use gshl_core::Record;
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },
}

/// Read stat lines from any CSV reader. Malformed rows are skipped with a
/// warning; a missing or unreadable header row is an error.
pub fn load_stat_lines_from_reader<R: Read>(rdr: R) -> Result<Vec<Record>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(rdr);
    let headers = reader.headers()?.clone();
    let mut lines = Vec::new();
    for (row, result) in reader.records().enumerate() {
        match result {
            Ok(raw) => {
                let record: Record = headers
                    .iter()
                    .zip(raw.iter())
                    .filter(|(_, cell)| !cell.trim().is_empty())
                    .map(|(name, cell)| {
                        (name.trim().to_string(), Value::String(cell.trim().to_string()))
                    })
                    .collect();
                if !record.is_empty() {
                    lines.push(record);
                }
            }
            Err(e) => warn!("skipping malformed stat row {}: {}", row + 1, e),
        }
    }
    Ok(lines)
}

/// Read stat lines from a CSV file on disk.
pub fn load_stat_lines_from_csv(path: &Path) -> Result<Vec<Record>, ImportError> {
    let path_str = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|source| ImportError::Io {
        path: path_str.clone(),
        source,
    })?;
    let lines = load_stat_lines_from_reader(file).map_err(|source| ImportError::Csv {
        path: path_str.clone(),
        source,
    })?;
    info!("imported {} stat lines from {}", lines.len(), path_str);
    Ok(lines)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
