//! Delimited source file reading.
//!
//! Files are read whole into a [`RawRecordBatch`]. An empty field becomes
//! the null marker; every record must have as many fields as the header.

use crate::config::SourceFormat;
use crate::error::{LoaderError, Result};
use crate::models::RawRecordBatch;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Finds `filename` in `directory` by exact, case-sensitive name.
///
/// The directory listing is compared rather than probing the path, so a
/// case-insensitive filesystem does not match `concept.csv` for
/// `CONCEPT.csv`.
///
/// # Errors
/// Returns an I/O error if the directory cannot be listed.
pub async fn resolve_source_file(directory: &Path, filename: &str) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(directory).await.map_err(|e| {
        LoaderError::io(format!("listing source directory {}", directory.display()), e)
    })?;

    while let Some(entry) = entries.next_entry().await.map_err(|e| {
        LoaderError::io(format!("listing source directory {}", directory.display()), e)
    })? {
        if entry.file_name().to_str() == Some(filename) {
            let path = entry.path();
            let is_file = tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            if is_file {
                return Ok(Some(path));
            }
        }
    }

    Ok(None)
}

/// Reads a whole delimited file with a header row.
///
/// Headers are trimmed, and lowercased when `normalize_headers` is set.
///
/// # Errors
/// Returns `SourceRead` for unreadable files, invalid UTF-8 and records
/// whose field count differs from the header, and an I/O error for repeated
/// header names.
pub fn read_delimited(
    path: &Path,
    format: &SourceFormat,
    normalize_headers: bool,
) -> Result<RawRecordBatch> {
    let source_error = |source: csv::Error| LoaderError::SourceRead {
        path: path.display().to_string(),
        source,
    };

    let mut builder = csv::ReaderBuilder::new();
    builder
        .delimiter(format.delimiter_byte())
        .has_headers(true)
        .flexible(false);
    match format.quote_byte() {
        Some(quote) => builder.quoting(true).quote(quote),
        None => builder.quoting(false),
    };

    let mut reader = builder.from_path(path).map_err(source_error)?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(source_error)?
        .iter()
        .map(|h| {
            let h = h.trim();
            if normalize_headers {
                h.to_lowercase()
            } else {
                h.to_string()
            }
        })
        .collect();

    let mut seen = HashSet::with_capacity(columns.len());
    if let Some(duplicate) = columns.iter().find(|c| !seen.insert(c.as_str())) {
        return Err(LoaderError::io(
            format!("reading header of {}", path.display()),
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("column '{}' appears more than once", duplicate),
            ),
        ));
    }

    let mut batch = RawRecordBatch::new(columns);
    for record in reader.records() {
        let record = record.map_err(source_error)?;
        batch.push_row(
            record
                .iter()
                .map(|field| (!field.is_empty()).then(|| field.to_string()))
                .collect(),
        );
    }

    debug!(
        "Read {} rows with {} columns from {}",
        batch.row_count(),
        batch.columns.len(),
        path.display()
    );
    Ok(batch)
}
