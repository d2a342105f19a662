//! Per-table load: truncate, read, inspect, coerce, insert.

use crate::adapters::Destination;
use crate::coercion::coerce;
use crate::config::LoadOptions;
use crate::error::{LoaderError, Result};
use crate::inspector::get_table_schema;
use crate::models::TableSpec;
use crate::report::{LoadFailure, LoadOutcome, SkipReason, TableReport};
use crate::source::{read_delimited, resolve_source_file};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Loads single tables with a fixed set of options.
#[derive(Debug, Clone, Default)]
pub struct TableLoader {
    options: LoadOptions,
}

impl TableLoader {
    /// Creates a loader using `options` for every table.
    pub fn new(options: LoadOptions) -> Self {
        Self { options }
    }

    /// Options applied to each table.
    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Loads one table and reports what happened.
    ///
    /// Never returns an error: a missing source file is `Skipped`, anything
    /// that goes wrong after that is `Failed`. Non-fatal issues (truncation
    /// failure, unparsable values, ignored columns) are collected as
    /// warnings on the report.
    pub async fn load_table(
        &self,
        destination: &mut dyn Destination,
        table: &TableSpec,
        source_directory: &Path,
        schema_name: &str,
    ) -> TableReport {
        let started = Instant::now();
        let mut warnings = Vec::new();

        let outcome = match self
            .try_load(destination, table, source_directory, schema_name, &mut warnings)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    "Failed to load {}.{}: {}",
                    schema_name,
                    table.table_name,
                    e.chain_message()
                );
                LoadOutcome::Failed {
                    error: LoadFailure::from(&e),
                }
            }
        };

        TableReport {
            table: table.table_name.clone(),
            source_file: table.source_filename.clone(),
            outcome,
            warnings,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    async fn try_load(
        &self,
        destination: &mut dyn Destination,
        table: &TableSpec,
        source_directory: &Path,
        schema_name: &str,
        warnings: &mut Vec<String>,
    ) -> Result<LoadOutcome> {
        let Some(path) = resolve_source_file(source_directory, &table.source_filename).await?
        else {
            info!(
                "Source file {} not found, skipping {}",
                table.source_filename, table.table_name
            );
            return Ok(LoadOutcome::Skipped {
                reason: SkipReason::FileNotFound,
            });
        };

        if self.options.truncate_before_load {
            if let Err(e) = destination
                .truncate_table(schema_name, &table.table_name)
                .await
            {
                let message = format!("truncation failed: {}", e.chain_message());
                warn!("{}.{}: {}", schema_name, table.table_name, message);
                warnings.push(message);
            }
        }

        let format = self.options.format;
        let normalize_headers = self.options.case_normalize_headers;
        let read_path = path.clone();
        let raw = match tokio::task::spawn_blocking(move || {
            read_delimited(&read_path, &format, normalize_headers)
        })
        .await
        {
            Ok(result) => result?,
            // Re-raised so the orchestrator records the table as panicked
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                return Err(LoaderError::io(
                    format!("reading {}", path.display()),
                    std::io::Error::other(e),
                ));
            }
        };
        debug!("{}: {} source rows", table.table_name, raw.row_count());

        let schema = get_table_schema(destination, schema_name, &table.table_name).await?;
        let mut batch = coerce(raw, &schema);

        for (column, count) in &batch.failed_values {
            warnings.push(format!(
                "{} values in column '{}' could not be parsed and were inserted as NULL",
                count, column
            ));
        }

        let unmapped = batch.unmapped_columns();
        if !unmapped.is_empty() {
            if self.options.strict_unmapped_columns {
                return Err(LoaderError::UnmappedColumns {
                    table: table.table_name.clone(),
                    columns: unmapped,
                });
            }
            let message = format!(
                "ignored source columns with no destination column: {}",
                unmapped.join(", ")
            );
            warn!("{}.{}: {}", schema_name, table.table_name, message);
            warnings.push(message);
            batch = batch.into_mapped();
        }

        if batch.mapped_column_count() == 0 {
            return Err(LoaderError::NoMappedColumns {
                table: table.table_name.clone(),
            });
        }

        let rows = destination
            .insert_batch(
                schema_name,
                &table.table_name,
                &batch,
                self.options.batch_size,
            )
            .await?;

        info!("Loaded {} rows into {}.{}", rows, schema_name, table.table_name);
        Ok(LoadOutcome::Loaded { rows })
    }
}
