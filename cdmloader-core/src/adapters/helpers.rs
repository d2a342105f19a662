//! Helper utilities shared by destination implementations.

use crate::error::{LoaderError, Result};
use crate::models::{CoercedRecordBatch, SchemaColumn};

/// Quotes an identifier for interpolation into SQL.
///
/// Identifiers are validated before they reach an adapter; embedded double
/// quotes are still doubled so the output is always a single identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"schema"."table"`
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Comma-separated quoted column list.
pub fn column_list<'a>(columns: impl IntoIterator<Item = &'a str>) -> String {
    columns
        .into_iter()
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rows per INSERT statement.
///
/// At most `batch_size`, and small enough that `rows * column_count` bind
/// parameters stay within the engine limit. Never returns 0.
pub fn rows_per_statement(batch_size: usize, column_count: usize, max_bind_parameters: usize) -> usize {
    let by_parameters = max_bind_parameters / column_count.max(1);
    batch_size.min(by_parameters).max(1)
}

/// Destination columns of a batch, in batch order.
///
/// # Errors
/// Returns `UnmappedColumns` if any column has no destination counterpart
/// and `NoMappedColumns` if the batch has no columns at all.
pub fn mapped_columns<'a>(batch: &'a CoercedRecordBatch, table: &str) -> Result<Vec<&'a SchemaColumn>> {
    let unmapped = batch.unmapped_columns();
    if !unmapped.is_empty() {
        return Err(LoaderError::UnmappedColumns {
            table: table.to_string(),
            columns: unmapped,
        });
    }

    let columns: Vec<&SchemaColumn> = batch
        .columns
        .iter()
        .filter_map(|c| c.mapping.as_ref())
        .collect();
    if columns.is_empty() {
        return Err(LoaderError::NoMappedColumns {
            table: table.to_string(),
        });
    }
    Ok(columns)
}
