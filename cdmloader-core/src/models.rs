//! Core data models for the load pipeline.
//!
//! These types describe what is loaded (`TableSpec`), what the destination
//! expects (`ColumnSchema`), and the record batches that flow between the
//! source reader, the coercion engine and the destination.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Supported destination database types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
    /// PostgreSQL via `postgres://` URLs
    PostgreSQL,
    /// SQLite database files
    SQLite,
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseType::PostgreSQL => write!(f, "PostgreSQL"),
            DatabaseType::SQLite => write!(f, "SQLite"),
        }
    }
}

/// One table in a dependency-ordered load.
///
/// The source filename is matched case-sensitively inside the source
/// directory. By default it is the upper-cased table name with a `.csv`
/// extension, which is how vocabulary bundles are distributed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Lowercased destination table name
    pub table_name: String,
    /// File expected in the source directory
    pub source_filename: String,
    /// Zero-based position in the load order
    pub ordinal: u32,
}

impl TableSpec {
    /// Creates a table spec with the default `UPPERCASE.csv` filename.
    pub fn new(table_name: impl Into<String>, ordinal: u32) -> Self {
        let table_name = table_name.into().to_lowercase();
        let source_filename = format!("{}.csv", table_name.to_uppercase());
        Self {
            table_name,
            source_filename,
            ordinal,
        }
    }

    /// Overrides the expected source filename.
    pub fn with_source_filename(mut self, source_filename: impl Into<String>) -> Self {
        self.source_filename = source_filename.into();
        self
    }
}

/// Coarse bucket a catalog data type is classified into for coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeClass {
    /// Parsed as a calendar date
    Date,
    /// Parsed as a 64-bit integer
    Integer,
    /// Passed through
    Text,
    /// Passed through as text; the engine converts it
    Other,
}

impl std::fmt::Display for TypeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeClass::Date => write!(f, "date"),
            TypeClass::Integer => write!(f, "integer"),
            TypeClass::Text => write!(f, "text"),
            TypeClass::Other => write!(f, "other"),
        }
    }
}

/// A destination column as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaColumn {
    /// Lowercased column name, the key source headers are matched on
    pub name: String,
    /// Name exactly as the catalog reports it; used in generated SQL
    pub catalog_name: String,
    pub type_class: TypeClass,
    /// Data type string as reported by the catalog
    pub data_type: String,
    /// Engine-native type name usable in a CAST
    pub native_type: String,
}

/// Expected columns of one destination table, keyed by lowercased name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSchema {
    columns: BTreeMap<String, SchemaColumn>,
}

impl ColumnSchema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column; returns false if the name was already present.
    pub fn insert(&mut self, column: SchemaColumn) -> bool {
        if self.columns.contains_key(&column.name) {
            return false;
        }
        self.columns.insert(column.name.clone(), column);
        true
    }

    /// Looks up a column by (already lowercased) name.
    pub fn get(&self, name: &str) -> Option<&SchemaColumn> {
        self.columns.get(name)
    }

    /// Type class of a column, if the column exists.
    pub fn type_class(&self, name: &str) -> Option<TypeClass> {
        self.columns.get(name).map(|c| c.type_class)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the table has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Rows read from one source file, still as raw text.
///
/// `None` is the null marker (an empty field in the source).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecordBatch {
    /// Header names in file order
    pub columns: Vec<String>,
    /// One cell per header column
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawRecordBatch {
    /// Creates an empty batch with the given header.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row; the row must have one cell per column.
    pub fn push_row(&mut self, row: Vec<Option<String>>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    /// Number of data rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Position of a column in the header.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// A single value after coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    /// Empty source field
    Null,
    /// Text, or a value of the `other` class
    Text(String),
    /// Parsed integer
    Integer(i64),
    /// Parsed date
    Date(NaiveDate),
    /// Value that could not be parsed into the column's type class
    Invalid { raw: String, expected: TypeClass },
}

impl CellValue {
    /// Whether the value failed to parse.
    pub fn is_invalid(&self) -> bool {
        matches!(self, CellValue::Invalid { .. })
    }

    /// Re-serializes the value to its canonical text form.
    ///
    /// Dates use the `YYYY-MM-DD` form; invalid values return their raw text.
    pub fn to_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Integer(i) => Some(i.to_string()),
            CellValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            CellValue::Invalid { raw, .. } => Some(raw.clone()),
        }
    }
}

/// A column of a coerced batch and the destination column it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercedColumn {
    /// Source header name
    pub name: String,
    /// `None` when the destination table has no such column
    pub mapping: Option<SchemaColumn>,
}

impl CoercedColumn {
    /// Whether the destination has this column.
    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    /// Type class used for binding; unmapped columns travel as text.
    pub fn type_class(&self) -> TypeClass {
        self.mapping
            .as_ref()
            .map_or(TypeClass::Text, |m| m.type_class)
    }
}

/// Rows converted according to a `ColumnSchema`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoercedRecordBatch {
    /// Columns in source order
    pub columns: Vec<CoercedColumn>,
    /// One cell per column
    pub rows: Vec<Vec<CellValue>>,
    /// Count of values that failed to parse, per column
    pub failed_values: BTreeMap<String, usize>,
}

impl CoercedRecordBatch {
    /// Number of data rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Names of columns with no destination counterpart.
    pub fn unmapped_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !c.is_mapped())
            .map(|c| c.name.clone())
            .collect()
    }

    /// Number of columns with a destination counterpart.
    pub fn mapped_column_count(&self) -> usize {
        self.columns.iter().filter(|c| c.is_mapped()).count()
    }

    /// Total number of values that failed coercion.
    pub fn failure_count(&self) -> usize {
        self.failed_values.values().sum()
    }

    /// Drops unmapped columns, keeping row order and the remaining cells.
    pub fn into_mapped(self) -> Self {
        let keep: Vec<bool> = self.columns.iter().map(CoercedColumn::is_mapped).collect();
        if keep.iter().all(|k| *k) {
            return self;
        }

        let columns = self
            .columns
            .into_iter()
            .filter(CoercedColumn::is_mapped)
            .collect();
        let rows = self
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(keep.iter())
                    .filter_map(|(cell, keep)| keep.then_some(cell))
                    .collect()
            })
            .collect();

        Self {
            columns,
            rows,
            failed_values: self.failed_values,
        }
    }
}

#[cfg(test)]
#[path = "models_tests.rs"]
mod tests;
