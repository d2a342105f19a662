//! Per-table outcomes and the run report.
//!
//! A run always produces one `TableReport` per configured table, even under
//! partial failure. Callers inspect the report rather than relying on a
//! single raised error.

use crate::error::LoaderError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Machine-readable category of a table failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Destination table missing from the catalog
    SchemaNotFound,
    /// Catalog query failed
    Catalog,
    /// Source file unreadable or malformed
    SourceRead,
    /// Insert failed; the table was rolled back
    Insert,
    /// Unmapped source columns under strict mode
    UnmappedColumns,
    /// No source column matched the destination
    NoMappedColumns,
    /// The table's load panicked
    Panicked,
    /// Any other error
    Other,
}

/// Why a table load failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadFailure {
    /// Category of the failure
    pub kind: FailureKind,
    /// Error message with its causes, credentials removed
    pub message: String,
}

impl LoadFailure {
    /// Creates a failure record.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&LoaderError> for LoadFailure {
    fn from(error: &LoaderError) -> Self {
        let kind = match error {
            LoaderError::SchemaNotFound { .. } => FailureKind::SchemaNotFound,
            LoaderError::Catalog { .. } => FailureKind::Catalog,
            LoaderError::SourceRead { .. } | LoaderError::Io { .. } => FailureKind::SourceRead,
            LoaderError::QueryExecution { .. } | LoaderError::Connection { .. } => {
                FailureKind::Insert
            }
            LoaderError::UnmappedColumns { .. } => FailureKind::UnmappedColumns,
            LoaderError::NoMappedColumns { .. } => FailureKind::NoMappedColumns,
            LoaderError::Configuration { .. }
            | LoaderError::UnsupportedFeature { .. }
            | LoaderError::Serialization { .. } => FailureKind::Other,
        };
        Self::new(kind, error.chain_message())
    }
}

/// Why a table was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The expected source file is not in the directory
    FileNotFound,
}

/// Result of loading one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadOutcome {
    /// All rows inserted
    Loaded { rows: u64 },
    /// Nothing attempted
    Skipped { reason: SkipReason },
    /// Table failed; nothing was inserted
    Failed { error: LoadFailure },
}

impl LoadOutcome {
    /// Whether the table failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, LoadOutcome::Failed { .. })
    }

    /// Whether the table was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self, LoadOutcome::Skipped { .. })
    }

    /// Kind of failure, if the table failed.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            LoadOutcome::Failed { error } => Some(error.kind),
            _ => None,
        }
    }
}

/// Outcome of one table plus the non-fatal issues seen while loading it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    /// Destination table name
    pub table: String,
    /// Expected source filename
    pub source_file: String,
    /// What happened to the table
    pub outcome: LoadOutcome,
    /// Non-fatal problems, such as a failed truncation
    pub warnings: Vec<String>,
    /// Wall time spent on the table
    pub elapsed_ms: u64,
}

/// Failure to toggle referential-integrity enforcement.
///
/// An `EnableFailed` warning means the session may still have foreign-key
/// checks relaxed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "toggle", rename_all = "snake_case")]
pub enum IntegrityWarning {
    /// Relaxing integrity failed; the load ran with checks active
    DisableFailed { message: String },
    /// Restoring integrity failed; the session may still be relaxed
    EnableFailed { message: String },
}

impl std::fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityWarning::DisableFailed { message } => {
                write!(f, "failed to relax referential integrity: {}", message)
            }
            IntegrityWarning::EnableFailed { message } => write!(
                f,
                "failed to restore referential integrity, enforcement may still be relaxed: {}",
                message
            ),
        }
    }
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    /// No table failed
    Success,
    /// At least one table failed
    Failed,
}

/// Ordered outcomes of one `load_all` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Destination schema
    pub schema: String,
    /// Directory the files were read from
    pub source_directory: String,
    /// One report per table, in load order
    pub tables: Vec<TableReport>,
    /// Problems toggling referential integrity
    pub integrity_warnings: Vec<IntegrityWarning>,
    /// When the run began
    pub started_at: DateTime<Utc>,
    /// Wall time of the whole run
    pub elapsed_ms: u64,
}

impl LoadReport {
    /// Creates an empty report for a run starting now.
    pub fn new(schema: impl Into<String>, source_directory: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            source_directory: source_directory.into(),
            tables: Vec::new(),
            integrity_warnings: Vec::new(),
            started_at: Utc::now(),
            elapsed_ms: 0,
        }
    }

    /// Success iff no table failed. Skipped tables do not fail the run.
    pub fn status(&self) -> LoadStatus {
        if self.tables.iter().any(|t| t.outcome.is_failed()) {
            LoadStatus::Failed
        } else {
            LoadStatus::Success
        }
    }

    /// Whether no table failed; skipped tables still count as success.
    pub fn is_success(&self) -> bool {
        self.status() == LoadStatus::Success
    }

    /// Number of tables loaded.
    pub fn loaded_count(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| matches!(t.outcome, LoadOutcome::Loaded { .. }))
            .count()
    }

    /// Number of tables skipped.
    pub fn skipped_count(&self) -> usize {
        self.tables.iter().filter(|t| t.outcome.is_skipped()).count()
    }

    /// Number of tables failed.
    pub fn failed_count(&self) -> usize {
        self.tables.iter().filter(|t| t.outcome.is_failed()).count()
    }

    /// Total rows inserted across loaded tables.
    pub fn rows_loaded(&self) -> u64 {
        self.tables
            .iter()
            .map(|t| match t.outcome {
                LoadOutcome::Loaded { rows } => rows,
                _ => 0,
            })
            .sum()
    }

    /// Source files that were expected but not present.
    pub fn missing_files(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| t.outcome.is_skipped())
            .map(|t| t.source_file.as_str())
            .collect()
    }

    /// Report for a given table, if it was part of the run.
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }
}
