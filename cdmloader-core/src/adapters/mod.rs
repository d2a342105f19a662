//! Destination trait and factory for the supported database engines.
//!
//! Every engine is driven through [`Destination`], which exposes exactly the
//! operations the load pipeline needs: a catalog lookup, the session-scoped
//! referential-integrity switch, truncation and transactional bulk insert.
//!
//! # Module Structure
//! - `helpers`: identifier quoting and statement sizing shared by adapters
//! - Engine-specific modules (`postgres`, `sqlite`)
//!
//! # Object Safety
//! The trait is object-safe; the orchestrator owns a `Box<dyn Destination>`
//! so tests can substitute an in-memory double.

use crate::Result;
use crate::error::LoaderError;
use crate::integrity::IntegrityMode;
use crate::models::{CoercedRecordBatch, DatabaseType};
use async_trait::async_trait;
use std::time::Duration;

pub mod helpers;

#[cfg(feature = "postgresql")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

/// One column row from the destination catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    /// Column name as stored in the catalog
    pub name: String,
    /// Data type string as the catalog reports it
    pub data_type: String,
    /// Engine-native type name usable in a CAST
    pub native_type: String,
}

impl CatalogColumn {
    /// Creates a catalog column.
    pub fn new(
        name: impl Into<String>,
        data_type: impl Into<String>,
        native_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            native_type: native_type.into(),
        }
    }
}

/// A database the loader writes into.
///
/// Implementations hold a single session: the integrity mode set through
/// [`Destination::set_integrity_mode`] must apply to every later truncate and
/// insert on the same value.
///
/// # Security
/// - Connection strings are sanitized in error messages
/// - Schema and table names are validated identifiers and always quoted
/// - Values are always bound, never interpolated
#[async_trait]
pub trait Destination: Send {
    /// Returns the database type this destination handles.
    fn database_type(&self) -> DatabaseType;

    /// Round-trips a trivial query.
    ///
    /// # Errors
    /// Returns a connection error if the session is unusable
    async fn test_connection(&mut self) -> Result<()>;

    /// Columns of `schema.table` in ordinal order; empty if the table does
    /// not exist.
    ///
    /// # Errors
    /// Returns `LoaderError::Catalog` if the catalog query fails
    async fn catalog_columns(&mut self, schema: &str, table: &str) -> Result<Vec<CatalogColumn>>;

    /// Switches foreign-key enforcement for the rest of the session.
    async fn set_integrity_mode(&mut self, mode: IntegrityMode) -> Result<()>;

    /// Deletes every row of `schema.table`.
    async fn truncate_table(&mut self, schema: &str, table: &str) -> Result<()>;

    /// Inserts the batch in one transaction, at most `batch_size` rows per
    /// statement. Every column of the batch must be mapped. Returns the
    /// number of rows inserted; on error nothing is committed.
    async fn insert_batch(
        &mut self,
        schema: &str,
        table: &str,
        batch: &CoercedRecordBatch,
        batch_size: usize,
    ) -> Result<u64>;
}

/// Opens a destination for a connection URL.
///
/// # Security
/// The URL is never logged or included in errors unredacted.
///
/// # Errors
/// Returns error if:
/// - The URL format is not recognized
/// - The engine was not compiled in
/// - The connection cannot be established within `connect_timeout`
pub async fn create_destination(
    connection_string: &str,
    connect_timeout: Duration,
) -> Result<Box<dyn Destination>> {
    let database_type = detect_database_type(connection_string)?;
    tracing::debug!(
        "Connecting to {} destination at {}",
        database_type,
        crate::error::redact_database_url(connection_string)
    );

    match database_type {
        #[cfg(feature = "postgresql")]
        DatabaseType::PostgreSQL => {
            let destination =
                postgres::PostgresDestination::connect(connection_string, connect_timeout).await?;
            Ok(Box::new(destination))
        }
        #[cfg(not(feature = "postgresql"))]
        DatabaseType::PostgreSQL => Err(LoaderError::unsupported_feature(
            "PostgreSQL destination",
            "Compile with --features postgresql to enable PostgreSQL support",
        )),
        #[cfg(feature = "sqlite")]
        DatabaseType::SQLite => {
            let destination =
                sqlite::SqliteDestination::connect(connection_string, connect_timeout).await?;
            Ok(Box::new(destination))
        }
        #[cfg(not(feature = "sqlite"))]
        DatabaseType::SQLite => Err(LoaderError::unsupported_feature(
            "SQLite destination",
            "Compile with --features sqlite to enable SQLite support",
        )),
    }
}

/// Detects the destination engine from a connection string.
///
/// # Errors
/// Returns error if connection string format is unrecognized
pub fn detect_database_type(connection_string: &str) -> Result<DatabaseType> {
    if connection_string.starts_with("postgres://")
        || connection_string.starts_with("postgresql://")
    {
        Ok(DatabaseType::PostgreSQL)
    } else if connection_string.starts_with("sqlite:")
        || connection_string == ":memory:"
        || connection_string.ends_with(".db")
        || connection_string.ends_with(".sqlite")
        || connection_string.ends_with(".sqlite3")
    {
        Ok(DatabaseType::SQLite)
    } else {
        Err(LoaderError::configuration(
            "Unrecognized database connection string format",
        ))
    }
}
