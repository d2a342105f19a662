//! SQLite destination over a single connection.
//!
//! # Connection Modes
//! - File-based: `sqlite:///path/to/vocab.db` or a bare `vocab.db` path
//! - In-memory: `sqlite::memory:` or `:memory:`
//!
//! The schema name is the attached database name (`main` unless another
//! database was attached). Missing database files are never created.


use super::helpers::{column_list, mapped_columns, qualified_table, quote_ident, rows_per_statement};
use super::{CatalogColumn, Destination};
use crate::error::LoaderError;
use crate::integrity::IntegrityMode;
use crate::models::{CellValue, CoercedRecordBatch, DatabaseType};
use crate::Result;
use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqliteConnection};
use sqlx::{Connection, QueryBuilder, Row};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Default `SQLITE_MAX_VARIABLE_NUMBER` since SQLite 3.32.
pub const MAX_BIND_PARAMETERS: usize = 32_766;

/// SQLite destination holding one connection.
pub struct SqliteDestination {
    conn: SqliteConnection,
}

impl std::fmt::Debug for SqliteDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDestination").finish_non_exhaustive()
    }
}

impl SqliteDestination {
    /// Opens a SQLite database.
    ///
    /// # Errors
    /// Returns a connection error if the file does not exist or cannot be
    /// opened within `connect_timeout`.
    pub async fn connect(connection_string: &str, connect_timeout: Duration) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(connection_string)
            .map_err(LoaderError::connection_failed)?
            .create_if_missing(false);

        let conn = tokio::time::timeout(connect_timeout, SqliteConnection::connect_with(&options))
            .await
            .map_err(|_| LoaderError::Connection {
                context: format!(
                    "Timed out after {}s opening SQLite database",
                    connect_timeout.as_secs()
                ),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connect timeout elapsed",
                )),
            })?
            .map_err(LoaderError::connection_failed)?;

        Ok(Self { conn })
    }

    /// Wraps an already open connection.
    ///
    /// In-memory databases exist per connection, so tests prepare the
    /// schema on a connection and hand that same connection over.
    pub fn from_connection(conn: SqliteConnection) -> Self {
        Self { conn }
    }

    /// Access to the underlying connection.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }
}

#[async_trait]
impl Destination for SqliteDestination {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    async fn test_connection(&mut self) -> Result<()> {
        let value: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&mut self.conn)
            .await
            .map_err(LoaderError::connection_failed)?;

        if value != 1 {
            return Err(LoaderError::configuration(
                "Basic connectivity test failed: unexpected result",
            ));
        }
        Ok(())
    }

    async fn catalog_columns(&mut self, schema: &str, table: &str) -> Result<Vec<CatalogColumn>> {
        let context = || format!("reading columns of {}.{}", schema, table);
        let pragma = format!(
            "PRAGMA {}.table_info('{}')",
            quote_ident(schema),
            table.replace('\'', "''")
        );

        let rows = sqlx::query(&pragma)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| LoaderError::catalog_failed(context(), e))?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("name")?;
                let declared: String = row.try_get("type")?;
                Ok(CatalogColumn::new(name, declared.clone(), declared))
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| LoaderError::catalog_failed(context(), e))
    }

    async fn set_integrity_mode(&mut self, mode: IntegrityMode) -> Result<()> {
        let statement = match mode {
            IntegrityMode::Relaxed => "PRAGMA foreign_keys = OFF",
            IntegrityMode::Enforcing => "PRAGMA foreign_keys = ON",
        };

        sqlx::query(statement)
            .execute(&mut self.conn)
            .await
            .map_err(|e| LoaderError::query_failed(format!("setting integrity mode {}", mode), e))?;
        Ok(())
    }

    async fn truncate_table(&mut self, schema: &str, table: &str) -> Result<()> {
        let statement = format!("DELETE FROM {}", qualified_table(schema, table));
        let result = sqlx::query(&statement)
            .execute(&mut self.conn)
            .await
            .map_err(|e| LoaderError::query_failed(format!("emptying {}.{}", schema, table), e))?;

        debug!(
            "Deleted {} existing rows from {}.{}",
            result.rows_affected(),
            schema,
            table
        );
        Ok(())
    }

    async fn insert_batch(
        &mut self,
        schema: &str,
        table: &str,
        batch: &CoercedRecordBatch,
        batch_size: usize,
    ) -> Result<u64> {
        let columns = mapped_columns(batch, table)?;
        let per_statement = rows_per_statement(batch_size, columns.len(), MAX_BIND_PARAMETERS);
        let prefix = format!(
            "INSERT INTO {} ({}) ",
            qualified_table(schema, table),
            column_list(columns.iter().map(|c| c.catalog_name.as_str()))
        );
        let context = || format!("inserting into {}.{}", schema, table);

        let mut tx = self
            .conn
            .begin()
            .await
            .map_err(|e| LoaderError::query_failed(context(), e))?;

        let mut inserted = 0u64;
        for chunk in batch.rows.chunks(per_statement) {
            let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(&prefix);
            builder.push_values(chunk, |mut b, row| {
                for cell in row {
                    // SQLite is dynamically typed; an untyped NULL fits every column.
                    match cell {
                        CellValue::Text(s) => b.push_bind(s.clone()),
                        CellValue::Integer(i) => b.push_bind(*i),
                        CellValue::Date(d) => b.push_bind(*d),
                        CellValue::Null | CellValue::Invalid { .. } => b.push_bind(None::<String>),
                    };
                }
            });

            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| LoaderError::query_failed(context(), e))?;
            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| LoaderError::query_failed(context(), e))?;

        Ok(inserted)
    }
}
