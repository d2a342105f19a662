//! PostgreSQL destination over a single session.
//!
//! # Module Structure
//! - `insert`: multi-row INSERT construction with per-type binding
//!
//! The integrity switch (`session_replication_role`) is a session setting,
//! so the destination owns one `PgConnection` rather than a pool.

mod insert;


use super::helpers::{mapped_columns, qualified_table, rows_per_statement};
use super::{CatalogColumn, Destination};
use crate::error::LoaderError;
use crate::integrity::IntegrityMode;
use crate::models::{CoercedRecordBatch, DatabaseType};
use crate::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Row};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Protocol limit on bind parameters per statement.
pub const MAX_BIND_PARAMETERS: usize = 65_535;

const CATALOG_QUERY: &str = r"
    SELECT column_name::text AS column_name,
           data_type::text   AS data_type,
           udt_name::text    AS udt_name
    FROM information_schema.columns
    WHERE table_schema = $1 AND table_name = $2
    ORDER BY ordinal_position";

/// PostgreSQL destination holding one session.
pub struct PostgresDestination {
    conn: PgConnection,
}

impl std::fmt::Debug for PostgresDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDestination").finish_non_exhaustive()
    }
}

impl PostgresDestination {
    /// Connects to PostgreSQL.
    ///
    /// # Security
    /// Errors never include the connection string.
    ///
    /// # Errors
    /// Returns a connection error if the URL is malformed, the server is
    /// unreachable, or `connect_timeout` elapses.
    pub async fn connect(connection_string: &str, connect_timeout: Duration) -> Result<Self> {
        let options = PgConnectOptions::from_str(connection_string)
            .map_err(LoaderError::connection_failed)?
            .application_name("cdmloader");

        let conn = tokio::time::timeout(connect_timeout, PgConnection::connect_with(&options))
            .await
            .map_err(|_| LoaderError::Connection {
                context: format!(
                    "Timed out after {}s connecting to PostgreSQL",
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

    /// Wraps an already open session.
    pub fn from_connection(conn: PgConnection) -> Self {
        Self { conn }
    }

    /// Closes the session gracefully.
    pub async fn close(self) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(LoaderError::connection_failed)
    }
}

#[async_trait]
impl Destination for PostgresDestination {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    async fn test_connection(&mut self) -> Result<()> {
        let value: i32 = sqlx::query_scalar("SELECT 1")
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

        let rows = sqlx::query(CATALOG_QUERY)
            .bind(schema)
            .bind(table)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| LoaderError::catalog_failed(context(), e))?;

        rows.iter()
            .map(|row| {
                Ok(CatalogColumn::new(
                    row.try_get::<String, _>("column_name")?,
                    row.try_get::<String, _>("data_type")?,
                    row.try_get::<String, _>("udt_name")?,
                ))
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| LoaderError::catalog_failed(context(), e))
    }

    async fn set_integrity_mode(&mut self, mode: IntegrityMode) -> Result<()> {
        let statement = match mode {
            IntegrityMode::Relaxed => "SET session_replication_role = replica",
            IntegrityMode::Enforcing => "SET session_replication_role = DEFAULT",
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
        let qualified = qualified_table(schema, table);
        let context = || format!("inserting into {}.{}", schema, table);

        let mut tx = self
            .conn
            .begin()
            .await
            .map_err(|e| LoaderError::query_failed(context(), e))?;

        let mut inserted = 0u64;
        for chunk in batch.rows.chunks(per_statement) {
            let mut builder = insert::build_insert(&qualified, &columns, chunk);
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
