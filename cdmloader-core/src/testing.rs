//! Scripted in-memory destination for unit tests.
//!
//! Records every call in a shared log so tests can inspect it after the
//! destination has been boxed and handed to an orchestrator.

use crate::adapters::{CatalogColumn, Destination};
use crate::error::{LoaderError, Result};
use crate::integrity::IntegrityMode;
use crate::models::{CellValue, CoercedRecordBatch, DatabaseType};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    SetIntegrity(IntegrityMode),
    Catalog(String),
    Truncate(String),
    Insert { table: String, rows: usize },
}

/// Shared view of the calls a `ScriptedDestination` received.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
    inserted: Arc<Mutex<HashMap<String, Vec<Vec<CellValue>>>>>,
}

impl CallLog {
    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn integrity_calls(&self) -> Vec<IntegrityMode> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SetIntegrity(mode) => Some(mode),
                _ => None,
            })
            .collect()
    }

    /// Tables in the order their catalog was consulted.
    pub(crate) fn catalog_order(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Catalog(table) => Some(table),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn inserted_rows(&self, table: &str) -> Vec<Vec<CellValue>> {
        self.inserted
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[derive(Debug, Default)]
pub(crate) struct ScriptedDestination {
    tables: HashMap<String, Vec<CatalogColumn>>,
    log: CallLog,
    fail_integrity: bool,
    fail_catalog: HashSet<String>,
    fail_truncate: HashSet<String>,
    fail_insert: HashSet<String>,
    panic_on_insert: HashSet<String>,
}

impl ScriptedDestination {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Declares a table with `(column, data_type)` pairs.
    pub(crate) fn with_table(mut self, table: &str, columns: &[(&str, &str)]) -> Self {
        let columns = columns
            .iter()
            .map(|(name, data_type)| CatalogColumn::new(*name, *data_type, *data_type))
            .collect();
        self.tables.insert(table.to_string(), columns);
        self
    }

    pub(crate) fn fail_integrity(mut self) -> Self {
        self.fail_integrity = true;
        self
    }

    pub(crate) fn fail_catalog(mut self, table: &str) -> Self {
        self.fail_catalog.insert(table.to_string());
        self
    }

    pub(crate) fn fail_truncate(mut self, table: &str) -> Self {
        self.fail_truncate.insert(table.to_string());
        self
    }

    pub(crate) fn fail_insert(mut self, table: &str) -> Self {
        self.fail_insert.insert(table.to_string());
        self
    }

    pub(crate) fn panic_on_insert(mut self, table: &str) -> Self {
        self.panic_on_insert.insert(table.to_string());
        self
    }

    pub(crate) fn log(&self) -> CallLog {
        self.log.clone()
    }

    pub(crate) fn integrity_calls(&self) -> Vec<IntegrityMode> {
        self.log.integrity_calls()
    }
}

fn scripted_failure(what: &str) -> std::io::Error {
    std::io::Error::other(format!("scripted {} failure", what))
}

#[async_trait]
impl Destination for ScriptedDestination {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    async fn test_connection(&mut self) -> Result<()> {
        Ok(())
    }

    async fn catalog_columns(&mut self, _schema: &str, table: &str) -> Result<Vec<CatalogColumn>> {
        self.log.record(Call::Catalog(table.to_string()));
        if self.fail_catalog.contains(table) {
            return Err(LoaderError::catalog_failed(
                format!("reading columns of {}", table),
                scripted_failure("catalog"),
            ));
        }
        Ok(self.tables.get(table).cloned().unwrap_or_default())
    }

    async fn set_integrity_mode(&mut self, mode: IntegrityMode) -> Result<()> {
        self.log.record(Call::SetIntegrity(mode));
        if self.fail_integrity {
            return Err(LoaderError::query_failed(
                "setting integrity mode",
                scripted_failure("integrity"),
            ));
        }
        Ok(())
    }

    async fn truncate_table(&mut self, _schema: &str, table: &str) -> Result<()> {
        self.log.record(Call::Truncate(table.to_string()));
        if self.fail_truncate.contains(table) {
            return Err(LoaderError::query_failed(
                format!("emptying {}", table),
                scripted_failure("truncate"),
            ));
        }
        self.log.inserted.lock().unwrap().remove(table);
        Ok(())
    }

    async fn insert_batch(
        &mut self,
        _schema: &str,
        table: &str,
        batch: &CoercedRecordBatch,
        _batch_size: usize,
    ) -> Result<u64> {
        crate::adapters::helpers::mapped_columns(batch, table)?;
        self.log.record(Call::Insert {
            table: table.to_string(),
            rows: batch.row_count(),
        });

        if self.panic_on_insert.contains(table) {
            panic!("scripted panic while inserting into {}", table);
        }
        if self.fail_insert.contains(table) {
            return Err(LoaderError::query_failed(
                format!("inserting into {}", table),
                scripted_failure("insert"),
            ));
        }

        self.log
            .inserted
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .extend(batch.rows.iter().cloned());
        Ok(batch.row_count() as u64)
    }
}
