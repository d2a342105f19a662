//! Dependency-ordered load of a whole source directory.
//!
//! # Lifecycle
//! 1. Configuration checks (fatal, nothing touched yet)
//! 2. Relax referential integrity
//! 3. Load every table in order, one at a time
//! 4. Restore referential integrity, exactly once
//!
//! Steps 2 and 4 are best-effort and surface as report warnings. A table
//! that fails, is skipped or panics never stops the run.

use crate::adapters::Destination;
use crate::config::LoadOptions;
use crate::error::{LoaderError, Result};
use crate::integrity::{IntegrityController, IntegrityMode};
use crate::loader::TableLoader;
use crate::models::TableSpec;
use crate::report::{FailureKind, LoadFailure, LoadOutcome, LoadReport, TableReport};
use crate::validation::validate_identifier;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};

/// Runs table loads against one destination session.
pub struct Orchestrator {
    destination: Box<dyn Destination>,
    schema_name: String,
    loader: TableLoader,
    integrity: IntegrityController,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("database_type", &self.destination.database_type())
            .field("schema_name", &self.schema_name)
            .field("options", self.loader.options())
            .field("integrity", &self.integrity.mode())
            .finish()
    }
}

impl Orchestrator {
    /// Creates an orchestrator that owns `destination` and loads into
    /// `schema_name`.
    pub fn new(
        destination: Box<dyn Destination>,
        schema_name: impl Into<String>,
        options: LoadOptions,
    ) -> Self {
        Self {
            destination,
            schema_name: schema_name.into(),
            loader: TableLoader::new(options),
            integrity: IntegrityController::new(),
        }
    }

    /// Schema every table is loaded into.
    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    /// Options used by the next `load_all`.
    pub fn options(&self) -> &LoadOptions {
        self.loader.options()
    }

    /// Replaces the options used by later `load_all` calls.
    pub fn set_options(&mut self, options: LoadOptions) {
        self.loader = TableLoader::new(options);
    }

    /// Integrity mode last set successfully on the destination.
    pub fn integrity_mode(&self) -> IntegrityMode {
        self.integrity.mode()
    }

    /// Loads every table of `table_order` from `source_directory`.
    ///
    /// The report holds exactly one entry per table, in order.
    ///
    /// # Errors
    /// Returns a configuration error, before the destination is touched, if
    /// the source directory is missing, a name is not a valid identifier, a
    /// table appears twice or the options are invalid.
    pub async fn load_all(
        &mut self,
        source_directory: &Path,
        table_order: &[TableSpec],
    ) -> Result<LoadReport> {
        self.check_configuration(source_directory, table_order)
            .await?;

        let started = Instant::now();
        let mut report = LoadReport::new(
            self.schema_name.clone(),
            source_directory.display().to_string(),
        );
        info!(
            "Loading {} tables from {} into {}",
            table_order.len(),
            source_directory.display(),
            self.schema_name
        );

        if let Some(warning) = self.integrity.disable(self.destination.as_mut()).await {
            report.integrity_warnings.push(warning);
        }

        for (position, table) in table_order.iter().enumerate() {
            info!(
                "[{}/{}] {}",
                position + 1,
                table_order.len(),
                table.table_name
            );

            let load = self.loader.load_table(
                self.destination.as_mut(),
                table,
                source_directory,
                &self.schema_name,
            );
            let table_report = match AssertUnwindSafe(load).catch_unwind().await {
                Ok(table_report) => table_report,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!("Loading {} panicked: {}", table.table_name, message);
                    TableReport {
                        table: table.table_name.clone(),
                        source_file: table.source_filename.clone(),
                        outcome: LoadOutcome::Failed {
                            error: LoadFailure::new(
                                FailureKind::Panicked,
                                format!("load panicked: {}", message),
                            ),
                        },
                        warnings: Vec::new(),
                        elapsed_ms: 0,
                    }
                }
            };
            report.tables.push(table_report);
        }

        if let Some(warning) = self.integrity.enable(self.destination.as_mut()).await {
            report.integrity_warnings.push(warning);
        }

        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        log_summary(&report);
        Ok(report)
    }

    async fn check_configuration(
        &self,
        source_directory: &Path,
        table_order: &[TableSpec],
    ) -> Result<()> {
        let metadata = tokio::fs::metadata(source_directory).await.map_err(|_| {
            LoaderError::configuration(format!(
                "Source directory {} does not exist",
                source_directory.display()
            ))
        })?;
        if !metadata.is_dir() {
            return Err(LoaderError::configuration(format!(
                "Source path {} is not a directory",
                source_directory.display()
            )));
        }

        validate_identifier("schema", &self.schema_name)?;
        self.loader.options().validate()?;

        let mut seen = HashSet::with_capacity(table_order.len());
        for table in table_order {
            validate_identifier("table", &table.table_name)?;
            if !seen.insert(table.table_name.as_str()) {
                return Err(LoaderError::configuration(format!(
                    "Table '{}' appears more than once in the load order",
                    table.table_name
                )));
            }
        }

        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn log_summary(report: &LoadReport) {
    let missing = report.missing_files();
    if !missing.is_empty() {
        warn!("Missing source files: {}", missing.join(", "));
    }

    for warning in &report.integrity_warnings {
        warn!("{}", warning);
    }

    info!(
        "Load into {} finished in {} ms: {} loaded ({} rows), {} skipped, {} failed",
        report.schema,
        report.elapsed_ms,
        report.loaded_count(),
        report.rows_loaded(),
        report.skipped_count(),
        report.failed_count()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{IntegrityWarning, SkipReason};
    use crate::testing::{CallLog, ScriptedDestination};
    use std::fs;

    const ID_COLUMN: &[(&str, &str)] = &[("id", "integer")];

    fn source_dir(tables: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for table in tables {
            fs::write(
                dir.path().join(format!("{}.csv", table.to_uppercase())),
                "id\n1\n2\n",
            )
            .unwrap();
        }
        dir
    }

    fn order(names: &[&str]) -> Vec<TableSpec> {
        crate::vocabulary::table_order_from_names(names).unwrap()
    }

    fn orchestrator(destination: ScriptedDestination) -> (Orchestrator, CallLog) {
        let log = destination.log();
        (
            Orchestrator::new(Box::new(destination), "cdm", LoadOptions::default()),
            log,
        )
    }

    fn outcome_kinds(report: &LoadReport) -> Vec<&'static str> {
        report
            .tables
            .iter()
            .map(|t| match t.outcome {
                LoadOutcome::Loaded { .. } => "loaded",
                LoadOutcome::Skipped { .. } => "skipped",
                LoadOutcome::Failed { .. } => "failed",
            })
            .collect()
    }

    #[tokio::test]
    async fn test_visits_tables_in_order() {
        let names = ["vocabulary", "domain", "concept_class", "concept"];
        let dir = source_dir(&names);
        let mut destination = ScriptedDestination::new();
        for name in names {
            destination = destination.with_table(name, ID_COLUMN);
        }
        let (mut orchestrator, log) = orchestrator(destination);

        let report = orchestrator.load_all(dir.path(), &order(&names)).await.unwrap();

        assert_eq!(report.tables.len(), names.len());
        let visited: Vec<_> = report.tables.iter().map(|t| t.table.as_str()).collect();
        assert_eq!(visited, names);
        assert_eq!(log.catalog_order(), names);
        assert!(report.is_success());
        assert_eq!(report.rows_loaded(), 8);
    }

    #[tokio::test]
    async fn test_missing_file_is_skipped_and_later_tables_load() {
        let dir = source_dir(&["vocabulary", "concept"]);
        let destination = ScriptedDestination::new()
            .with_table("vocabulary", ID_COLUMN)
            .with_table("domain", ID_COLUMN)
            .with_table("concept", ID_COLUMN);
        let (mut orchestrator, _log) = orchestrator(destination);

        let report = orchestrator
            .load_all(dir.path(), &order(&["vocabulary", "domain", "concept"]))
            .await
            .unwrap();

        assert_eq!(outcome_kinds(&report), vec!["loaded", "skipped", "loaded"]);
        assert_eq!(
            report.tables[1].outcome,
            LoadOutcome::Skipped {
                reason: SkipReason::FileNotFound
            }
        );
        assert_eq!(report.missing_files(), vec!["DOMAIN.csv"]);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_schema_not_found_fails_only_that_table() {
        let dir = source_dir(&["vocabulary", "domain", "concept"]);
        let destination = ScriptedDestination::new()
            .with_table("vocabulary", ID_COLUMN)
            .with_table("domain", ID_COLUMN);
        let (mut orchestrator, _log) = orchestrator(destination);

        let report = orchestrator
            .load_all(dir.path(), &order(&["vocabulary", "concept", "domain"]))
            .await
            .unwrap();

        assert_eq!(outcome_kinds(&report), vec!["loaded", "failed", "loaded"]);
        assert_eq!(
            report.tables[1].outcome.failure_kind(),
            Some(FailureKind::SchemaNotFound)
        );
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_enable_called_once_when_every_table_fails() {
        let names = ["vocabulary", "domain", "concept"];
        let dir = source_dir(&names);
        let (mut orchestrator, log) = orchestrator(ScriptedDestination::new());

        let report = orchestrator.load_all(dir.path(), &order(&names)).await.unwrap();

        assert_eq!(report.failed_count(), 3);
        assert_eq!(
            log.integrity_calls(),
            vec![IntegrityMode::Relaxed, IntegrityMode::Enforcing]
        );
        assert_eq!(orchestrator.integrity_mode(), IntegrityMode::Enforcing);
    }

    #[tokio::test]
    async fn test_panic_is_recorded_and_integrity_restored() {
        let names = ["vocabulary", "domain", "concept"];
        let dir = source_dir(&names);
        let destination = ScriptedDestination::new()
            .with_table("vocabulary", ID_COLUMN)
            .with_table("domain", ID_COLUMN)
            .with_table("concept", ID_COLUMN)
            .panic_on_insert("domain");
        let (mut orchestrator, log) = orchestrator(destination);

        let report = orchestrator.load_all(dir.path(), &order(&names)).await.unwrap();

        assert_eq!(outcome_kinds(&report), vec!["loaded", "failed", "loaded"]);
        let failure = match &report.tables[1].outcome {
            LoadOutcome::Failed { error } => error.clone(),
            other => panic!("expected failure, got {:?}", other),
        };
        assert_eq!(failure.kind, FailureKind::Panicked);
        assert!(failure.message.contains("scripted panic"));
        assert_eq!(
            log.integrity_calls(),
            vec![IntegrityMode::Relaxed, IntegrityMode::Enforcing]
        );
    }

    #[tokio::test]
    async fn test_integrity_failures_are_warnings() {
        let dir = source_dir(&["domain"]);
        let destination = ScriptedDestination::new()
            .with_table("domain", ID_COLUMN)
            .fail_integrity();
        let (mut orchestrator, log) = orchestrator(destination);

        let report = orchestrator
            .load_all(dir.path(), &order(&["domain"]))
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.integrity_warnings.len(), 2);
        assert!(matches!(
            report.integrity_warnings[0],
            IntegrityWarning::DisableFailed { .. }
        ));
        assert!(matches!(
            report.integrity_warnings[1],
            IntegrityWarning::EnableFailed { .. }
        ));
        // Enable is still attempted after a failed disable
        assert_eq!(log.integrity_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_insert_failure_does_not_halt_run() {
        let names = ["vocabulary", "domain"];
        let dir = source_dir(&names);
        let destination = ScriptedDestination::new()
            .with_table("vocabulary", ID_COLUMN)
            .with_table("domain", ID_COLUMN)
            .fail_insert("vocabulary");
        let (mut orchestrator, _log) = orchestrator(destination);

        let report = orchestrator.load_all(dir.path(), &order(&names)).await.unwrap();

        assert_eq!(outcome_kinds(&report), vec!["failed", "loaded"]);
        assert_eq!(
            report.tables[0].outcome.failure_kind(),
            Some(FailureKind::Insert)
        );
    }

    #[tokio::test]
    async fn test_missing_directory_is_fatal_before_anything_runs() {
        let dir = tempfile::tempdir().unwrap();
        let (mut orchestrator, log) = orchestrator(ScriptedDestination::new());

        let result = orchestrator
            .load_all(&dir.path().join("absent"), &order(&["domain"]))
            .await;

        assert!(matches!(result, Err(LoaderError::Configuration { .. })));
        assert!(log.calls().is_empty());
    }

    #[tokio::test]
    async fn test_file_as_source_directory_is_fatal() {
        let dir = source_dir(&["domain"]);
        let (mut orchestrator, _log) = orchestrator(ScriptedDestination::new());

        let result = orchestrator
            .load_all(&dir.path().join("DOMAIN.csv"), &order(&["domain"]))
            .await;
        assert!(matches!(result, Err(LoaderError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_and_invalid_tables_are_fatal() {
        let dir = source_dir(&[]);
        let (mut orchestrator, log) = orchestrator(ScriptedDestination::new());

        let duplicate = vec![TableSpec::new("domain", 0), TableSpec::new("domain", 1)];
        let result = orchestrator.load_all(dir.path(), &duplicate).await;
        assert!(matches!(result, Err(LoaderError::Configuration { .. })));

        let invalid = vec![TableSpec::new("domain; drop table concept", 0)];
        let result = orchestrator.load_all(dir.path(), &invalid).await;
        assert!(matches!(result, Err(LoaderError::Configuration { .. })));

        assert!(log.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_schema_name_is_fatal() {
        let dir = source_dir(&[]);
        let mut orchestrator = Orchestrator::new(
            Box::new(ScriptedDestination::new()),
            "bad schema",
            LoadOptions::default(),
        );

        let result = orchestrator.load_all(dir.path(), &order(&["domain"])).await;
        assert!(matches!(result, Err(LoaderError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_empty_order_still_brackets_integrity() {
        let dir = source_dir(&[]);
        let (mut orchestrator, log) = orchestrator(ScriptedDestination::new());

        let report = orchestrator.load_all(dir.path(), &[]).await.unwrap();
        assert!(report.tables.is_empty());
        assert!(report.is_success());
        assert_eq!(log.integrity_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_set_options_applies_to_next_run() {
        let dir = source_dir(&["domain"]);
        let destination = ScriptedDestination::new().with_table("domain", ID_COLUMN);
        let (mut orchestrator, log) = orchestrator(destination);

        orchestrator.set_options(LoadOptions {
            truncate_before_load: false,
            ..LoadOptions::default()
        });
        orchestrator
            .load_all(dir.path(), &order(&["domain"]))
            .await
            .unwrap();

        assert!(!orchestrator.options().truncate_before_load);
        assert!(
            !log.calls()
                .iter()
                .any(|c| matches!(c, crate::testing::Call::Truncate(_)))
        );
    }
}
