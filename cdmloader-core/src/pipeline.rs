//! Named load stages selected by configuration.
//!
//! Each enabled stage is an independent [`Orchestrator::load_all`] run with
//! its own source directory, table order and options. Disabled stages are
//! recorded on the report but never touch the destination.

use crate::config::{LoadOptions, PipelineConfig, StageConfig};
use crate::error::{LoaderError, Result};
use crate::models::TableSpec;
use crate::orchestrator::Orchestrator;
use crate::report::LoadReport;
use crate::vocabulary::{CdmVersion, table_order_from_names};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// A stage resolved to its concrete table order and options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    /// Stage name from the pipeline file
    pub name: String,
    /// Disabled stages are recorded but never run
    pub enabled: bool,
    /// Directory holding this stage's source files
    pub source_dir: PathBuf,
    /// Tables in load order
    pub tables: Vec<TableSpec>,
    /// Pipeline defaults with the stage's overrides applied
    pub options: LoadOptions,
}

impl Stage {
    /// Resolves a configured stage against the pipeline defaults.
    ///
    /// Without an explicit table list the vocabulary order of the stage's
    /// CDM version (latest when unset) is used.
    ///
    /// # Errors
    /// Returns a configuration error for invalid table names or a
    /// `source_files` entry naming a table the stage does not load.
    pub fn from_config(config: &StageConfig, defaults: &LoadOptions) -> Result<Self> {
        let mut tables = match &config.tables {
            Some(names) => table_order_from_names(names)?,
            None => config.cdm_version.unwrap_or_default().vocabulary_tables(),
        };

        for (table, filename) in &config.source_files {
            let table = table.to_lowercase();
            let spec = tables
                .iter_mut()
                .find(|t| t.table_name == table)
                .ok_or_else(|| {
                    LoaderError::configuration(format!(
                        "Stage '{}' sets a source file for '{}', which it does not load",
                        config.name, table
                    ))
                })?;
            *spec = spec.clone().with_source_filename(filename.clone());
        }

        Ok(Self {
            name: config.name.clone(),
            enabled: config.enabled,
            source_dir: config.source_dir.clone(),
            tables,
            options: config.options.apply(defaults),
        })
    }
}

/// An ordered list of stages against one schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    schema: String,
    stages: Vec<Stage>,
}

/// Load report of one executed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// Stage name
    pub stage: String,
    /// Outcome of the stage's `load_all`
    pub report: LoadReport,
}

/// Outcome of a whole pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Identifier of this run, also written to the log
    pub run_id: Uuid,
    /// Executed stages in order
    pub stages: Vec<StageReport>,
    /// Stages skipped because they are disabled
    pub disabled_stages: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl PipelineReport {
    /// Success iff every executed stage succeeded.
    pub fn is_success(&self) -> bool {
        self.stages.iter().all(|s| s.report.is_success())
    }

    /// Report of a stage, if it ran.
    pub fn stage(&self, name: &str) -> Option<&LoadReport> {
        self.stages
            .iter()
            .find(|s| s.stage == name)
            .map(|s| &s.report)
    }

    /// Failed tables across all executed stages.
    pub fn failed_tables(&self) -> usize {
        self.stages.iter().map(|s| s.report.failed_count()).sum()
    }
}

impl Pipeline {
    /// Resolves every stage of a validated pipeline file.
    ///
    /// # Errors
    /// Returns a configuration error if any stage fails to resolve.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let stages = config
            .stages
            .iter()
            .map(|stage| Stage::from_config(stage, &config.options))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            schema: config.schema.clone(),
            stages,
        })
    }

    /// Single stage loading one CDM version's vocabulary.
    pub fn vocabulary(
        schema: impl Into<String>,
        source_dir: impl Into<PathBuf>,
        cdm_version: CdmVersion,
        options: LoadOptions,
    ) -> Self {
        Self {
            schema: schema.into(),
            stages: vec![Stage {
                name: "vocabulary".to_string(),
                enabled: true,
                source_dir: source_dir.into(),
                tables: cdm_version.vocabulary_tables(),
                options,
            }],
        }
    }

    /// Schema every stage loads into.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Stages in run order, including disabled ones.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Runs every enabled stage in order on `orchestrator`.
    ///
    /// All enabled stages are checked for a source directory before the
    /// first one runs, so a typo in a later stage does not leave the
    /// destination half loaded.
    ///
    /// # Errors
    /// Returns a configuration error if the orchestrator targets another
    /// schema or a stage is misconfigured.
    pub async fn run(&self, orchestrator: &mut Orchestrator) -> Result<PipelineReport> {
        if orchestrator.schema_name() != self.schema {
            return Err(LoaderError::configuration(format!(
                "Pipeline targets schema '{}' but the loader was opened for '{}'",
                self.schema,
                orchestrator.schema_name()
            )));
        }

        for stage in self.stages.iter().filter(|s| s.enabled) {
            if !tokio::fs::metadata(&stage.source_dir)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false)
            {
                return Err(LoaderError::configuration(format!(
                    "Stage '{}': source directory {} does not exist",
                    stage.name,
                    stage.source_dir.display()
                )));
            }
        }

        let started = Instant::now();
        let mut report = PipelineReport {
            run_id: Uuid::new_v4(),
            stages: Vec::new(),
            disabled_stages: Vec::new(),
            started_at: Utc::now(),
            elapsed_ms: 0,
        };

        for stage in &self.stages {
            if !stage.enabled {
                info!("Stage '{}' is disabled, skipping", stage.name);
                report.disabled_stages.push(stage.name.clone());
                continue;
            }

            info!("Running stage '{}'", stage.name);
            orchestrator.set_options(stage.options.clone());
            let stage_report = orchestrator
                .load_all(&stage.source_dir, &stage.tables)
                .await?;
            report.stages.push(StageReport {
                stage: stage.name.clone(),
                report: stage_report,
            });
        }

        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            "Pipeline {} finished: {} stages run, {} disabled, {} failed tables",
            report.run_id,
            report.stages.len(),
            report.disabled_stages.len(),
            report.failed_tables()
        );
        Ok(report)
    }
}
