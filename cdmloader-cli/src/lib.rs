//! Library module for the cdmloader binary.
//!
//! Argument definitions and their conversion into core configuration live
//! here so they can be tested without a database. `main.rs` only wires them
//! to the runtime.

use cdmloader_core::{
    CdmVersion, ConnectionConfig, Credentials, DatabaseType, LoaderError, PipelineConfig,
    PipelineReport, Result, StageConfig,
    config::{LoadOptions, OptionOverrides},
    detect_database_type,
    error::redact_database_url,
    report::LoadOutcome,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;
use zeroize::Zeroizing;

/// Every executed table loaded or was skipped.
pub const EXIT_SUCCESS: i32 = 0;
/// At least one table failed.
pub const EXIT_TABLE_FAILED: i32 = 1;
/// Configuration or connection error; nothing was loaded.
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Environment variable holding the password for discrete connection flags.
pub const PASSWORD_ENV: &str = "CDMLOADER_PASSWORD";

/// Command-line arguments of `cdmloader`.
#[derive(Debug, Parser)]
#[command(name = "cdmloader")]
#[command(about = "Load OMOP CDM vocabulary files into a database schema")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
#[command(long_about = "
cdmloader - Dependency-ordered OMOP CDM vocabulary loader

Loads the tab-delimited files of a vocabulary download (CONCEPT.csv,
VOCABULARY.csv, ...) into existing CDM tables. Tables are loaded one at a
time in dependency order with foreign-key checks relaxed for the batch.
A missing or malformed file fails only its own table.

SUPPORTED DATABASES:
- PostgreSQL (postgres:// or --db-kind postgres)
- SQLite (sqlite:// or .db/.sqlite files, or --db-kind sqlite)

EXIT CODES:
  0  every table loaded or was skipped
  1  at least one table failed
  2  configuration or connection error

EXAMPLES:
  cdmloader --schema cdm --source-dir ./vocab postgres://loader@localhost/omop
  cdmloader --db-kind sqlite --database cdm.db --source-dir ./vocab
  cdmloader --config pipeline.json --report report.json
  cdmloader tables --cdm-version 5.3
")]
pub struct Cli {
    /// Verbosity flags
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand; `None` loads
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Load arguments of a bare invocation
    #[command(flatten)]
    pub load: LoadArgs,
}

impl Cli {
    /// The command to run; a bare invocation loads.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Load(self.load))
    }
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load vocabulary files (default)
    Load(LoadArgs),
    /// Test the database connection
    Test(ConnectionArgs),
    /// Print the table load order of a CDM version
    Tables(TablesArgs),
}

/// Flags accepted by every subcommand.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    pub quiet: bool,
}

/// Destination engine for discrete connection flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DbKind {
    /// PostgreSQL server
    #[default]
    Postgres,
    /// SQLite database file
    Sqlite,
}

impl From<DbKind> for DatabaseType {
    fn from(kind: DbKind) -> Self {
        match kind {
            DbKind::Postgres => DatabaseType::PostgreSQL,
            DbKind::Sqlite => DatabaseType::SQLite,
        }
    }
}

/// Where to connect.
#[derive(Clone, Args)]
pub struct ConnectionArgs {
    /// Database connection URL
    #[arg(
        env = "DATABASE_URL",
        hide_env_values = true,
        help = "Database connection string (credentials will be sanitized in logs)"
    )]
    pub database_url: Option<String>,

    /// Engine for discrete connection flags
    #[arg(long, value_enum, default_value_t = DbKind::Postgres)]
    pub db_kind: DbKind,

    /// Server host
    #[arg(long, default_value = "localhost", help = "Database host")]
    pub host: String,

    /// Server port
    #[arg(long, help = "Database port (PostgreSQL default 5432)")]
    pub port: Option<u16>,

    /// Login name
    #[arg(long, help = "Login name; the password is read from CDMLOADER_PASSWORD or prompted")]
    pub user: Option<String>,

    /// Database name or SQLite file
    #[arg(long, help = "Database name (SQLite: database file path)")]
    pub database: Option<String>,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 30, value_name = "SECONDS", help = "Connection timeout")]
    pub connect_timeout: u64,
}

impl std::fmt::Debug for ConnectionArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionArgs")
            .field(
                "database_url",
                &self.database_url.as_deref().map(redact_database_url),
            )
            .field("db_kind", &self.db_kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("database", &self.database)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl ConnectionArgs {
    /// Engine the arguments point at.
    ///
    /// # Errors
    /// Returns a configuration error if the URL names an unknown engine.
    pub fn database_type(&self) -> Result<DatabaseType> {
        match &self.database_url {
            Some(url) => detect_database_type(url),
            None => Ok(self.db_kind.into()),
        }
    }

    /// Whether a password has to be supplied out of band.
    pub fn needs_password(&self) -> bool {
        self.database_url.is_none() && self.db_kind == DbKind::Postgres && self.user.is_some()
    }

    /// Connect timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Connection URL from `DATABASE_URL` or the discrete flags.
    ///
    /// # Errors
    /// Returns a configuration error for incomplete discrete flags.
    pub fn connection_url(&self, password: Option<String>) -> Result<Zeroizing<String>> {
        if let Some(url) = &self.database_url {
            return Ok(Zeroizing::new(url.clone()));
        }

        let config = match self.db_kind {
            DbKind::Sqlite => {
                let path = self.database.clone().ok_or_else(|| {
                    LoaderError::configuration("--database <FILE> is required for SQLite")
                })?;
                ConnectionConfig::sqlite(path)
            }
            DbKind::Postgres => {
                let mut config = ConnectionConfig::new(DatabaseType::PostgreSQL, self.host.clone());
                if let Some(port) = self.port {
                    config = config.with_port(port);
                }
                if let Some(database) = &self.database {
                    config = config.with_database(database.clone());
                }
                config
            }
        }
        .with_connect_timeout(self.connect_timeout());

        let credentials = self
            .user
            .as_ref()
            .map(|user| Credentials::new(user.clone(), password));
        config.to_url(credentials.as_ref())
    }
}

/// Picks the password for discrete connection flags.
///
/// The environment value wins; otherwise `prompt` is asked. An empty answer
/// means no password.
///
/// # Errors
/// Returns a configuration error if the prompt fails.
pub fn resolve_password<F>(env_value: Option<String>, prompt: F) -> Result<Option<String>>
where
    F: FnOnce() -> std::io::Result<String>,
{
    if let Some(password) = env_value {
        return Ok(Some(password));
    }

    let password = prompt()
        .map_err(|e| LoaderError::configuration(format!("Failed to read password: {}", e)))?;
    Ok((!password.is_empty()).then_some(password))
}

/// Arguments of the `load` command.
#[derive(Debug, Clone, Args)]
pub struct LoadArgs {
    /// Destination
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Destination schema
    #[arg(
        long,
        help = "Destination schema (default: cdm for PostgreSQL, main for SQLite)"
    )]
    pub schema: Option<String>,

    /// Source directory
    #[arg(
        long,
        value_name = "DIR",
        conflicts_with = "config",
        help = "Directory containing the vocabulary files"
    )]
    pub source_dir: Option<PathBuf>,

    /// CDM version whose order is loaded
    #[arg(
        long,
        conflicts_with_all = ["config", "tables"],
        help = "CDM version whose vocabulary order is loaded (5.3 or 5.4, default 5.4)"
    )]
    pub cdm_version: Option<CdmVersion>,

    /// Explicit table order
    #[arg(
        long,
        value_delimiter = ',',
        conflicts_with = "config",
        help = "Comma-separated table order, replacing the vocabulary order"
    )]
    pub tables: Vec<String>,

    /// Keep existing rows
    #[arg(long, help = "Keep existing rows instead of emptying each table first")]
    pub no_truncate: bool,

    /// Keep header case
    #[arg(long, help = "Match source headers to columns without lowercasing them")]
    pub no_normalize_headers: bool,

    /// Rows per INSERT
    #[arg(long, help = "Maximum rows per INSERT statement (default 1000)")]
    pub batch_size: Option<usize>,

    /// Fail on unmapped columns
    #[arg(long, help = "Fail tables whose files have columns the destination lacks")]
    pub strict_unmapped_columns: bool,

    /// Pipeline file
    #[arg(long, value_name = "FILE", help = "Pipeline file (JSON) with named stages")]
    pub config: Option<PathBuf>,

    /// JSON report destination
    #[arg(long, value_name = "FILE", help = "Write the JSON load report to this file")]
    pub report: Option<PathBuf>,
}

impl LoadArgs {
    /// Load option flags that were given.
    pub fn option_overrides(&self) -> OptionOverrides {
        OptionOverrides {
            truncate_before_load: self.no_truncate.then_some(false),
            case_normalize_headers: self.no_normalize_headers.then_some(false),
            batch_size: self.batch_size,
            strict_unmapped_columns: self.strict_unmapped_columns.then_some(true),
            ..OptionOverrides::default()
        }
    }

    /// Builds the pipeline to run.
    ///
    /// With `--config` the file defines the stages and the option flags
    /// override its defaults; otherwise a single `vocabulary` stage is built
    /// from `--source-dir` and either `--tables` or `--cdm-version`.
    ///
    /// # Errors
    /// Returns a configuration error for a missing source directory, an
    /// invalid pipeline file or invalid options.
    pub fn pipeline_config(&self, database_type: DatabaseType) -> Result<PipelineConfig> {
        let overrides = self.option_overrides();

        let mut config = match &self.config {
            Some(path) => {
                let mut config = PipelineConfig::from_file(path)?;
                config.options = overrides.apply(&config.options);
                config
            }
            None => {
                let source_dir = self.source_dir.clone().ok_or_else(|| {
                    LoaderError::configuration("--source-dir is required unless --config is given")
                })?;

                let mut stage = StageConfig::new("vocabulary", source_dir);
                stage.cdm_version = self.cdm_version;
                if !self.tables.is_empty() {
                    stage.tables = Some(self.tables.clone());
                }

                PipelineConfig::single_stage(
                    default_schema(database_type),
                    stage,
                    overrides.apply(&LoadOptions::default()),
                )
            }
        };

        if let Some(schema) = &self.schema {
            config.schema.clone_from(schema);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Schema used when `--schema` is not given.
pub fn default_schema(database_type: DatabaseType) -> &'static str {
    match database_type {
        DatabaseType::PostgreSQL => "cdm",
        DatabaseType::SQLite => "main",
    }
}

/// Arguments of the `tables` command.
#[derive(Debug, Clone, Args)]
pub struct TablesArgs {
    /// CDM version to print
    #[arg(long, default_value_t = CdmVersion::V5_4, help = "CDM version (5.3 or 5.4)")]
    pub cdm_version: CdmVersion,
}

/// Process exit code for a finished pipeline.
pub fn exit_code(report: &PipelineReport) -> i32 {
    if report.is_success() {
        EXIT_SUCCESS
    } else {
        EXIT_TABLE_FAILED
    }
}

/// Load order of a CDM version, one table per line.
pub fn render_table_order(version: CdmVersion) -> String {
    let mut output = format!("CDM {} vocabulary load order:\n", version);
    for table in version.vocabulary_tables() {
        let _ = writeln!(
            output,
            "  {:>2}. {:<22} {}",
            table.ordinal + 1,
            table.table_name,
            table.source_filename
        );
    }
    output
}

/// Human-readable summary of a pipeline run.
pub fn render_summary(report: &PipelineReport) -> String {
    let mut output = String::new();

    for stage in &report.stages {
        let load = &stage.report;
        let _ = writeln!(
            output,
            "Stage '{}': {} loaded ({} rows), {} skipped, {} failed",
            stage.stage,
            load.loaded_count(),
            load.rows_loaded(),
            load.skipped_count(),
            load.failed_count()
        );

        for table in &load.tables {
            if let LoadOutcome::Failed { error } = &table.outcome {
                let _ = writeln!(output, "  FAILED {}: {}", table.table, error.message);
            }
        }

        let missing = load.missing_files();
        if !missing.is_empty() {
            let _ = writeln!(output, "  Missing files: {}", missing.join(", "));
        }

        for warning in &load.integrity_warnings {
            let _ = writeln!(output, "  WARNING {}", warning);
        }
    }

    for stage in &report.disabled_stages {
        let _ = writeln!(output, "Stage '{}': disabled", stage);
    }

    let _ = write!(
        output,
        "Load {} in {} ms",
        if report.is_success() {
            "succeeded"
        } else {
            "failed"
        },
        report.elapsed_ms
    );
    output
}
