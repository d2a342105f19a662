//! cdmloader binary.
//!
//! Loads a directory of OMOP CDM vocabulary files into an existing schema.
//! Exit status: 0 when every table loaded or was skipped, 1 when any table
//! failed, 2 on configuration or connection errors.

use cdmloader_cli::{
    Cli, Command, ConnectionArgs, EXIT_CONFIG_ERROR, EXIT_SUCCESS, LoadArgs, PASSWORD_ENV,
    exit_code, render_summary, render_table_order, resolve_password,
};
use cdmloader_core::{
    LoaderError, Orchestrator, Pipeline, PipelineReport, Result, create_destination,
    error::redact_database_url, init_logging,
};
use clap::Parser;
use std::path::Path;
use tracing::{error, info};
use zeroize::Zeroizing;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose, cli.global.quiet)?;
    let quiet = cli.global.quiet;

    let status = match cli.into_command() {
        Command::Load(args) => run_load(&args, quiet).await,
        Command::Test(connection) => run_test(&connection).await,
        Command::Tables(args) => {
            print!("{}", render_table_order(args.cdm_version));
            Ok(EXIT_SUCCESS)
        }
    }
    .unwrap_or_else(|e| {
        error!("{}", e.chain_message());
        EXIT_CONFIG_ERROR
    });

    if status != EXIT_SUCCESS {
        std::process::exit(status);
    }
    Ok(())
}

/// Connection URL for the arguments, prompting for a password if needed.
fn connection_url(connection: &ConnectionArgs) -> Result<Zeroizing<String>> {
    let password = if connection.needs_password() {
        resolve_password(std::env::var(PASSWORD_ENV).ok(), || {
            rpassword::prompt_password("Password: ")
        })?
    } else {
        None
    };
    connection.connection_url(password)
}

async fn run_load(args: &LoadArgs, quiet: bool) -> Result<i32> {
    let database_type = args.connection.database_type()?;
    let config = args.pipeline_config(database_type)?;
    let pipeline = Pipeline::from_config(&config)?;

    let url = connection_url(&args.connection)?;
    info!(
        "Loading into schema '{}' at {}",
        pipeline.schema(),
        redact_database_url(&url)
    );

    let destination = create_destination(&url, args.connection.connect_timeout()).await?;
    let mut orchestrator = Orchestrator::new(destination, pipeline.schema(), config.options);
    let report = pipeline.run(&mut orchestrator).await?;

    if let Some(path) = &args.report {
        write_report(&report, path).await?;
        info!("✓ Report written to {}", path.display());
    }

    if !quiet {
        println!("{}", render_summary(&report));
    }
    Ok(exit_code(&report))
}

async fn write_report(report: &PipelineReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).map_err(|e| LoaderError::Serialization {
        context: "Failed to serialize load report".to_string(),
        source: e,
    })?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| LoaderError::io(format!("Failed to write {}", path.display()), e))
}

async fn run_test(connection: &ConnectionArgs) -> Result<i32> {
    let url = connection_url(connection)?;
    info!("Testing connection to {}", redact_database_url(&url));

    let mut destination = create_destination(&url, connection.connect_timeout()).await?;
    destination.test_connection().await?;

    info!(
        "✓ Connection to {} successful",
        destination.database_type()
    );
    Ok(EXIT_SUCCESS)
}
