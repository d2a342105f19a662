//! Core library for cdmloader.
//!
//! Loads a directory of delimited OMOP CDM vocabulary files into an existing
//! relational schema. Tables are loaded one at a time in dependency order on
//! a single destination session, with referential integrity relaxed for the
//! duration of the batch. Every table yields exactly one outcome, so a
//! missing or malformed file never aborts the run.
//!
//! # Security Guarantees
//! - Credentials are never logged, serialized or included in errors
//! - Schema and table names are validated identifiers, values are bound
//! - Destination tables are never created or dropped
//!
//! # Architecture
//! - `Destination` trait with one adapter per engine, chosen by URL
//! - `Orchestrator` owns the injected destination and the integrity bracket
//! - `TableLoader` runs truncate, read, inspect, coerce and insert per table
//! - `Pipeline` runs configuration-selected stages on one orchestrator
//!
//! # Example
//! ```rust,no_run
//! use cdmloader_core::adapters::create_destination;
//! use cdmloader_core::config::LoadOptions;
//! use cdmloader_core::orchestrator::Orchestrator;
//! use cdmloader_core::vocabulary::CdmVersion;
//! use std::path::Path;
//! use std::time::Duration;
//!
//! # async fn example() -> cdmloader_core::Result<()> {
//! let destination = create_destination("sqlite:///data/cdm.db", Duration::from_secs(30)).await?;
//! let mut orchestrator = Orchestrator::new(destination, "main", LoadOptions::default());
//! let report = orchestrator
//!     .load_all(Path::new("/data/vocab"), &CdmVersion::V5_4.vocabulary_tables())
//!     .await?;
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod coercion;
pub mod config;
pub mod error;
pub mod inspector;
pub mod integrity;
pub mod loader;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod validation;
pub mod vocabulary;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use adapters::{Destination, create_destination, detect_database_type};
pub use config::{ConnectionConfig, Credentials, LoadOptions, PipelineConfig, StageConfig};
pub use error::{LoaderError, Result};
pub use integrity::IntegrityMode;
pub use logging::init_logging;
pub use models::{DatabaseType, TableSpec, TypeClass};
pub use orchestrator::Orchestrator;
pub use pipeline::{Pipeline, PipelineReport};
pub use report::{FailureKind, LoadOutcome, LoadReport, TableReport};
pub use vocabulary::CdmVersion;
