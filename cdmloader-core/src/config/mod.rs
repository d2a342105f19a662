//! Configuration types.
//!
//! - `connection`: destination connection settings and URL assembly
//! - `credentials`: zeroizing login container
//! - `options`: per-run load options
//! - `pipeline`: pipeline file model

mod connection;
mod credentials;
mod options;
mod pipeline;

pub use connection::{ConnectionConfig, DEFAULT_POSTGRES_PORT};
pub use credentials::Credentials;
pub use options::{LoadOptions, MAX_BATCH_SIZE, OptionOverrides, SourceFormat};
pub use pipeline::{PipelineConfig, StageConfig};
