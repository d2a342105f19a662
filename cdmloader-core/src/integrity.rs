//! Referential-integrity bracket around a load batch.
//!
//! Vocabulary tables reference each other cyclically, so foreign-key checks
//! are relaxed for the whole batch and restored afterwards. Both toggles are
//! best-effort: a failure becomes an [`IntegrityWarning`] on the report
//! rather than an error, and enabling is always attempted.

use crate::adapters::Destination;
use crate::report::IntegrityWarning;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Session-scoped foreign-key enforcement setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityMode {
    /// Foreign-key checks active
    #[default]
    Enforcing,
    /// Foreign-key checks suspended for the session
    Relaxed,
}

impl std::fmt::Display for IntegrityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityMode::Enforcing => write!(f, "enforcing"),
            IntegrityMode::Relaxed => write!(f, "relaxed"),
        }
    }
}

/// Tracks and toggles the integrity mode of one destination session.
///
/// `mode` is the last mode successfully set; a failed toggle leaves it
/// unchanged.
#[derive(Debug, Default)]
pub struct IntegrityController {
    mode: IntegrityMode,
}

impl IntegrityController {
    /// Starts in `Enforcing`, the state of a fresh session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mode last set successfully.
    pub fn mode(&self) -> IntegrityMode {
        self.mode
    }

    /// Relaxes foreign-key enforcement.
    pub async fn disable(&mut self, destination: &mut dyn Destination) -> Option<IntegrityWarning> {
        match destination.set_integrity_mode(IntegrityMode::Relaxed).await {
            Ok(()) => {
                debug!("Referential integrity relaxed");
                self.mode = IntegrityMode::Relaxed;
                None
            }
            Err(e) => {
                let warning = IntegrityWarning::DisableFailed {
                    message: e.chain_message(),
                };
                warn!("{}", warning);
                Some(warning)
            }
        }
    }

    /// Restores foreign-key enforcement.
    pub async fn enable(&mut self, destination: &mut dyn Destination) -> Option<IntegrityWarning> {
        match destination.set_integrity_mode(IntegrityMode::Enforcing).await {
            Ok(()) => {
                debug!("Referential integrity enforced");
                self.mode = IntegrityMode::Enforcing;
                None
            }
            Err(e) => {
                let warning = IntegrityWarning::EnableFailed {
                    message: e.chain_message(),
                };
                warn!("{}", warning);
                Some(warning)
            }
        }
    }
}
