//! Static dependency order of the standardized vocabulary tables.
//!
//! The vocabulary tables reference each other cyclically (`concept` points
//! at `domain`, `vocabulary` and `concept_class`, which in turn point back at
//! `concept`), so no order satisfies every foreign key. The order below puts
//! the small reference tables first and the large relationship tables last;
//! the remaining cycles are covered by relaxing referential integrity for the
//! duration of the batch.

use crate::error::{LoaderError, Result};
use crate::models::TableSpec;
use crate::validation::validate_identifier;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// Supported Common Data Model versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CdmVersion {
    /// CDM v5.3
    #[serde(rename = "5.3")]
    V5_3,
    /// CDM v5.4
    #[default]
    #[serde(rename = "5.4")]
    V5_4,
}

impl std::fmt::Display for CdmVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CdmVersion::V5_3 => write!(f, "5.3"),
            CdmVersion::V5_4 => write!(f, "5.4"),
        }
    }
}

impl FromStr for CdmVersion {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().trim_start_matches(['v', 'V']) {
            "5.3" | "5.3.1" => Ok(CdmVersion::V5_3),
            "5.4" | "5.4.0" => Ok(CdmVersion::V5_4),
            other => Err(LoaderError::configuration(format!(
                "Unsupported CDM version '{}'. Supported versions: 5.3, 5.4",
                other
            ))),
        }
    }
}

/// Vocabulary tables in load order. 5.3 and 5.4 share the same set.
const VOCABULARY_TABLES: &[&str] = &[
    "vocabulary",
    "domain",
    "concept_class",
    "concept",
    "relationship",
    "concept_relationship",
    "concept_ancestor",
    "concept_synonym",
    "drug_strength",
];

impl CdmVersion {
    /// Table names of the vocabulary in dependency order.
    pub fn vocabulary_table_names(self) -> &'static [&'static str] {
        match self {
            CdmVersion::V5_3 | CdmVersion::V5_4 => VOCABULARY_TABLES,
        }
    }

    /// Table specs of the vocabulary in dependency order.
    pub fn vocabulary_tables(self) -> Vec<TableSpec> {
        build_order(self.vocabulary_table_names().iter().copied())
    }
}

fn build_order<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<TableSpec> {
    names
        .into_iter()
        .zip(0u32..)
        .map(|(name, ordinal)| TableSpec::new(name, ordinal))
        .collect()
}

/// Builds a table order from an explicit list of names.
///
/// Names are lowercased and checked as SQL identifiers; duplicates are
/// rejected because every table must yield exactly one outcome.
///
/// # Errors
/// Returns a configuration error for invalid or repeated names.
pub fn table_order_from_names<S: AsRef<str>>(names: &[S]) -> Result<Vec<TableSpec>> {
    let mut seen = HashSet::with_capacity(names.len());
    let mut lowered = Vec::with_capacity(names.len());

    for name in names {
        let name = name.as_ref().trim().to_lowercase();
        validate_identifier("table", &name)?;
        if !seen.insert(name.clone()) {
            return Err(LoaderError::configuration(format!(
                "Table '{}' appears more than once in the load order",
                name
            )));
        }
        lowered.push(name);
    }

    Ok(build_order(lowered.iter().map(String::as_str)))
}
