//! Pipeline file model.
//!
//! A pipeline file names the destination schema, default load options and
//! an ordered list of stages. Each stage loads one source directory with
//! either a CDM version's vocabulary order or an explicit table list.

use crate::config::{LoadOptions, OptionOverrides};
use crate::error::{LoaderError, Result};
use crate::validation::{validate_identifier, validate_pipeline_json};
use crate::vocabulary::CdmVersion;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Parsed and validated pipeline file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Destination schema (SQLite: attached database name)
    pub schema: String,
    #[serde(default)]
    pub options: LoadOptions,
    pub stages: Vec<StageConfig>,
}

/// One named stage of a pipeline file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Unique stage name
    pub name: String,
    /// Whether the stage runs (default true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Directory of source files; relative paths are resolved against the file
    pub source_dir: PathBuf,
    /// Vocabulary order to load; defaults to the latest version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdm_version: Option<CdmVersion>,
    /// Explicit table order, overriding the vocabulary order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<String>>,
    /// Source filename per table, overriding `UPPERCASE.csv`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub source_files: BTreeMap<String, String>,
    #[serde(default)]
    pub options: OptionOverrides,
}

fn default_enabled() -> bool {
    true
}

impl StageConfig {
    /// A stage loading the vocabulary of `cdm_version` from `source_dir`.
    pub fn new(name: impl Into<String>, source_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            source_dir: source_dir.into(),
            cdm_version: None,
            tables: None,
            source_files: BTreeMap::new(),
            options: OptionOverrides::default(),
        }
    }
}

impl PipelineConfig {
    /// Single-stage pipeline, as built from command-line flags.
    pub fn single_stage(
        schema: impl Into<String>,
        stage: StageConfig,
        options: LoadOptions,
    ) -> Self {
        Self {
            schema: schema.into(),
            options,
            stages: vec![stage],
        }
    }

    /// Parses a pipeline document, validating it against the pipeline schema.
    ///
    /// # Errors
    /// Returns a serialization error for malformed JSON and a configuration
    /// error for schema or semantic violations.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| LoaderError::Serialization {
                context: "Failed to parse pipeline file".to_string(),
                source: e,
            })?;

        validate_pipeline_json(&value)?;

        let config: Self =
            serde_json::from_value(value).map_err(|e| LoaderError::Serialization {
                context: "Pipeline file does not match the expected structure".to_string(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a pipeline file.
    ///
    /// Relative `source_dir` entries are resolved against the directory
    /// containing the file.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be read, otherwise as
    /// [`PipelineConfig::from_json_str`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            LoaderError::io(format!("reading pipeline file {}", path.display()), e)
        })?;
        let mut config = Self::from_json_str(&contents)?;

        if let Some(base) = path.parent() {
            for stage in &mut config.stages {
                if stage.source_dir.is_relative() {
                    stage.source_dir = base.join(&stage.source_dir);
                }
            }
        }

        Ok(config)
    }

    /// Semantic checks the JSON Schema cannot express.
    ///
    /// # Errors
    /// Returns a configuration error on the first violation.
    pub fn validate(&self) -> Result<()> {
        validate_identifier("schema", &self.schema)?;
        self.options.validate()?;

        let mut names = HashSet::new();
        for stage in &self.stages {
            if stage.name.trim().is_empty() {
                return Err(LoaderError::configuration("stage name cannot be empty"));
            }
            if !names.insert(stage.name.as_str()) {
                return Err(LoaderError::configuration(format!(
                    "Stage '{}' is defined more than once",
                    stage.name
                )));
            }
            if stage.cdm_version.is_some() && stage.tables.is_some() {
                return Err(LoaderError::configuration(format!(
                    "Stage '{}' sets both cdm_version and tables",
                    stage.name
                )));
            }
            for table in stage.source_files.keys() {
                validate_identifier("table", table)?;
            }
            stage.options.apply(&self.options).validate()?;
        }

        Ok(())
    }

    /// Names of stages that will not run.
    pub fn disabled_stages(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| !s.enabled)
            .map(|s| s.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PIPELINE: &str = r#"{
        "schema": "cdm",
        "options": { "batch_size": 500 },
        "stages": [
            { "name": "vocabulary", "source_dir": "vocab", "cdm_version": "5.3" },
            {
                "name": "local concepts",
                "enabled": false,
                "source_dir": "/data/local",
                "tables": ["concept"],
                "options": { "truncate_before_load": false }
            }
        ]
    }"#;

    #[test]
    fn test_parse_pipeline() {
        let config = PipelineConfig::from_json_str(PIPELINE).unwrap();
        assert_eq!(config.schema, "cdm");
        assert_eq!(config.options.batch_size, 500);
        assert!(config.options.truncate_before_load);
        assert_eq!(config.stages.len(), 2);
        assert_eq!(config.stages[0].cdm_version, Some(CdmVersion::V5_3));
        assert!(config.stages[0].enabled);
        assert_eq!(config.stages[1].options.truncate_before_load, Some(false));
        assert_eq!(config.disabled_stages(), vec!["local concepts"]);
    }

    #[test]
    fn test_malformed_json_is_serialization_error() {
        let result = PipelineConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(LoaderError::Serialization { .. })));
    }

    #[test]
    fn test_schema_violation_is_configuration_error() {
        let result = PipelineConfig::from_json_str(r#"{ "schema": "cdm" }"#);
        assert!(matches!(result, Err(LoaderError::Configuration { .. })));
    }

    #[test]
    fn test_duplicate_stage_names_rejected() {
        let json = r#"{
            "schema": "cdm",
            "stages": [
                { "name": "vocabulary", "source_dir": "a" },
                { "name": "vocabulary", "source_dir": "b" }
            ]
        }"#;
        let error = PipelineConfig::from_json_str(json).unwrap_err();
        assert!(error.to_string().contains("more than once"));
    }

    #[test]
    fn test_from_file_resolves_relative_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(PIPELINE.as_bytes()).unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.stages[0].source_dir, dir.path().join("vocab"));
        assert_eq!(config.stages[1].source_dir, PathBuf::from("/data/local"));
    }

    #[test]
    fn test_from_missing_file_is_io_error() {
        let result = PipelineConfig::from_file(Path::new("/nonexistent/pipeline.json"));
        assert!(matches!(result, Err(LoaderError::Io { .. })));
    }

    #[test]
    fn test_single_stage() {
        let config = PipelineConfig::single_stage(
            "cdm",
            StageConfig::new("vocabulary", "/data"),
            LoadOptions::default(),
        );
        assert!(config.validate().is_ok());
        assert!(config.disabled_stages().is_empty());
    }
}
