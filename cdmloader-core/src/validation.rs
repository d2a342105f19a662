//! Validation of identifiers and pipeline configuration files.
//!
//! Schema and table names are interpolated into SQL as quoted identifiers,
//! so they are restricted to a conservative identifier grammar before any
//! statement is built. Pipeline files are checked against an embedded JSON
//! Schema and must never carry credentials.
//!
//! # Example
//! ```rust
//! use cdmloader_core::validation::validate_pipeline_json;
//! use serde_json::json;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = json!({
//!     "schema": "cdm",
//!     "stages": [
//!         { "name": "vocabulary", "source_dir": "/data/vocab", "cdm_version": "5.4" }
//!     ]
//! });
//!
//! validate_pipeline_json(&pipeline)?;
//! # Ok(())
//! # }
//! ```

use crate::error::LoaderError;
use jsonschema::Validator;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

/// Pipeline file validation errors with field-level reporting
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Schema compilation failed during initialization
    #[error("JSON Schema compilation failed: {message}")]
    SchemaCompilation { message: String },

    /// Validation failed with specific field errors
    #[error("Pipeline validation failed with {error_count} errors: {}", errors.join("; "))]
    ValidationFailed {
        error_count: usize,
        errors: Vec<String>,
    },

    /// Credential material found where none is allowed
    #[error("Security validation failed: {reason}")]
    SecurityViolation { reason: String },

    /// JSON parsing error
    #[error("JSON parsing failed: {source}")]
    JsonParsing {
        #[from]
        source: serde_json::Error,
    },
}

impl From<ValidationError> for LoaderError {
    fn from(error: ValidationError) -> Self {
        LoaderError::configuration(error.to_string())
    }
}

/// Embedded JSON Schema for pipeline files
const PIPELINE_SCHEMA: &str = r##"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "cdmloader pipeline configuration",
  "type": "object",
  "required": ["schema", "stages"],
  "additionalProperties": false,
  "properties": {
    "schema": { "$ref": "#/$defs/identifier" },
    "options": { "$ref": "#/$defs/options" },
    "stages": {
      "type": "array",
      "minItems": 1,
      "items": { "$ref": "#/$defs/stage" }
    }
  },
  "$defs": {
    "identifier": {
      "type": "string",
      "pattern": "^[A-Za-z_][A-Za-z0-9_]*$",
      "maxLength": 63
    },
    "single_char": {
      "type": "string",
      "minLength": 1,
      "maxLength": 1
    },
    "options": {
      "type": "object",
      "additionalProperties": false,
      "properties": {
        "truncate_before_load": { "type": "boolean" },
        "case_normalize_headers": { "type": "boolean" },
        "batch_size": { "type": "integer", "minimum": 1, "maximum": 100000 },
        "strict_unmapped_columns": { "type": "boolean" },
        "delimiter": { "$ref": "#/$defs/single_char" },
        "quote": {
          "oneOf": [ { "$ref": "#/$defs/single_char" }, { "type": "null" } ]
        }
      }
    },
    "stage": {
      "type": "object",
      "required": ["name", "source_dir"],
      "additionalProperties": false,
      "properties": {
        "name": { "type": "string", "minLength": 1 },
        "enabled": { "type": "boolean", "default": true },
        "source_dir": { "type": "string", "minLength": 1 },
        "cdm_version": { "enum": ["5.3", "5.4"] },
        "tables": {
          "type": "array",
          "minItems": 1,
          "uniqueItems": true,
          "items": { "$ref": "#/$defs/identifier" }
        },
        "source_files": {
          "type": "object",
          "additionalProperties": { "type": "string", "minLength": 1 }
        },
        "options": { "$ref": "#/$defs/options" }
      },
      "not": { "required": ["cdm_version", "tables"] }
    }
  }
}"##;

/// Compiled pipeline schema (initialized once)
static COMPILED_SCHEMA: OnceLock<Validator> = OnceLock::new();

fn pipeline_validator() -> Result<&'static Validator, ValidationError> {
    if let Some(validator) = COMPILED_SCHEMA.get() {
        return Ok(validator);
    }

    let schema_json: Value =
        serde_json::from_str(PIPELINE_SCHEMA).map_err(|e| ValidationError::SchemaCompilation {
            message: format!("Failed to parse embedded schema: {}", e),
        })?;

    let compiled = jsonschema::validator_for(&schema_json).map_err(|e| {
        ValidationError::SchemaCompilation {
            message: format!("Schema compilation error: {}", e),
        }
    })?;

    // Another thread may have won the race; either instance is equivalent.
    let _ = COMPILED_SCHEMA.set(compiled);
    COMPILED_SCHEMA
        .get()
        .ok_or_else(|| ValidationError::SchemaCompilation {
            message: "Pipeline schema validator unavailable".to_string(),
        })
}

/// Validates a pipeline file against the embedded JSON Schema.
///
/// Every schema violation is reported, followed by a scan for connection
/// strings with embedded passwords and credential-named fields.
///
/// # Errors
/// Returns `ValidationFailed` with one entry per violation, or
/// `SecurityViolation` if credential material is present.
pub fn validate_pipeline_json(json_value: &Value) -> Result<(), ValidationError> {
    let validator = pipeline_validator()?;

    let errors: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(ValidationError::ValidationFailed {
            error_count: errors.len(),
            errors,
        });
    }

    validate_no_credentials_recursive(json_value, "")
}

fn validate_no_credentials_recursive(value: &Value, path: &str) -> Result<(), ValidationError> {
    match value {
        Value::String(s) => {
            if ValidationPatterns::instance().contains_credentials(s) {
                return Err(ValidationError::SecurityViolation {
                    reason: format!("Connection string with credentials found at '{}'", path),
                });
            }
        }
        Value::Object(obj) => {
            for (key, val) in obj {
                let lower_key = key.to_lowercase();
                if ["password", "secret", "token", "credential"]
                    .iter()
                    .any(|term| lower_key.contains(term))
                {
                    return Err(ValidationError::SecurityViolation {
                        reason: format!("Credential-related field name found: '{}'", key),
                    });
                }

                let new_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                validate_no_credentials_recursive(val, &new_path)?;
            }
        }
        Value::Array(arr) => {
            for (index, item) in arr.iter().enumerate() {
                validate_no_credentials_recursive(item, &format!("{}[{}]", path, index))?;
            }
        }
        _ => {}
    }

    Ok(())
}

/// Pre-compiled regex patterns, lazily initialized once per process.
pub struct ValidationPatterns {
    /// SQL identifier grammar accepted for schema and table names
    pub identifier: regex::Regex,
    /// Engine type names that are safe to interpolate into a CAST
    pub type_name: regex::Regex,
    /// Connection URLs with an inline password
    pub connection_patterns: Vec<regex::Regex>,
}

impl ValidationPatterns {
    /// Gets the singleton instance of pre-compiled validation patterns.
    pub fn instance() -> &'static Self {
        static PATTERNS: OnceLock<ValidationPatterns> = OnceLock::new();
        PATTERNS.get_or_init(Self::compile)
    }

    fn compile() -> Self {
        Self {
            identifier: regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
                .expect("Invalid identifier pattern"),
            type_name: regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_ ]*$")
                .expect("Invalid type name pattern"),
            connection_patterns: vec![
                regex::Regex::new(r"postgres://[^/@\s]*:[^/@\s]*@")
                    .expect("Invalid postgres pattern"),
                regex::Regex::new(r"postgresql://[^/@\s]*:[^/@\s]*@")
                    .expect("Invalid postgresql pattern"),
                regex::Regex::new(r"sqlite://[^/@\s]*:[^/@\s]*@").expect("Invalid sqlite pattern"),
            ],
        }
    }

    /// Checks if a string contains a connection URL with an inline password.
    pub fn contains_credentials(&self, s: &str) -> bool {
        let lower = s.to_lowercase();
        self.connection_patterns
            .iter()
            .any(|pattern| pattern.is_match(&lower))
    }
}

/// Longest identifier accepted; PostgreSQL truncates beyond 63 bytes.
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Checks that `name` is a plain SQL identifier.
///
/// `kind` names the role of the identifier in the error message
/// ("schema", "table").
///
/// # Errors
/// Returns a configuration error when the name is empty, too long, or
/// contains anything beyond ASCII letters, digits and underscores.
pub fn validate_identifier(kind: &str, name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(LoaderError::configuration(format!(
            "{} name cannot be empty",
            kind
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(LoaderError::configuration(format!(
            "{} name '{}' exceeds {} characters",
            kind, name, MAX_IDENTIFIER_LENGTH
        )));
    }

    if !ValidationPatterns::instance().identifier.is_match(name) {
        return Err(LoaderError::configuration(format!(
            "Invalid {} name '{}': only letters, digits and underscores are allowed",
            kind, name
        )));
    }

    Ok(())
}

/// Whether an engine-reported type name can be interpolated into a CAST.
pub fn is_safe_type_name(type_name: &str) -> bool {
    ValidationPatterns::instance().type_name.is_match(type_name)
}
