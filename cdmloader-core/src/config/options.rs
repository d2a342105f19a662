//! Per-run load options.

use crate::error::{LoaderError, Result};
use serde::{Deserialize, Serialize};

/// Largest accepted `batch_size`.
pub const MAX_BATCH_SIZE: usize = 100_000;

/// Field layout of source files.
///
/// Vocabulary bundles are tab-delimited and contain bare `"` characters in
/// concept names, so quoting is off unless a quote character is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceFormat {
    /// Field separator
    pub delimiter: char,
    /// Quote character; `None` reads quotes literally
    pub quote: Option<char>,
}

impl Default for SourceFormat {
    fn default() -> Self {
        Self {
            delimiter: '\t',
            quote: None,
        }
    }
}

impl SourceFormat {
    /// Checks that both characters are single-byte and distinct.
    pub fn validate(&self) -> Result<()> {
        if !self.delimiter.is_ascii() || matches!(self.delimiter, '\n' | '\r') {
            return Err(LoaderError::configuration(format!(
                "delimiter {:?} must be a single ASCII character other than a line break",
                self.delimiter
            )));
        }

        if let Some(quote) = self.quote {
            if !quote.is_ascii() {
                return Err(LoaderError::configuration(format!(
                    "quote {:?} must be a single ASCII character",
                    quote
                )));
            }
            if quote == self.delimiter {
                return Err(LoaderError::configuration(
                    "quote and delimiter must differ",
                ));
            }
        }

        Ok(())
    }

    /// Delimiter as the byte the reader expects.
    pub fn delimiter_byte(&self) -> u8 {
        ascii_byte(self.delimiter)
    }

    /// Quote as a byte, if quoting is on.
    pub fn quote_byte(&self) -> Option<u8> {
        self.quote.map(ascii_byte)
    }
}

// Callers validate first; anything wider falls back to tab.
fn ascii_byte(c: char) -> u8 {
    u8::try_from(c).ok().filter(u8::is_ascii).unwrap_or(b'\t')
}

/// Options applied to every table of one `load_all` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Empty each table before inserting into it
    pub truncate_before_load: bool,
    /// Lowercase source headers before matching destination columns
    pub case_normalize_headers: bool,
    /// Maximum rows per INSERT statement
    pub batch_size: usize,
    /// Fail a table whose source has columns the destination lacks
    pub strict_unmapped_columns: bool,
    #[serde(flatten)]
    pub format: SourceFormat,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            truncate_before_load: true,
            case_normalize_headers: true,
            batch_size: 1000,
            strict_unmapped_columns: false,
            format: SourceFormat::default(),
        }
    }
}

impl LoadOptions {
    /// Validates option values.
    ///
    /// # Errors
    /// Returns a configuration error for an out-of-range batch size or an
    /// unusable source format.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(LoaderError::configuration(
                "batch_size must be greater than 0",
            ));
        }

        if self.batch_size > MAX_BATCH_SIZE {
            return Err(LoaderError::configuration(format!(
                "batch_size should not exceed {}",
                MAX_BATCH_SIZE
            )));
        }

        self.format.validate()
    }
}

/// Partial options; set fields replace the corresponding defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionOverrides {
    /// Overrides `truncate_before_load`
    pub truncate_before_load: Option<bool>,
    /// Overrides `case_normalize_headers`
    pub case_normalize_headers: Option<bool>,
    /// Overrides `batch_size`
    pub batch_size: Option<usize>,
    /// Overrides `strict_unmapped_columns`
    pub strict_unmapped_columns: Option<bool>,
    /// Overrides the delimiter
    pub delimiter: Option<char>,
    /// `Some(None)` disables quoting explicitly
    #[serde(
        default,
        deserialize_with = "deserialize_explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub quote: Option<Option<char>>,
}

// Distinguishes an absent field (`None`) from `"quote": null` (`Some(None)`).
fn deserialize_explicit_null<'de, D>(deserializer: D) -> std::result::Result<Option<Option<char>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<char>::deserialize(deserializer).map(Some)
}

impl OptionOverrides {
    /// Applies the overrides on top of `base`.
    pub fn apply(&self, base: &LoadOptions) -> LoadOptions {
        LoadOptions {
            truncate_before_load: self
                .truncate_before_load
                .unwrap_or(base.truncate_before_load),
            case_normalize_headers: self
                .case_normalize_headers
                .unwrap_or(base.case_normalize_headers),
            batch_size: self.batch_size.unwrap_or(base.batch_size),
            strict_unmapped_columns: self
                .strict_unmapped_columns
                .unwrap_or(base.strict_unmapped_columns),
            format: SourceFormat {
                delimiter: self.delimiter.unwrap_or(base.format.delimiter),
                quote: self.quote.unwrap_or(base.format.quote),
            },
        }
    }
}
