//! Diff parameters: per-dataset primary keys, modified-row output and CSV framing

use crate::error::{Result, RowdiffError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Sentinel written in place of unchanged values by the `*ChangedOnly` formats
pub const DEFAULT_UNMODIFIED_VALUE: &str = "DDNC";

/// Upper bound for a single backoff sleep
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// What gets written to the `{dataset}Modified` output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModifiedOutputFormat {
    /// All values from the current row
    #[default]
    #[serde(rename = "newAll")]
    NewRowAll,
    /// Changed values from the current row, the sentinel elsewhere
    #[serde(rename = "newChangedOnly")]
    NewRowChangedOnly,
    /// All values from the previous row, in current column order
    #[serde(rename = "oldAll")]
    OldRowAll,
    /// Changed values from the previous row, the sentinel elsewhere
    #[serde(rename = "oldChangedOnly")]
    OldRowChangedOnly,
}

impl ModifiedOutputFormat {
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s {
            "newAll" => Ok(Self::NewRowAll),
            "newChangedOnly" => Ok(Self::NewRowChangedOnly),
            "oldAll" => Ok(Self::OldRowAll),
            "oldChangedOnly" => Ok(Self::OldRowChangedOnly),
            _ => Err(format!(
                "Invalid modified output format: {}. Use 'newAll', 'newChangedOnly', 'oldAll' or 'oldChangedOnly'",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedOutputSettings {
    #[serde(default)]
    pub output_format: ModifiedOutputFormat,

    #[serde(default, alias = "unchangedValue", skip_serializing_if = "Option::is_none")]
    pub unmodified_value: Option<String>,
}

impl ModifiedOutputSettings {
    pub fn unmodified_value(&self) -> &str {
        self.unmodified_value
            .as_deref()
            .unwrap_or(DEFAULT_UNMODIFIED_VALUE)
    }
}

/// Settings for diffing one named dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetConfig {
    /// Columns that together identify a row across runs
    pub primary_key_columns: Vec<String>,

    #[serde(default)]
    pub modified_output: ModifiedOutputSettings,
}

impl DatasetConfig {
    pub fn new<S: Into<String>>(primary_key_columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            primary_key_columns: primary_key_columns.into_iter().map(Into::into).collect(),
            modified_output: ModifiedOutputSettings::default(),
        }
    }

    pub fn with_modified_output(mut self, settings: ModifiedOutputSettings) -> Self {
        self.modified_output = settings;
        self
    }

    pub fn validate(&self, dataset: &str) -> Result<()> {
        if self.primary_key_columns.is_empty() {
            return Err(RowdiffError::config(format!(
                "Dataset '{}' has no primaryKeyColumns",
                dataset
            )));
        }

        let mut seen = HashSet::new();
        for column in &self.primary_key_columns {
            if column.trim().is_empty() {
                return Err(RowdiffError::config(format!(
                    "Dataset '{}' has a blank primary key column name",
                    dataset
                )));
            }
            if !seen.insert(column.as_str()) {
                return Err(RowdiffError::config(format!(
                    "Dataset '{}' lists primary key column '{}' more than once",
                    dataset, column
                )));
            }
        }

        Ok(())
    }
}

/// Delimited-text framing shared by every input and output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvFormat {
    pub delimiter: char,
    pub quote: char,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: '"',
        }
    }
}

impl CsvFormat {
    pub fn delimiter_byte(&self) -> Result<u8> {
        ascii_byte(self.delimiter, "delimiter")
    }

    pub fn quote_byte(&self) -> Result<u8> {
        ascii_byte(self.quote, "quote")
    }

    pub fn validate(&self) -> Result<()> {
        let delimiter = self.delimiter_byte()?;
        let quote = self.quote_byte()?;
        if delimiter == quote {
            return Err(RowdiffError::config("CSV delimiter and quote must differ"));
        }
        if matches!(delimiter, b'\n' | b'\r') {
            return Err(RowdiffError::config("CSV delimiter cannot be a line break"));
        }
        Ok(())
    }
}

fn ascii_byte(c: char, what: &str) -> Result<u8> {
    if c.is_ascii() {
        Ok(c as u8)
    } else {
        Err(RowdiffError::config(format!(
            "CSV {} must be a single ASCII character, got '{}'",
            what, c
        )))
    }
}

/// Bounds on locating and reading a previous dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Base delay between attempts, doubled after each failure
    pub base_delay_ms: u64,
    /// Overall budget for the previous-run lookup, and for locating and
    /// indexing each previous dataset
    pub timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            timeout_secs: 60,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor)).min(MAX_RETRY_DELAY)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(RowdiffError::config("retry.maxAttempts must be at least 1"));
        }
        if self.timeout_secs == 0 {
            return Err(RowdiffError::config("retry.timeoutSecs must be at least 1"));
        }
        Ok(())
    }
}

/// Full set of diff parameters, keyed by dataset name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffSettings {
    pub datasets: IndexMap<String, DatasetConfig>,

    #[serde(default)]
    pub csv: CsvFormat,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl DiffSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, name: impl Into<String>, config: DatasetConfig) -> Self {
        self.datasets.insert(name.into(), config);
        self
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            RowdiffError::config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(content)
            .map_err(|e| RowdiffError::config(format!("Invalid diff parameters: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings shared by all datasets.
    ///
    /// Per-dataset problems are left to [`DatasetConfig::validate`]
    /// so that one bad dataset does not stop its siblings.
    pub fn validate(&self) -> Result<()> {
        if self.datasets.is_empty() {
            return Err(RowdiffError::config("Diff parameters name no datasets"));
        }
        self.csv.validate()?;
        self.retry.validate()
    }
}
