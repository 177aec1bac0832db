//! Command-line interface for rowdiff

use crate::config::ModifiedOutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rowdiff")]
#[command(about = "Row-level diff of CSV datasets against the previous run")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Hide progress spinners
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Diff two CSV files directly
    Diff {
        /// Previous version of the dataset
        previous: PathBuf,

        /// Current version of the dataset
        current: PathBuf,

        /// Primary key column(s), comma separated or repeated
        #[arg(long = "key", short = 'k', required = true, value_delimiter = ',')]
        keys: Vec<String>,

        /// Dataset name used for output file names
        #[arg(long, default_value = "data", value_parser = validate_dataset_name)]
        name: String,

        /// Directory for the classified outputs
        #[arg(long, default_value = "rowdiff-out")]
        out: PathBuf,

        /// Modified output format: newAll, newChangedOnly, oldAll or oldChangedOnly
        #[arg(long, default_value = "newAll", value_parser = ModifiedOutputFormat::parse)]
        modified_output: ModifiedOutputFormat,

        /// Value written for unchanged columns by the changed-only formats
        #[arg(long)]
        unmodified_value: Option<String>,

        /// Field delimiter
        #[arg(long, default_value = ",", value_parser = validate_csv_char)]
        delimiter: char,

        /// Quote character
        #[arg(long, default_value = "\"", value_parser = validate_csv_char)]
        quote: char,

        /// Output format: "pretty", "json"
        #[arg(long, default_value = "pretty", value_parser = OutputFormat::parse)]
        format: OutputFormat,
    },

    /// Diff a run's datasets against the previous equivalent run in a store
    Run {
        /// Run store directory
        #[arg(long)]
        store: PathBuf,

        /// Diff parameters (JSON)
        #[arg(long)]
        config: PathBuf,

        /// Job name of this run
        #[arg(long)]
        job: String,

        /// Channel of this run
        #[arg(long)]
        channel: String,

        #[arg(long)]
        product: Option<String>,

        #[arg(long)]
        tenant: Option<String>,

        #[arg(long)]
        ingress: Option<String>,

        /// Current dataset as name=path; repeat for each dataset
        #[arg(long = "input", required = true, value_parser = parse_input)]
        inputs: Vec<(String, PathBuf)>,

        /// Directory for the classified outputs
        #[arg(long, default_value = "rowdiff-out")]
        out: PathBuf,

        /// Record this run in the store so later runs can diff against it
        #[arg(long)]
        record: bool,

        /// Store recorded datasets zstd-compressed
        #[arg(long, requires = "record")]
        compress: bool,

        /// Output format: "pretty", "json"
        #[arg(long, default_value = "pretty", value_parser = OutputFormat::parse)]
        format: OutputFormat,
    },

    /// List runs recorded in a store
    Runs {
        /// Run store directory
        #[arg(long)]
        store: PathBuf,

        /// Output format: "pretty", "json"
        #[arg(long, default_value = "pretty", value_parser = OutputFormat::parse)]
        format: OutputFormat,
    },
}

/// Parse output format string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Pretty,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {}. Use 'pretty' or 'json'", s)),
        }
    }
}

/// Parse `name=path`
fn parse_input(s: &str) -> Result<(String, PathBuf), String> {
    let (name, path) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid input '{}'. Expected name=path", s))?;
    let name = validate_dataset_name(name.trim())?;
    if path.trim().is_empty() {
        return Err(format!("Input '{}' has no path", name));
    }
    Ok((name, PathBuf::from(path.trim())))
}

/// Dataset names end up in file names
fn validate_dataset_name(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("Dataset name cannot be empty".to_string());
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(format!(
            "Invalid dataset name: '{}'. Use letters, digits, '_', '-' or '.'",
            s
        ));
    }
    Ok(s.to_string())
}

fn validate_csv_char(s: &str) -> Result<char, String> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c),
        _ => Err(format!("Expected a single ASCII character, got '{}'", s)),
    }
}
