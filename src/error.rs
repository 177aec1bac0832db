//! Error types for rowdiff operations

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RowdiffError>;

/// Which side of a diff a header belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Previous,
    Current,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Previous => write!(f, "previous"),
            Side::Current => write!(f, "current"),
        }
    }
}

#[derive(Error, Debug)]
pub enum RowdiffError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing primary key {column} in {side} file")]
    MissingPrimaryKey { column: String, side: Side },

    #[error("Transient error: {message}")]
    Transient { message: String },

    #[error("Timed out after {seconds}s waiting for previous dataset '{dataset}'")]
    BaselineTimeout { dataset: String, seconds: u64 },

    #[error("Timed out after {seconds}s looking up the previous run")]
    LookupTimeout { seconds: u64 },

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Invalid run store: {}", path.display())]
    InvalidStore { path: PathBuf },

    #[error("Dataset '{dataset}' cannot move from {from} to {to}")]
    InvalidState {
        dataset: String,
        from: String,
        to: String,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl RowdiffError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient {
            message: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    pub fn missing_primary_key(column: impl Into<String>, side: Side) -> Self {
        Self::MissingPrimaryKey {
            column: column.into(),
            side,
        }
    }

    /// Configuration errors are fatal for the dataset they belong to
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::MissingPrimaryKey { .. })
    }

    /// Errors worth another attempt at reading the previous dataset
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) | Self::Transient { .. } => true,
            Self::Csv(e) => matches!(e.kind(), csv::ErrorKind::Io(_)),
            _ => false,
        }
    }
}
