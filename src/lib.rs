//! # rowdiff
//!
//! Streaming row-level diff of CSV datasets. Each dataset of a run is
//! compared with the same dataset from the previous equivalent run and
//! every row is classified as Added, Modified, Unmodified or Deleted by
//! primary-key and full-row hashes.

pub mod classifier;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dataset;
pub mod error;
pub mod hash;
pub mod history;
pub mod orchestrator;
pub mod output;
pub mod progress;
pub mod retry;
pub mod row_source;
pub mod snapshot;
pub mod store;

pub use classifier::{Classification, ClassificationCounts, DiffClassifier};
pub use config::{DatasetConfig, DiffSettings};
pub use error::{Result, RowdiffError};
pub use history::{RunHistory, RunIdentity};
pub use orchestrator::{DiffOrchestrator, DiffReport};
pub use store::RunStore;

/// Current format version of run metadata files
pub const FORMAT_VERSION: &str = "1.0.0";
