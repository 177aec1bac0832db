//! Lifecycle of one named dataset inside a diff operation
//!
//! `Uninitialized → BuildingSnapshot → ReadyToClassify → Classifying → Finalized`
//!
//! A missing or unreachable baseline moves `BuildingSnapshot` to
//! `ReadyToClassify` with an empty index. A current stream that ends before
//! its header may finalize straight from `ReadyToClassify`.

use crate::classifier::{ClassificationCounts, ClassifiedRow, DiffClassifier};
use crate::config::DatasetConfig;
use crate::error::{Result, RowdiffError};
use crate::row_source::Row;
use crate::snapshot::{SnapshotIndex, SnapshotStats};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DatasetState {
    Uninitialized,
    BuildingSnapshot,
    ReadyToClassify,
    Classifying,
    Finalized,
}

impl fmt::Display for DatasetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where the comparison point for a dataset came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaselineStatus {
    /// Previous dataset found and indexed
    Indexed { run_id: String, rows: u64 },
    /// No earlier qualifying run exists
    NoPreviousRun,
    /// The previous run did not produce this dataset
    DatasetMissing { run_id: String },
    /// The previous dataset could not be read within the retry budget
    Unavailable { reason: String },
}

impl BaselineStatus {
    pub fn is_indexed(&self) -> bool {
        matches!(self, BaselineStatus::Indexed { .. })
    }
}

impl fmt::Display for BaselineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaselineStatus::Indexed { run_id, rows } => {
                write!(f, "{} rows from run {}", rows, run_id)
            }
            BaselineStatus::NoPreviousRun => write!(f, "no previous run"),
            BaselineStatus::DatasetMissing { run_id } => {
                write!(f, "not produced by run {}", run_id)
            }
            BaselineStatus::Unavailable { reason } => write!(f, "unavailable ({})", reason),
        }
    }
}

/// Result of a finalized dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finalized {
    /// Previous rows with no current counterpart, in previous-dataset order
    pub deleted: Vec<Row>,
    pub counts: ClassificationCounts,
}

#[derive(Debug)]
pub struct DatasetDiff {
    name: String,
    config: DatasetConfig,
    state: DatasetState,
    baseline: Option<BaselineStatus>,
    snapshot_stats: SnapshotStats,
    snapshot: Option<SnapshotIndex>,
    classifier: Option<DiffClassifier>,
}

impl DatasetDiff {
    pub fn new(name: impl Into<String>, config: DatasetConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: DatasetState::Uninitialized,
            baseline: None,
            snapshot_stats: SnapshotStats::default(),
            snapshot: None,
            classifier: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn state(&self) -> DatasetState {
        self.state
    }

    pub fn baseline(&self) -> Option<&BaselineStatus> {
        self.baseline.as_ref()
    }

    pub fn snapshot_stats(&self) -> SnapshotStats {
        self.snapshot_stats
    }

    /// Headers of the indexed previous dataset, empty without a baseline
    pub fn previous_headers(&self) -> &[String] {
        self.snapshot.as_ref().map(|s| s.headers()).unwrap_or(&[])
    }

    /// Validate the dataset's configuration and start the build phase
    pub fn begin_snapshot(&mut self) -> Result<()> {
        self.require_state(DatasetState::Uninitialized, DatasetState::BuildingSnapshot)?;
        self.config.validate(&self.name)?;
        self.state = DatasetState::BuildingSnapshot;
        Ok(())
    }

    pub fn snapshot_built(&mut self, index: SnapshotIndex, run_id: impl Into<String>) -> Result<()> {
        self.require_state(DatasetState::BuildingSnapshot, DatasetState::ReadyToClassify)?;
        self.snapshot_stats = index.stats();
        self.baseline = Some(BaselineStatus::Indexed {
            run_id: run_id.into(),
            rows: index.len() as u64,
        });
        self.snapshot = Some(index);
        self.state = DatasetState::ReadyToClassify;
        Ok(())
    }

    /// Continue without a comparison point; every current row will be Added
    pub fn without_baseline(&mut self, status: BaselineStatus) -> Result<()> {
        self.require_state(DatasetState::BuildingSnapshot, DatasetState::ReadyToClassify)?;
        log::info!("Dataset '{}': {}; all rows will be classified as Added", self.name, status);
        self.baseline = Some(status);
        self.snapshot = Some(SnapshotIndex::empty());
        self.state = DatasetState::ReadyToClassify;
        Ok(())
    }

    /// Take the current header row and open the classification pass
    pub fn start_classifying(&mut self, headers: Row) -> Result<()> {
        self.require_state(DatasetState::ReadyToClassify, DatasetState::Classifying)?;
        let index = self.snapshot.take().unwrap_or_default();
        self.classifier = Some(DiffClassifier::new(index, headers, &self.config)?);
        self.state = DatasetState::Classifying;
        Ok(())
    }

    pub fn classify(&mut self, row: Row) -> Result<ClassifiedRow> {
        if self.state == DatasetState::Classifying {
            if let Some(classifier) = self.classifier.as_mut() {
                return Ok(classifier.classify(row));
            }
        }
        Err(self.invalid_transition(DatasetState::Classifying))
    }

    pub fn counts(&self) -> ClassificationCounts {
        self.classifier
            .as_ref()
            .map(|c| c.counts())
            .unwrap_or_default()
    }

    /// End the pass and release the deleted rows. Runs exactly once.
    pub fn finalize(&mut self) -> Result<Finalized> {
        let (deleted, counts) = match self.state {
            DatasetState::Classifying => match self.classifier.take() {
                Some(classifier) => classifier.finish(),
                None => return Err(self.invalid_transition(DatasetState::Finalized)),
            },
            DatasetState::ReadyToClassify => {
                // Current stream had no header: every previous row is gone
                let index = self.snapshot.take().unwrap_or_default();
                let deleted: Vec<Row> = index.into_entries().map(|e| e.raw_row).collect();
                let counts = ClassificationCounts {
                    deleted: deleted.len() as u64,
                    ..ClassificationCounts::default()
                };
                (deleted, counts)
            }
            _ => return Err(self.invalid_transition(DatasetState::Finalized)),
        };

        self.state = DatasetState::Finalized;
        log::info!(
            "Dataset '{}' finalized: {} added, {} modified, {} unmodified, {} deleted",
            self.name,
            counts.added,
            counts.modified,
            counts.unmodified,
            counts.deleted
        );

        Ok(Finalized { deleted, counts })
    }

    fn require_state(&self, from: DatasetState, to: DatasetState) -> Result<()> {
        if self.state == from {
            Ok(())
        } else {
            Err(self.invalid_transition(to))
        }
    }

    fn invalid_transition(&self, to: DatasetState) -> RowdiffError {
        RowdiffError::InvalidState {
            dataset: self.name.clone(),
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }
}
