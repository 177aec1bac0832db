//! Diff orchestration across the datasets of one run
//!
//! For every dataset the orchestrator finds the previous run's copy, builds
//! its snapshot index within the retry and time budget, then streams the
//! current dataset through the classifier into the output sinks. Datasets
//! are independent: each runs on its own rayon task and a failure in one is
//! reported without touching its siblings.

use crate::classifier::{Classification, ClassificationCounts};
use crate::config::{CsvFormat, DatasetConfig, DiffSettings, RetryPolicy};
use crate::dataset::{BaselineStatus, DatasetDiff, DatasetState};
use crate::error::{Result, RowdiffError};
use crate::history::{ByteStream, DatasetLocation, RunHandle, RunHistory, RunIdentity};
use crate::output::{DatasetWriter, OutputSinks};
use crate::progress::{finish_phase, ProgressReporter};
use crate::retry::retry_with_backoff;
use crate::row_source::{Row, RowSource};
use crate::snapshot::SnapshotIndex;
use indexmap::IndexMap;
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Outcome of the previous-run lookup, shared by every dataset of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviousRun {
    Found(RunHandle),
    NotFound,
    Unavailable(String),
}

impl PreviousRun {
    pub fn handle(&self) -> Option<&RunHandle> {
        match self {
            PreviousRun::Found(run) => Some(run),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetReport {
    pub dataset: String,
    pub state: DatasetState,
    pub baseline: BaselineStatus,
    pub counts: ClassificationCounts,
    pub previous_rows_skipped: u64,
    pub current_rows_skipped: u64,
    pub duplicate_keys: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DatasetOutcome {
    Completed(DatasetReport),
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    pub run_id: String,
    pub previous_run: Option<RunHandle>,
    pub datasets: IndexMap<String, DatasetOutcome>,
}

impl DiffReport {
    pub fn dataset(&self, name: &str) -> Option<&DatasetReport> {
        match self.datasets.get(name) {
            Some(DatasetOutcome::Completed(report)) => Some(report),
            _ => None,
        }
    }

    /// Names and messages of datasets that failed
    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.datasets
            .iter()
            .filter_map(|(name, outcome)| match outcome {
                DatasetOutcome::Failed { error } => Some((name.as_str(), error.as_str())),
                DatasetOutcome::Completed(_) => None,
            })
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        self.datasets
            .values()
            .any(|o| matches!(o, DatasetOutcome::Failed { .. }))
    }
}

pub struct DiffOrchestrator {
    history: Arc<dyn RunHistory>,
    settings: DiffSettings,
    progress: ProgressReporter,
}

impl DiffOrchestrator {
    pub fn new(history: Arc<dyn RunHistory>, settings: DiffSettings) -> Self {
        Self {
            history,
            settings,
            progress: ProgressReporter::new_minimal(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn settings(&self) -> &DiffSettings {
        &self.settings
    }

    /// Diff every input dataset of `current` and write the classified rows.
    ///
    /// Run-level settings are validated first; per-dataset problems are
    /// reported in the returned [`DiffReport`].
    pub fn run(
        &self,
        current: &RunIdentity,
        inputs: IndexMap<String, ByteStream>,
        sinks: &dyn OutputSinks,
    ) -> Result<DiffReport> {
        self.settings.validate()?;

        for name in self.settings.datasets.keys() {
            if !inputs.contains_key(name) {
                log::warn!("Dataset '{}' is configured but has no current input; skipping", name);
            }
        }

        let previous = self.locate_previous_run(current);
        let inputs: Vec<(String, ByteStream)> = inputs.into_iter().collect();

        let outcomes: Vec<(String, DatasetOutcome)> = inputs
            .into_par_iter()
            .map(|(name, stream)| {
                let outcome = match self.diff_dataset(&name, &previous, stream, sinks) {
                    Ok(report) => DatasetOutcome::Completed(report),
                    Err(e) => {
                        log::error!("Dataset '{}' failed: {}", name, e);
                        DatasetOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                };
                (name, outcome)
            })
            .collect();

        Ok(DiffReport {
            run_id: current.run_id.clone(),
            previous_run: previous.handle().cloned(),
            datasets: outcomes.into_iter().collect(),
        })
    }

    /// Look up the baseline run, retrying transient failures.
    ///
    /// The lookup runs on a worker thread so a registry that never answers
    /// cannot hold the run past its time budget.
    pub fn locate_previous_run(&self, current: &RunIdentity) -> PreviousRun {
        let policy = self.settings.retry;
        let deadline = Instant::now() + policy.timeout();
        let history = Arc::clone(&self.history);
        let identity = current.clone();

        let lookup = run_until(deadline, "rowdiff-lookup".to_string(), move || {
            retry_with_backoff(&policy, deadline, "Previous run lookup", |_| {
                history.find_previous_run(&identity)
            })
        })
        .unwrap_or_else(|| {
            Err(RowdiffError::LookupTimeout {
                seconds: policy.timeout_secs,
            })
        });

        match lookup {
            Ok(Some(run)) => {
                log::info!("Using run {} as the baseline for run {}", run.run_id, current.run_id);
                PreviousRun::Found(run)
            }
            Ok(None) => {
                log::info!("No previous run for job '{}' on channel '{}'", current.job_name, current.channel);
                PreviousRun::NotFound
            }
            Err(e) => {
                log::warn!("Previous run lookup failed: {}; diffing without a baseline", e);
                PreviousRun::Unavailable(e.to_string())
            }
        }
    }

    /// Set up one dataset and run its build phase
    pub fn prepare_dataset(&self, name: &str, previous: &PreviousRun) -> Result<DatasetDiff> {
        let config = self.settings.datasets.get(name).cloned().ok_or_else(|| {
            RowdiffError::config(format!("No diff parameters configured for dataset '{}'", name))
        })?;

        let mut diff = DatasetDiff::new(name, config);
        diff.begin_snapshot()?;

        let run = match previous {
            PreviousRun::Found(run) => run,
            PreviousRun::NotFound => {
                diff.without_baseline(BaselineStatus::NoPreviousRun)?;
                return Ok(diff);
            }
            PreviousRun::Unavailable(reason) => {
                diff.without_baseline(BaselineStatus::Unavailable {
                    reason: reason.clone(),
                })?;
                return Ok(diff);
            }
        };

        match self.load_baseline(name, diff.config(), run) {
            Ok(Some(index)) => diff.snapshot_built(index, run.run_id.clone())?,
            Ok(None) => diff.without_baseline(BaselineStatus::DatasetMissing {
                run_id: run.run_id.clone(),
            })?,
            Err(e) if e.is_config() => return Err(e),
            Err(e) => {
                log::warn!("Previous '{}' could not be indexed: {}", name, e);
                diff.without_baseline(BaselineStatus::Unavailable {
                    reason: e.to_string(),
                })?;
            }
        }

        Ok(diff)
    }

    /// Stream the current dataset through the classifier into the sinks
    pub fn classify_dataset(
        &self,
        diff: &mut DatasetDiff,
        current: ByteStream,
        sinks: &dyn OutputSinks,
    ) -> Result<DatasetReport> {
        let name = diff.name().to_string();
        let csv = &self.settings.csv;
        let mut source = RowSource::new(current, csv)?.with_label(format!("{} (current)", name));
        let pb = self.progress.rows_spinner(&format!("Classifying {}", name));

        let mut writer = match source.next() {
            Some(header) => {
                let header = header?;
                diff.start_classifying(header.clone())?;
                let mut writer = DatasetWriter::open(sinks, &name, csv)?;
                writer.write_header(&header)?;

                for row in source.by_ref() {
                    let classified = diff.classify(row?)?;
                    writer.write(classified.classification, &classified.row)?;
                    pb.inc(1);
                }
                writer
            }
            None => {
                log::warn!("Current '{}' is empty; every previous row is Deleted", name);
                let mut writer = DatasetWriter::open(sinks, &name, csv)?;
                let previous_headers = diff.previous_headers().to_vec();
                if !previous_headers.is_empty() {
                    writer.write_header(&previous_headers)?;
                }
                writer
            }
        };

        let finalized = diff.finalize()?;
        for row in &finalized.deleted {
            writer.write(Classification::Deleted, row)?;
        }
        writer.finish()?;
        finish_phase(&pb, &format!("{}: {} current rows", name, finalized.counts.current_rows()));

        let snapshot = diff.snapshot_stats();
        Ok(DatasetReport {
            dataset: name,
            state: diff.state(),
            baseline: diff
                .baseline()
                .cloned()
                .unwrap_or(BaselineStatus::NoPreviousRun),
            counts: finalized.counts,
            previous_rows_skipped: snapshot.source_rows_skipped,
            current_rows_skipped: source.stats().skipped(),
            duplicate_keys: snapshot.duplicate_keys,
        })
    }

    fn diff_dataset(
        &self,
        name: &str,
        previous: &PreviousRun,
        current: ByteStream,
        sinks: &dyn OutputSinks,
    ) -> Result<DatasetReport> {
        let mut diff = self.prepare_dataset(name, previous)?;
        self.classify_dataset(&mut diff, current, sinks)
    }

    /// Index the previous run's copy of `dataset`. `None` when that run has
    /// no such dataset.
    ///
    /// Locating, opening and indexing share one deadline. They run on a
    /// worker thread; when the deadline passes the worker is told to stop
    /// and the dataset carries on without a baseline.
    fn load_baseline(
        &self,
        dataset: &str,
        config: &DatasetConfig,
        run: &RunHandle,
    ) -> Result<Option<SnapshotIndex>> {
        let policy = self.settings.retry;
        let budget = BuildBudget::new(dataset, &policy);
        let pb = self.progress.rows_spinner(&format!("Indexing previous {}", dataset));

        let job = BaselineJob {
            history: Arc::clone(&self.history),
            run: run.clone(),
            dataset: dataset.to_string(),
            primary_key_columns: config.primary_key_columns.clone(),
            csv: self.settings.csv,
            policy,
            budget: budget.clone(),
            pb: pb.clone(),
        };
        let result = run_until(budget.deadline, format!("rowdiff-index-{}", dataset), move || job.run())
            .unwrap_or_else(|| {
                budget.cancel();
                Err(budget.timeout_error())
            });

        match &result {
            Ok(Some(index)) => finish_phase(&pb, &format!("Indexed {} previous {} rows", index.len(), dataset)),
            _ => pb.finish_and_clear(),
        }
        result
    }
}

/// Run `work` on its own thread and wait for its result until `deadline`.
///
/// `None` means the deadline passed first. The thread is detached then and
/// its eventual result is dropped.
fn run_until<T, F>(deadline: Instant, thread_name: String, work: F) -> Option<Result<T>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let worker = thread_name.clone();
    let spawned = thread::Builder::new().name(thread_name).spawn(move || {
        if tx.send(work()).is_err() {
            log::debug!("{} finished after its deadline; result dropped", worker);
        }
    });
    if let Err(e) = spawned {
        return Some(Err(e.into()));
    }

    let remaining = deadline.saturating_duration_since(Instant::now());
    match rx.recv_timeout(remaining) {
        Ok(result) => Some(result),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => Some(Err(RowdiffError::Generic(anyhow::anyhow!(
            "worker stopped without a result"
        )))),
    }
}

/// Deadline and cancel flag shared between a baseline worker and its caller
#[derive(Debug, Clone)]
struct BuildBudget {
    dataset: String,
    deadline: Instant,
    seconds: u64,
    cancelled: Arc<AtomicBool>,
}

impl BuildBudget {
    fn new(dataset: &str, policy: &RetryPolicy) -> Self {
        Self {
            dataset: dataset.to_string(),
            deadline: Instant::now() + policy.timeout(),
            seconds: policy.timeout_secs,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn timeout_error(&self) -> RowdiffError {
        RowdiffError::BaselineTimeout {
            dataset: self.dataset.clone(),
            seconds: self.seconds,
        }
    }

    fn check(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) || Instant::now() >= self.deadline {
            return Err(self.timeout_error());
        }
        Ok(())
    }
}

/// Yields a timeout error instead of the next row once the budget is spent
struct Budgeted<'a, I> {
    rows: I,
    budget: &'a BuildBudget,
    spent: bool,
}

impl<I> Iterator for Budgeted<'_, I>
where
    I: Iterator<Item = Result<Row>>,
{
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.spent {
            return None;
        }
        if let Err(e) = self.budget.check() {
            self.spent = true;
            return Some(Err(e));
        }
        self.rows.next()
    }
}

/// Everything a worker needs to locate and index one previous dataset
struct BaselineJob {
    history: Arc<dyn RunHistory>,
    run: RunHandle,
    dataset: String,
    primary_key_columns: Vec<String>,
    csv: CsvFormat,
    policy: RetryPolicy,
    budget: BuildBudget,
    pb: ProgressBar,
}

impl BaselineJob {
    fn run(self) -> Result<Option<SnapshotIndex>> {
        let deadline = self.budget.deadline;

        let location = retry_with_backoff(
            &self.policy,
            deadline,
            &format!("Locating previous '{}'", self.dataset),
            |_| {
                self.budget.check()?;
                self.history.resolve_dataset_location(&self.run, &self.dataset)
            },
        )?;
        let Some(location) = location else {
            return Ok(None);
        };

        let index = retry_with_backoff(
            &self.policy,
            deadline,
            &format!("Indexing previous '{}'", self.dataset),
            |attempt| {
                log::debug!(
                    "Indexing previous '{}' from {} (attempt {})",
                    self.dataset,
                    location.uri,
                    attempt
                );
                self.build_index(&location)
            },
        )?;
        Ok(Some(index))
    }

    fn build_index(&self, location: &DatasetLocation) -> Result<SnapshotIndex> {
        self.budget.check()?;
        let stream = self.history.open_read_stream(location)?;
        let mut source =
            RowSource::new(stream, &self.csv)?.with_label(format!("{} (previous)", self.dataset));
        let progress = |rows: u64| self.pb.set_position(rows);

        let rows = Budgeted {
            rows: source.by_ref(),
            budget: &self.budget,
            spent: false,
        };
        let mut index =
            SnapshotIndex::build_with_progress(rows, &self.primary_key_columns, Some(&progress))?;
        index.set_source_rows_skipped(source.stats().skipped());
        Ok(index)
    }
}
