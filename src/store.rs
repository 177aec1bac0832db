//! File-system run store
//!
//! Layout:
//!
//! ```text
//! <store>/runs/<run_id>/run.json
//! <store>/runs/<run_id>/<dataset>.csv[.zst]
//! ```
//!
//! The store is the CLI's [`RunHistory`]: it answers which completed run is
//! the baseline of a new one and where that run's datasets live.

use crate::error::{Result, RowdiffError};
use crate::history::{ByteStream, DatasetLocation, RunHandle, RunHistory, RunIdentity};
use crate::FORMAT_VERSION;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const RUN_FILE: &str = "run.json";
const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Metadata of one recorded run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub format_version: String,
    #[serde(flatten)]
    pub identity: RunIdentity,
    pub status: RunStatus,
    /// Dataset name to file name inside the run directory
    pub datasets: IndexMap<String, String>,
}

/// Manages a run store directory
#[derive(Debug, Clone)]
pub struct RunStore {
    pub root: PathBuf,
    pub runs_dir: PathBuf,
}

impl RunStore {
    /// Open an existing store or create an empty one
    pub fn open_or_create(root: &Path) -> Result<Self> {
        let store = Self::from_root(root.to_path_buf());
        if store.runs_dir.is_dir() {
            return Ok(store);
        }
        Self::create(root)
    }

    /// Open a store that must already exist
    pub fn open(root: &Path) -> Result<Self> {
        let store = Self::from_root(root.to_path_buf());
        if !store.runs_dir.is_dir() {
            return Err(RowdiffError::InvalidStore {
                path: root.to_path_buf(),
            });
        }
        Ok(store)
    }

    pub fn create(root: &Path) -> Result<Self> {
        let store = Self::from_root(root.to_path_buf());
        fs::create_dir_all(&store.runs_dir)?;
        log::info!("Created run store at: {}", store.root.display());
        Ok(store)
    }

    fn from_root(root: PathBuf) -> Self {
        let runs_dir = root.join("runs");
        Self { root, runs_dir }
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.runs_dir.join(run_id)
    }

    /// Copy a run's datasets into the store and write its metadata
    pub fn record_run(
        &self,
        identity: &RunIdentity,
        status: RunStatus,
        inputs: &IndexMap<String, PathBuf>,
        compress: bool,
    ) -> Result<RunRecord> {
        let run_dir = self.run_dir(&identity.run_id);
        if run_dir.join(RUN_FILE).exists() {
            return Err(RowdiffError::invalid_input(format!(
                "Run {} is already recorded",
                identity.run_id
            )));
        }
        fs::create_dir_all(&run_dir)?;

        let mut datasets = IndexMap::new();
        for (name, source) in inputs {
            let file_name = store_dataset(source, &run_dir, name, compress)?;
            log::debug!("Stored dataset '{}' as {}", name, file_name);
            datasets.insert(name.clone(), file_name);
        }

        let record = RunRecord {
            format_version: FORMAT_VERSION.to_string(),
            identity: identity.clone(),
            status,
            datasets,
        };
        self.write_record(&record)?;
        log::info!("Recorded run {} ({})", identity.run_id, status);
        Ok(record)
    }

    /// Change the status of a recorded run
    pub fn set_status(&self, run_id: &str, status: RunStatus) -> Result<RunRecord> {
        let mut record = self.load_run(run_id)?;
        record.status = status;
        self.write_record(&record)?;
        Ok(record)
    }

    fn write_record(&self, record: &RunRecord) -> Result<()> {
        let path = self.run_dir(&record.identity.run_id).join(RUN_FILE);
        let content = serde_json::to_string_pretty(record)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn load_run(&self, run_id: &str) -> Result<RunRecord> {
        let path = self.run_dir(run_id).join(RUN_FILE);
        if !path.exists() {
            return Err(RowdiffError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// All recorded runs, oldest first. Unreadable metadata is skipped.
    pub fn list_runs(&self) -> Result<Vec<RunRecord>> {
        let mut runs = Vec::new();
        if !self.runs_dir.exists() {
            return Ok(runs);
        }

        for entry in WalkDir::new(&self.runs_dir).min_depth(2).max_depth(2) {
            let entry = entry?;
            if entry.file_name() != RUN_FILE {
                continue;
            }
            let parsed = fs::read_to_string(entry.path())
                .map_err(RowdiffError::from)
                .and_then(|content| serde_json::from_str::<RunRecord>(&content).map_err(Into::into));
            match parsed {
                Ok(record) => runs.push(record),
                Err(e) => log::warn!("Ignoring {}: {}", entry.path().display(), e),
            }
        }

        runs.sort_by(|a, b| a.identity.created_at.cmp(&b.identity.created_at));
        Ok(runs)
    }
}

impl RunHistory for RunStore {
    fn find_previous_run(&self, current: &RunIdentity) -> Result<Option<RunHandle>> {
        let previous = self
            .list_runs()?
            .into_iter()
            .filter(|r| r.status == RunStatus::Completed)
            .filter(|r| current.accepts_predecessor(&r.identity))
            .max_by_key(|r| r.identity.created_at);
        Ok(previous.map(|r| r.identity.handle()))
    }

    fn resolve_dataset_location(
        &self,
        run: &RunHandle,
        dataset: &str,
    ) -> Result<Option<DatasetLocation>> {
        let record = self.load_run(&run.run_id)?;
        Ok(record.datasets.get(dataset).map(|file| {
            let path = self.run_dir(&run.run_id).join(file);
            DatasetLocation::new(path.to_string_lossy())
        }))
    }

    fn open_read_stream(&self, location: &DatasetLocation) -> Result<ByteStream> {
        open_dataset_file(Path::new(&location.uri))
    }
}

/// A single previous file standing in for a whole run history.
///
/// A missing previous file is reported as a run without the dataset, so the
/// diff goes ahead with every current row Added.
#[derive(Debug, Clone)]
pub struct FileBaseline {
    dataset: String,
    path: PathBuf,
    run: RunHandle,
}

impl FileBaseline {
    pub fn new(dataset: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let created_at = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Self {
            dataset: dataset.into(),
            run: RunHandle {
                run_id: path.display().to_string(),
                created_at,
            },
            path,
        }
    }
}

impl RunHistory for FileBaseline {
    fn find_previous_run(&self, _current: &RunIdentity) -> Result<Option<RunHandle>> {
        Ok(Some(self.run.clone()))
    }

    fn resolve_dataset_location(
        &self,
        _run: &RunHandle,
        dataset: &str,
    ) -> Result<Option<DatasetLocation>> {
        if dataset != self.dataset {
            return Ok(None);
        }
        if !self.path.is_file() {
            log::warn!("Previous file {} does not exist", self.path.display());
            return Ok(None);
        }
        Ok(Some(DatasetLocation::new(self.path.to_string_lossy())))
    }

    fn open_read_stream(&self, location: &DatasetLocation) -> Result<ByteStream> {
        open_dataset_file(Path::new(&location.uri))
    }
}

/// Open a dataset file, decompressing `.zst` files on the fly
pub fn open_dataset_file(path: &Path) -> Result<ByteStream> {
    let file = fs::File::open(path)?;
    if is_zstd(path) {
        Ok(Box::new(zstd::stream::read::Decoder::new(file)?))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn is_zstd(path: &Path) -> bool {
    path.extension().map(|e| e == "zst").unwrap_or(false)
}

/// Copy one dataset into a run directory, returning its stored file name
fn store_dataset(source: &Path, run_dir: &Path, dataset: &str, compress: bool) -> Result<String> {
    if is_zstd(source) {
        let file_name = format!("{}.csv.zst", dataset);
        fs::copy(source, run_dir.join(&file_name))?;
        return Ok(file_name);
    }

    if compress {
        let file_name = format!("{}.csv.zst", dataset);
        let reader = BufReader::new(fs::File::open(source)?);
        let writer = fs::File::create(run_dir.join(&file_name))?;
        zstd::stream::copy_encode(reader, writer, ZSTD_LEVEL)?;
        Ok(file_name)
    } else {
        let file_name = format!("{}.csv", dataset);
        fs::copy(source, run_dir.join(&file_name))?;
        Ok(file_name)
    }
}

/// Read a whole dataset file, decompressing if needed
pub fn read_dataset_file(path: &Path) -> Result<String> {
    let mut stream = open_dataset_file(path)?;
    let mut content = String::new();
    io::Read::read_to_string(&mut stream, &mut content)?;
    Ok(content)
}
