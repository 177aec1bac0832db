//! Common test utilities and helpers

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rowdiff::store::{RunRecord, RunStatus};
use rowdiff::{Classification, Result, RowdiffError, RunIdentity, RunStore};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test fixture manager for creating temporary test environments
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub store: RunStore,
}

impl TestFixture {
    /// Create a new test fixture with an empty run store
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let store = RunStore::create(&temp_dir.path().join("store"))?;
        Ok(Self { temp_dir, store })
    }

    /// Get the root path of the test fixture
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn store_path(&self) -> &Path {
        &self.store.root
    }

    pub fn out_dir(&self) -> PathBuf {
        self.root().join("out")
    }

    /// Create a test CSV file from rows
    pub fn create_csv(&self, name: &str, data: &[Vec<&str>]) -> Result<PathBuf> {
        let mut content = String::new();
        for row in data {
            content.push_str(&row.join(","));
            content.push('\n');
        }
        self.create_csv_raw(name, &content)
    }

    /// Create a test CSV file with raw string content
    pub fn create_csv_raw(&self, name: &str, content: &str) -> Result<PathBuf> {
        self.create_file(name, content.as_bytes())
    }

    pub fn create_file(&self, name: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.root().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Write diff parameters JSON and return its path
    pub fn create_config(&self, config: &serde_json::Value) -> Result<PathBuf> {
        let content = serde_json::to_string_pretty(config)?;
        self.create_file("diff-params.json", content.as_bytes())
    }

    /// Record a run in the fixture's store
    pub fn record_run(
        &self,
        job: &str,
        channel: &str,
        created_at: DateTime<Utc>,
        status: RunStatus,
        datasets: &[(&str, &Path)],
    ) -> Result<RunRecord> {
        let identity = RunIdentity::new(job, channel).with_created_at(created_at);
        let inputs: IndexMap<String, PathBuf> = datasets
            .iter()
            .map(|(name, path)| (name.to_string(), path.to_path_buf()))
            .collect();
        self.store.record_run(&identity, status, &inputs, false)
    }

    pub fn output_path(&self, dataset: &str, classification: Classification) -> PathBuf {
        self.out_dir()
            .join(format!("{}.csv", classification.output_name(dataset)))
    }

    /// Rows of one output file, header included
    pub fn read_output(&self, dataset: &str, classification: Classification) -> Vec<Vec<String>> {
        read_rows(&self.output_path(dataset, classification))
    }
}

/// Parse a CSV file into rows without header handling
pub fn read_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .unwrap_or_else(|e| panic!("Cannot read {}: {}", path.display(), e));
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_owned).collect())
        .collect()
}

pub fn row(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Helper for running CLI commands in tests
pub struct CliTestRunner {
    fixture: TestFixture,
}

impl CliTestRunner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            fixture: TestFixture::new()?,
        })
    }

    pub fn fixture(&self) -> &TestFixture {
        &self.fixture
    }

    /// Run a rowdiff command and return the result
    pub fn run_command(&self, args: &[&str]) -> Result<()> {
        use clap::Parser;
        use rowdiff::cli::Cli;
        use rowdiff::commands::execute_command;

        let mut cmd_args = vec!["rowdiff"];
        cmd_args.extend(args);

        let cli = Cli::try_parse_from(cmd_args)
            .map_err(|e| RowdiffError::invalid_input(e.to_string()))?;
        execute_command(cli.command, false)
    }

    /// Run a command and expect it to succeed
    pub fn expect_success(&self, args: &[&str]) {
        self.run_command(args).expect("Command should succeed");
    }

    /// Run a command and expect it to fail
    pub fn expect_failure(&self, args: &[&str]) -> RowdiffError {
        self.run_command(args).expect_err("Command should fail")
    }
}

/// Sample data generators for testing
pub mod sample_data {
    pub fn students_previous() -> Vec<Vec<&'static str>> {
        vec![
            vec!["id", "name", "grade"],
            vec!["1", "Ann", "A"],
            vec!["2", "Bob", "B"],
            vec!["3", "Cy", "C"],
        ]
    }

    /// Bob's grade changed, Cy left, Dee joined
    pub fn students_current() -> Vec<Vec<&'static str>> {
        vec![
            vec!["id", "name", "grade"],
            vec!["1", "Ann", "A"],
            vec!["2", "Bob", "A"],
            vec!["4", "Dee", "B"],
        ]
    }

    pub fn students_config() -> serde_json::Value {
        serde_json::json!({
            "datasets": {
                "students": { "primaryKeyColumns": ["id"] }
            },
            "retry": { "maxAttempts": 2, "baseDelayMs": 1, "timeoutSecs": 5 }
        })
    }
}

/// Run histories with scripted behavior for failure tests
pub mod histories {
    use rowdiff::history::{ByteStream, DatasetLocation, RunHandle, RunHistory, RunIdentity};
    use rowdiff::{Result, RowdiffError};
    use std::collections::HashMap;
    use std::io::{Cursor, Read};
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// One previous run whose datasets live in memory
    pub struct MemoryHistory {
        pub run: RunHandle,
        datasets: HashMap<String, String>,
        /// Opens that fail with a transient error before succeeding
        failing_opens: AtomicU32,
        pub opens: AtomicU32,
        /// Delay before every open
        open_delay: Option<Duration>,
        lookup_delay: Option<Duration>,
        resolve_delay: Option<Duration>,
        lookup_fails: bool,
        /// Dataset served as an endless stream, one row per interval
        trickle: Option<(String, Duration)>,
        trickled: Arc<AtomicU64>,
    }

    impl MemoryHistory {
        pub fn new() -> Self {
            Self {
                run: RunHandle {
                    run_id: "previous-run".to_string(),
                    created_at: chrono::Utc::now() - chrono::Duration::hours(1),
                },
                datasets: HashMap::new(),
                failing_opens: AtomicU32::new(0),
                opens: AtomicU32::new(0),
                open_delay: None,
                lookup_delay: None,
                resolve_delay: None,
                lookup_fails: false,
                trickle: None,
                trickled: Arc::new(AtomicU64::new(0)),
            }
        }

        pub fn with_dataset(mut self, name: &str, content: &str) -> Self {
            self.datasets.insert(name.to_string(), content.to_string());
            self
        }

        pub fn failing_opens(self, count: u32) -> Self {
            self.failing_opens.store(count, Ordering::SeqCst);
            self
        }

        pub fn with_open_delay(mut self, delay: Duration) -> Self {
            self.open_delay = Some(delay);
            self
        }

        pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
            self.lookup_delay = Some(delay);
            self
        }

        pub fn with_resolve_delay(mut self, delay: Duration) -> Self {
            self.resolve_delay = Some(delay);
            self
        }

        pub fn with_trickling_dataset(mut self, name: &str, interval: Duration) -> Self {
            self.datasets.insert(name.to_string(), String::new());
            self.trickle = Some((name.to_string(), interval));
            self
        }

        /// Lines handed out by the trickling dataset so far
        pub fn trickled_lines(&self) -> u64 {
            self.trickled.load(Ordering::SeqCst)
        }

        pub fn with_failing_lookup(mut self) -> Self {
            self.lookup_fails = true;
            self
        }

        pub fn open_count(&self) -> u32 {
            self.opens.load(Ordering::SeqCst)
        }
    }

    impl RunHistory for MemoryHistory {
        fn find_previous_run(&self, _current: &RunIdentity) -> Result<Option<RunHandle>> {
            if let Some(delay) = self.lookup_delay {
                std::thread::sleep(delay);
            }
            if self.lookup_fails {
                return Err(RowdiffError::transient("run registry unreachable"));
            }
            Ok(Some(self.run.clone()))
        }

        fn resolve_dataset_location(
            &self,
            _run: &RunHandle,
            dataset: &str,
        ) -> Result<Option<DatasetLocation>> {
            if let Some(delay) = self.resolve_delay {
                std::thread::sleep(delay);
            }
            Ok(self
                .datasets
                .contains_key(dataset)
                .then(|| DatasetLocation::new(dataset)))
        }

        fn open_read_stream(&self, location: &DatasetLocation) -> Result<ByteStream> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.open_delay {
                std::thread::sleep(delay);
            }
            let remaining = self.failing_opens.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failing_opens.store(remaining - 1, Ordering::SeqCst);
                return Err(RowdiffError::transient("storage throttled"));
            }
            if let Some((name, interval)) = &self.trickle {
                if *name == location.uri {
                    return Ok(Box::new(TrickleStream {
                        interval: *interval,
                        lines: Arc::clone(&self.trickled),
                        pending: Vec::new(),
                    }));
                }
            }
            let content = self.datasets.get(&location.uri).cloned().unwrap_or_default();
            Ok(Box::new(Cursor::new(content.into_bytes())))
        }
    }

    /// Endless `id,val` stream producing one line per read after a pause
    struct TrickleStream {
        interval: Duration,
        lines: Arc<AtomicU64>,
        pending: Vec<u8>,
    }

    impl Read for TrickleStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pending.is_empty() {
                std::thread::sleep(self.interval);
                let n = self.lines.fetch_add(1, Ordering::SeqCst);
                let line = if n == 0 {
                    "id,val\n".to_string()
                } else {
                    format!("{},x\n", n)
                };
                self.pending = line.into_bytes();
            }
            let len = buf.len().min(self.pending.len());
            buf[..len].copy_from_slice(&self.pending[..len]);
            self.pending.drain(..len);
            Ok(len)
        }
    }
}
