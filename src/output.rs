//! Output sinks and report formatting

use crate::classifier::Classification;
use crate::config::CsvFormat;
use crate::error::{Result, RowdiffError};
use crate::orchestrator::{DatasetOutcome, DiffReport};
use crate::store::RunRecord;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub type WriteStream = Box<dyn Write + Send>;

/// Where classified rows end up. One stream per dataset and classification.
pub trait OutputSinks: Send + Sync {
    fn open_write_stream(&self, dataset: &str, classification: Classification) -> Result<WriteStream>;
}

/// Writes `<dir>/<dataset><Classification>.csv`
#[derive(Debug, Clone)]
pub struct DirectorySinks {
    dir: PathBuf,
}

impl DirectorySinks {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, dataset: &str, classification: Classification) -> PathBuf {
        self.dir
            .join(format!("{}.csv", classification.output_name(dataset)))
    }
}

impl OutputSinks for DirectorySinks {
    fn open_write_stream(&self, dataset: &str, classification: Classification) -> Result<WriteStream> {
        let path = self.path_for(dataset, classification);
        let file = fs::File::create(&path)?;
        Ok(Box::new(io::BufWriter::new(file)))
    }
}

/// In-memory sinks keyed by output name, shared across clones
#[derive(Debug, Clone, Default)]
pub struct MemorySinks {
    buffers: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemorySinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw text written to an output such as `studentsAdded`
    pub fn contents(&self, output_name: &str) -> Option<String> {
        let buffers = self.buffers.lock().ok()?;
        buffers
            .get(output_name)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Output parsed back into rows, header included
    pub fn rows(&self, output_name: &str) -> Vec<Vec<String>> {
        let Some(text) = self.contents(output_name) else {
            return Vec::new();
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());
        reader
            .records()
            .filter_map(|r| r.ok())
            .map(|r| r.iter().map(str::to_owned).collect())
            .collect()
    }

    pub fn output_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .buffers
            .lock()
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl OutputSinks for MemorySinks {
    fn open_write_stream(&self, dataset: &str, classification: Classification) -> Result<WriteStream> {
        let name = classification.output_name(dataset);
        self.buffers
            .lock()
            .map_err(|_| RowdiffError::invalid_input("output buffers poisoned"))?
            .insert(name.clone(), Vec::new());
        Ok(Box::new(MemoryStream {
            name,
            buffers: Arc::clone(&self.buffers),
        }))
    }
}

struct MemoryStream {
    name: String,
    buffers: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut buffers = self
            .buffers
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "output buffers poisoned"))?;
        buffers.entry(self.name.clone()).or_default().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The four CSV writers of one dataset
pub struct DatasetWriter {
    writers: Vec<(Classification, csv::Writer<WriteStream>)>,
}

impl DatasetWriter {
    pub fn open(sinks: &dyn OutputSinks, dataset: &str, format: &CsvFormat) -> Result<Self> {
        let mut writers = Vec::with_capacity(Classification::ALL.len());
        for classification in Classification::ALL {
            let stream = sinks.open_write_stream(dataset, classification)?;
            let writer = csv::WriterBuilder::new()
                .flexible(true)
                .delimiter(format.delimiter_byte()?)
                .quote(format.quote_byte()?)
                .from_writer(stream);
            writers.push((classification, writer));
        }
        Ok(Self { writers })
    }

    /// Seed every output with the same header row
    pub fn write_header(&mut self, header: &[String]) -> Result<()> {
        for (_, writer) in &mut self.writers {
            writer.write_record(header)?;
        }
        Ok(())
    }

    pub fn write(&mut self, classification: Classification, row: &[String]) -> Result<()> {
        match self.writers.iter_mut().find(|(c, _)| *c == classification) {
            Some((_, writer)) => {
                writer.write_record(row)?;
                Ok(())
            }
            None => Err(RowdiffError::invalid_input(format!(
                "No output stream for {}",
                classification
            ))),
        }
    }

    /// Flush and close every stream
    pub fn finish(self) -> Result<()> {
        for (_, mut writer) in self.writers {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Pretty printer for rowdiff output
pub struct PrettyPrinter;

impl PrettyPrinter {
    /// Print the outcome of a diff run
    pub fn print_diff_report(report: &DiffReport) {
        println!("🔍 Diff run {}", report.run_id);
        match &report.previous_run {
            Some(run) => println!(
                "├─ Baseline run: {} ({})",
                run.run_id,
                run.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            None => println!("├─ Baseline run: none"),
        }

        if report.datasets.is_empty() {
            println!("└─ No datasets processed");
            return;
        }

        println!("└─ Datasets:");
        let last = report.datasets.len() - 1;
        for (i, (name, outcome)) in report.datasets.iter().enumerate() {
            let (prefix, indent) = if i == last {
                ("   └─", "      ")
            } else {
                ("   ├─", "   │  ")
            };
            match outcome {
                DatasetOutcome::Completed(ds) => {
                    let marker = if ds.counts.has_changes() { "🟡" } else { "✅" };
                    println!(
                        "{} {} {}: {} added, {} modified, {} unmodified, {} deleted",
                        prefix,
                        marker,
                        name,
                        ds.counts.added,
                        ds.counts.modified,
                        ds.counts.unmodified,
                        ds.counts.deleted
                    );
                    println!("{}└─ Baseline: {}", indent, ds.baseline);
                    let skipped = ds.previous_rows_skipped + ds.current_rows_skipped;
                    if skipped > 0 || ds.duplicate_keys > 0 {
                        println!(
                            "{}   ⚠️  {} line(s) skipped, {} duplicate key(s) in previous data",
                            indent, skipped, ds.duplicate_keys
                        );
                    }
                }
                DatasetOutcome::Failed { error } => {
                    println!("{} ❌ {}: {}", prefix, name, error);
                }
            }
        }
    }

    /// Print recorded runs, oldest first
    pub fn print_run_list(runs: &[RunRecord]) {
        if runs.is_empty() {
            println!("No runs recorded.");
            return;
        }

        println!("📦 Recorded Runs:");
        for (i, run) in runs.iter().enumerate() {
            let prefix = if i == runs.len() - 1 { "└─" } else { "├─" };
            let identity = &run.identity;
            let mut scope = format!("{}/{}", identity.job_name, identity.channel);
            if let Some(tenant) = &identity.tenant {
                scope.push_str(&format!(" tenant={}", tenant));
            }
            println!(
                "{} {} [{}] {} {} ({} dataset(s))",
                prefix,
                identity.run_id,
                run.status,
                identity.created_at.format("%Y-%m-%d %H:%M:%S"),
                scope,
                run.datasets.len()
            );
        }
    }
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn format_diff_report(report: &DiffReport) -> Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }

    pub fn format_run_list(runs: &[RunRecord]) -> Result<String> {
        Ok(serde_json::to_string_pretty(runs)?)
    }
}
