//! Command implementations for rowdiff CLI

use crate::cli::{Commands, OutputFormat};
use crate::config::{CsvFormat, DatasetConfig, DiffSettings, ModifiedOutputSettings};
use crate::error::{Result, RowdiffError};
use crate::history::{ByteStream, RunHistory, RunIdentity};
use crate::orchestrator::{DiffOrchestrator, DiffReport};
use crate::output::{DirectorySinks, JsonFormatter, PrettyPrinter};
use crate::progress::ProgressReporter;
use crate::store::{open_dataset_file, FileBaseline, RunStatus, RunStore};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Job and channel used when two files are diffed outside any store
const ADHOC_JOB: &str = "rowdiff";
const ADHOC_CHANNEL: &str = "files";

/// Execute a command
pub fn execute_command(command: Commands, show_progress: bool) -> Result<()> {
    match command {
        Commands::Diff {
            previous,
            current,
            keys,
            name,
            out,
            modified_output,
            unmodified_value,
            delimiter,
            quote,
            format,
        } => {
            let dataset = DatasetConfig::new(keys).with_modified_output(ModifiedOutputSettings {
                output_format: modified_output,
                unmodified_value,
            });
            let csv = CsvFormat { delimiter, quote };
            diff_command(&previous, &current, &name, dataset, csv, &out, format, show_progress)
        }
        Commands::Run {
            store,
            config,
            job,
            channel,
            product,
            tenant,
            ingress,
            inputs,
            out,
            record,
            compress,
            format,
        } => {
            let identity = RunIdentity::new(job, channel)
                .with_product(product)
                .with_tenant(tenant)
                .with_ingress(ingress);
            let options = RunOptions {
                record,
                compress,
                format,
                show_progress,
            };
            run_command(&store, &config, identity, inputs, &out, options)
        }
        Commands::Runs { store, format } => runs_command(&store, format),
    }
}

struct RunOptions {
    record: bool,
    compress: bool,
    format: OutputFormat,
    show_progress: bool,
}

/// Diff two files directly
#[allow(clippy::too_many_arguments)]
fn diff_command(
    previous: &Path,
    current: &Path,
    name: &str,
    dataset: DatasetConfig,
    csv: CsvFormat,
    out: &Path,
    format: OutputFormat,
    show_progress: bool,
) -> Result<()> {
    require_file(current)?;

    let mut settings = DiffSettings::new().with_dataset(name, dataset);
    settings.csv = csv;

    let history: Arc<dyn RunHistory> = Arc::new(FileBaseline::new(name, previous));
    let identity = RunIdentity::new(ADHOC_JOB, ADHOC_CHANNEL);

    let mut inputs: IndexMap<String, ByteStream> = IndexMap::new();
    inputs.insert(name.to_string(), open_dataset_file(current)?);

    let sinks = DirectorySinks::new(out)?;
    let orchestrator = DiffOrchestrator::new(history, settings)
        .with_progress(progress_for(format, show_progress));

    let report = orchestrator.run(&identity, inputs, &sinks)?;
    print_report(&report, format, sinks.dir())?;
    fail_on_dataset_errors(&report)
}

/// Diff a run against its predecessor in the store
fn run_command(
    store_path: &Path,
    config_path: &Path,
    identity: RunIdentity,
    inputs: Vec<(String, PathBuf)>,
    out: &Path,
    options: RunOptions,
) -> Result<()> {
    let settings = DiffSettings::load(config_path)?;
    let store = RunStore::open_or_create(store_path)?;

    let mut paths: IndexMap<String, PathBuf> = IndexMap::new();
    for (name, path) in inputs {
        if paths.contains_key(&name) {
            return Err(RowdiffError::invalid_input(format!(
                "Dataset '{}' given more than once",
                name
            )));
        }
        require_file(&path)?;
        paths.insert(name, path);
    }

    let mut streams: IndexMap<String, ByteStream> = IndexMap::new();
    for (name, path) in &paths {
        streams.insert(name.clone(), open_dataset_file(path)?);
    }

    let sinks = DirectorySinks::new(out)?;
    let orchestrator = DiffOrchestrator::new(Arc::new(store.clone()), settings)
        .with_progress(progress_for(options.format, options.show_progress));

    log::info!("Starting run {} ({}/{})", identity.run_id, identity.job_name, identity.channel);
    let report = orchestrator.run(&identity, streams, &sinks)?;

    if options.record {
        let status = if report.has_failures() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        store.record_run(&identity, status, &paths, options.compress)?;
    }

    print_report(&report, options.format, sinks.dir())?;
    fail_on_dataset_errors(&report)
}

/// List recorded runs
fn runs_command(store_path: &Path, format: OutputFormat) -> Result<()> {
    let store = RunStore::open(store_path)?;
    let runs = store.list_runs()?;

    match format {
        OutputFormat::Pretty => PrettyPrinter::print_run_list(&runs),
        OutputFormat::Json => println!("{}", JsonFormatter::format_run_list(&runs)?),
    }
    Ok(())
}

fn progress_for(format: OutputFormat, show_progress: bool) -> ProgressReporter {
    if show_progress && format == OutputFormat::Pretty {
        ProgressReporter::new_for_diff()
    } else {
        ProgressReporter::new_minimal()
    }
}

fn print_report(report: &DiffReport, format: OutputFormat, out: &Path) -> Result<()> {
    match format {
        OutputFormat::Pretty => {
            PrettyPrinter::print_diff_report(report);
            println!();
            println!("📁 Outputs written to: {}", out.display());
        }
        OutputFormat::Json => println!("{}", JsonFormatter::format_diff_report(report)?),
    }
    Ok(())
}

fn fail_on_dataset_errors(report: &DiffReport) -> Result<()> {
    let failures = report.failures();
    if failures.is_empty() {
        return Ok(());
    }
    let names: Vec<&str> = failures.iter().map(|(name, _)| *name).collect();
    Err(RowdiffError::config(format!(
        "{} dataset(s) failed: {}",
        failures.len(),
        names.join(", ")
    )))
}

fn require_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(RowdiffError::invalid_input(format!(
            "Input file does not exist: {}",
            path.display()
        )));
    }
    Ok(())
}

