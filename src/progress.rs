//! Progress reporting utilities

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter for diff runs.
///
/// Datasets are processed concurrently, so every bar hangs off one
/// [`MultiProgress`]. A minimal reporter hands out hidden bars, which keeps
/// call sites free of `Option` checks.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    multi: Option<MultiProgress>,
}

impl ProgressReporter {
    /// Create progress reporter for diff operations
    pub fn new_for_diff() -> Self {
        Self {
            multi: Some(MultiProgress::new()),
        }
    }

    /// Create minimal progress reporter (no progress bars)
    pub fn new_minimal() -> Self {
        Self { multi: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.multi.is_some()
    }

    /// Spinner counting rows for one dataset phase
    pub fn rows_spinner(&self, message: &str) -> ProgressBar {
        match &self.multi {
            Some(multi) => multi.add(create_spinner(message)),
            None => ProgressBar::hidden(),
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new_minimal()
    }
}

/// Finish a phase spinner, leaving a summary line behind when visible
pub fn finish_phase(pb: &ProgressBar, message: &str) {
    if pb.is_hidden() {
        return;
    }
    pb.finish_with_message(message.to_string());
}

/// Create a spinner progress bar
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.green} {msg} {pos} rows ({per_sec})")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
