//! Spinner display for long-running stages.

use crate::output::{GREEN, RED, RESET};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Single-line spinner shown while a unit works through its stages.
pub struct StageSpinner {
    spinner: ProgressBar,
    label: String,
    start_time: Instant,
}

impl StageSpinner {
    pub fn new(label: &str) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .tick_chars(SPINNER_CHARS)
                .template("{spinner:.cyan} {msg} [{elapsed}]")
                .expect("invalid template"),
        );
        spinner.set_message(format!("{} | starting", label));
        spinner.enable_steady_tick(Duration::from_millis(80));

        Self {
            spinner,
            label: label.to_string(),
            start_time: Instant::now(),
        }
    }

    /// Update the stage shown next to the unit label.
    pub fn stage(&self, stage: &str) {
        self.spinner.set_message(format!("{} | {}", self.label, stage));
    }

    pub fn finish_success(&self, outcome: &str) {
        self.spinner.finish_and_clear();
        println!(
            "{GREEN}{} {} in {}s{RESET}",
            self.label,
            outcome,
            self.start_time.elapsed().as_secs()
        );
    }

    pub fn finish_error(&self, error: &str) {
        self.spinner.finish_and_clear();
        eprintln!("{RED}{} failed: {}{RESET}", self.label, error);
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spinner_lifecycle_smoke() {
        let spinner = StageSpinner::new("serde 1.0.195");
        spinner.stage("resolving versions");
        spinner.stage("running tool");
        spinner.finish_success("published");
    }

    #[test]
    fn test_elapsed_starts_at_zero() {
        let spinner = StageSpinner::new("x");
        assert!(spinner.elapsed_secs() < 2);
        spinner.finish_error("boom");
    }
}
