//! Terminal progress reporting.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use mvpfactory_core::{ProgressReporter, RunOutcome};

/// Spinner for the current step, with a persistent line per phase transition.
pub(crate) struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    pub(crate) fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .map(|style| style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]))
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.println(format!("▸ {name}"));
        self.spinner.set_message(name.to_string());
    }

    fn file_generated(&self, path: &str, current: usize, total: usize) {
        self.spinner.println(format!("  [{current}/{total}] {path}"));
        self.spinner
            .set_message(format!("Generated [{current}/{total}] {path}"));
    }

    fn note(&self, message: &str) {
        self.spinner.println(format!("  {message}"));
    }

    fn done(&self, _outcome: &RunOutcome) {
        self.spinner.finish_and_clear();
    }
}
