//! Progress reporting hooks for long-running pipeline work.

use crate::controller::RunOutcome;

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each file is generated.
    fn file_generated(&self, path: &str, current: usize, total: usize);
    /// Free-form status line (pre-pass results, repair iterations, ...).
    fn note(&self, message: &str);
    /// Called when a run stops, successfully or not.
    fn done(&self, outcome: &RunOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn file_generated(&self, _path: &str, _current: usize, _total: usize) {}
    fn note(&self, _message: &str) {}
    fn done(&self, _outcome: &RunOutcome) {}
}
