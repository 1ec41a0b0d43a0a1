//! Core pipeline orchestration for MVP Factory.
//!
//! This crate ties planning, design, code generation, persistence and the
//! repair loop into one checkpointed run driven by [`PipelineController`].

pub mod codegen;
pub mod controller;
pub mod design;
pub mod planning;
pub mod progress;
pub mod prompts;
pub mod repair;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{PipelineController, PipelineSettings, RunOutcome};
pub use progress::{ProgressReporter, SilentProgress};
pub use repair::{RepairLoop, RepairReport, Termination};
