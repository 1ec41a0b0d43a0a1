//! Pipeline controller: runs phases in order, checkpoints after each one,
//! and resumes from the last completed phase.
//!
//! ```text
//! Pending → Planned → Designed → FrontendDone → BackendDone → Persisted → Validated
//!                         any phase ──contract failure──▶ Error
//! ```
//!
//! A phase that sets `Phase::Error` halts the run. Error states are never
//! checkpointed, so the active record keeps pointing at the last good phase.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use mvpfactory_analysis::{StaticValidator, prune_requirements, resolve_imports};
use mvpfactory_artifacts::ArtifactStore;
use mvpfactory_generation::{Generator, ModelRole};
use mvpfactory_shared::{BuildMode, FactoryError, Phase, ProjectMeta, ProjectState, Result};
use mvpfactory_storage::{ActiveCheckpoint, CheckpointManager};

use crate::codegen;
use crate::design;
use crate::planning;
use crate::progress::ProgressReporter;
use crate::prompts;
use crate::repair::{RepairLoop, RepairReport};

const README_PATH: &str = "README.md";

/// Phases in execution order, each paired with the step that completes it.
const STEPS: [Phase; 6] = [
    Phase::Planned,
    Phase::Designed,
    Phase::FrontendDone,
    Phase::BackendDone,
    Phase::Persisted,
    Phase::Validated,
];

/// Controller settings resolved from config and CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Directory receiving `<identity>/` project trees.
    pub output_root: PathBuf,
    /// Reviewer pass budget for the repair loop.
    pub max_fix_iterations: usize,
    /// Recorded in the sidecar metadata.
    pub tool_version: String,
}

/// Result of a run that did not hit an infrastructure error.
#[derive(Debug)]
pub struct RunOutcome {
    pub state: ProjectState,
    /// Project tree location, once persisted.
    pub project_dir: Option<PathBuf>,
    /// Repair report, when validation ran.
    pub report: Option<RepairReport>,
    /// Archived checkpoint path, when the run finished clean.
    pub archived: Option<PathBuf>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.state.phase == Phase::Validated
    }
}

/// Owns the collaborators of one pipeline and drives runs through them.
pub struct PipelineController<G> {
    generator: G,
    checkpoints: CheckpointManager,
    store: ArtifactStore,
    validator: StaticValidator,
    settings: PipelineSettings,
}

impl<G: Generator> PipelineController<G> {
    pub fn new(
        generator: G,
        checkpoints: CheckpointManager,
        store: ArtifactStore,
        validator: StaticValidator,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            generator,
            checkpoints,
            store,
            validator,
            settings,
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Where the tree of project `identity` lives.
    pub fn project_dir(&self, identity: &str) -> PathBuf {
        self.settings.output_root.join(identity)
    }

    /// Build a new project from an idea.
    #[instrument(skip_all, fields(run_id = %self.checkpoints.run_id()))]
    pub async fn run_new(&self, idea: &str, progress: &dyn ProgressReporter) -> Result<RunOutcome> {
        info!("starting new build");
        self.drive(ProjectState::new_build(idea), Phase::Pending, progress)
            .await
    }

    /// Continue a run from its active checkpoint.
    #[instrument(skip_all, fields(identity = checkpoint.handle.identity()))]
    pub async fn resume(
        &self,
        checkpoint: ActiveCheckpoint,
        progress: &dyn ProgressReporter,
    ) -> Result<RunOutcome> {
        let completed = checkpoint.record.phase_completed;
        let mut state = checkpoint.record.state;
        state.phase = completed;
        info!(%completed, hint = completed.resume_hint(), "resuming");
        self.drive(state, completed, progress).await
    }

    /// Modify the existing project `identity` according to `request`.
    ///
    /// The project directory name must already be a valid identity. Only
    /// the paths in the planned delta are regenerated.
    #[instrument(skip_all, fields(%identity, run_id = %self.checkpoints.run_id()))]
    pub async fn run_upgrade(
        &self,
        identity: &str,
        request: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<RunOutcome> {
        let mut state = ProjectState::new_build(request);
        state.mode = BuildMode::Upgrade {
            request: request.to_string(),
        };
        let assigned = state.assign_identity(identity)?.to_string();
        if assigned != identity {
            return Err(FactoryError::validation(format!(
                "project directory {identity:?} is not a valid identity (expected {assigned:?})"
            )));
        }

        let dir = self.project_dir(&assigned);
        progress.phase("Loading existing project");
        state.artifacts = self.store.load(&dir)?;
        if state.artifacts.is_empty() {
            return Err(FactoryError::validation(format!(
                "no project files found in {}",
                dir.display()
            )));
        }

        match self.store.read_meta(&dir)? {
            Some(meta) => {
                state.project_type = meta.project_type;
                state.spec_document = meta.spec_document;
                state.file_manifest = meta.file_manifest;
                state.interface_contracts = meta.interface_contracts;
            }
            None => {
                warn!("project has no metadata, rebuilding manifest from the tree");
                state.file_manifest = state
                    .artifacts
                    .paths()
                    .map(|path| (path.to_string(), "existing file".to_string()))
                    .collect();
            }
        }
        info!(files = state.artifacts.len(), "existing project loaded");

        self.drive(state, Phase::Pending, progress).await
    }

    /// Run every step after `completed`, checkpointing as phases finish.
    async fn drive(
        &self,
        mut state: ProjectState,
        completed: Phase,
        progress: &dyn ProgressReporter,
    ) -> Result<RunOutcome> {
        let mut report = None;
        let mut archived = None;

        for target in STEPS.into_iter().filter(|step| *step > completed) {
            progress.phase(step_title(target, &state.mode));

            match target {
                Phase::Planned if is_upgrade(&state) => {
                    planning::plan_upgrade(&self.generator, &mut state).await
                }
                Phase::Planned => planning::plan_new(&self.generator, &mut state).await,
                Phase::Designed => design::run_design(&self.generator, &mut state).await,
                Phase::FrontendDone => {
                    codegen::generate_frontend(&self.generator, &mut state, progress).await
                }
                Phase::BackendDone => {
                    codegen::generate_backend(&self.generator, &mut state, progress).await
                }
                Phase::Persisted => self.persist(&state)?,
                Phase::Validated => report = Some(self.validate(&mut state, progress).await?),
                Phase::Pending | Phase::Error => {}
            }

            if state.phase == Phase::Error {
                warn!(failed_at = %target, diagnostics = %state.diagnostics, "run halted");
                progress.note(&format!("Stopped: {}", state.diagnostics));
                break;
            }
            state.phase = target;

            if target == Phase::Validated {
                archived = self.finish(&state, report.as_ref())?;
            } else {
                self.checkpoints.save(&state, target)?;
                progress.note(&format!("Checkpoint saved: {target}"));
            }
        }

        let project_dir = state
            .identity()
            .map(|id| self.project_dir(id))
            .filter(|dir| dir.is_dir());
        let outcome = RunOutcome {
            state,
            project_dir,
            report,
            archived,
        };
        progress.done(&outcome);
        Ok(outcome)
    }

    /// Archive the checkpoint when nothing is left to fix; otherwise the
    /// active record stays at `Persisted` so the run can be resumed.
    fn finish(
        &self,
        state: &ProjectState,
        report: Option<&RepairReport>,
    ) -> Result<Option<PathBuf>> {
        if report.is_some_and(|r| !r.is_clean()) {
            info!("problems remain, keeping checkpoint active");
            return Ok(None);
        }
        let handle = self.checkpoints.save(state, Phase::Validated)?;
        self.checkpoints.archive(&handle)
    }

    fn persist(&self, state: &ProjectState) -> Result<()> {
        let dir = self.project_dir(state.require_identity()?);
        let summary = self.store.save(&dir, &state.artifacts)?;
        let meta = ProjectMeta::from_state(state, &self.settings.tool_version)?;
        self.store.write_meta(&dir, &meta)?;
        info!(
            dir = %dir.display(),
            written = summary.written.len(),
            unchanged = summary.unchanged,
            "project persisted"
        );
        Ok(())
    }

    async fn validate(
        &self,
        state: &mut ProjectState,
        progress: &dyn ProgressReporter,
    ) -> Result<RepairReport> {
        let dir = self.project_dir(state.require_identity()?);
        // The tree on disk is authoritative once persisted; a resumed
        // checkpoint may hold content from before an earlier repair pass.
        state.artifacts = self.store.load(&dir)?;
        info!(files = state.artifacts.len(), "artifacts loaded from disk");

        let dropped = prune_requirements(&self.store, &dir, &mut state.artifacts)?;
        for line in &dropped {
            progress.note(&format!("Removed unused requirement: {line}"));
        }
        let rewritten = resolve_imports(&self.store, &dir, &mut state.artifacts)?;
        if !rewritten.is_empty() {
            progress.note(&format!("Import fixes: {} file(s)", rewritten.len()));
        }

        let repair = RepairLoop {
            generator: &self.generator,
            validator: &self.validator,
            store: &self.store,
            max_iterations: self.settings.max_fix_iterations,
        };
        let report = repair.run(&dir, state, progress).await?;

        progress.note("Writing README");
        self.write_readme(&dir, state).await?;

        let meta = ProjectMeta::from_state(state, &self.settings.tool_version)?;
        self.store.write_meta(&dir, &meta)?;

        state.diagnostics = report.to_string();
        Ok(report)
    }

    /// Generate `README.md`. A failed call leaves any existing README alone.
    async fn write_readme(&self, dir: &Path, state: &mut ProjectState) -> Result<()> {
        let prompt = prompts::readme(&state.spec_document, &state.file_manifest, &state.artifacts);
        let raw = match self.generator.generate(ModelRole::Docs, &prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "README generation failed");
                return Ok(());
            }
        };

        let readme = strip_markdown_fence(&raw);
        state.artifacts.insert(README_PATH, readme)?;
        self.store.write_one(dir, README_PATH, readme)
    }
}

fn is_upgrade(state: &ProjectState) -> bool {
    matches!(state.mode, BuildMode::Upgrade { .. })
}

fn step_title(target: Phase, mode: &BuildMode) -> &'static str {
    match (target, mode) {
        (Phase::Planned, BuildMode::Upgrade { .. }) => "Planning upgrade",
        (Phase::Planned, BuildMode::New) => "Planning",
        (Phase::Designed, _) => "Designing",
        (Phase::FrontendDone, _) => "Generating frontend",
        (Phase::BackendDone, _) => "Generating backend",
        (Phase::Persisted, _) => "Saving project",
        (Phase::Validated, _) => "Validating and repairing",
        (Phase::Pending | Phase::Error, _) => "",
    }
}

/// Drop one outer ```markdown (or ```md) fence; inner code blocks stay.
fn strip_markdown_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed
        .strip_prefix("```markdown")
        .or_else(|| trimmed.strip_prefix("```md"))
    else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    body.trim()
}
