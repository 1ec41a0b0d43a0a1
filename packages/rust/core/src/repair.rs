//! Review-and-fix loop over a persisted project tree.
//!
//! Each pass re-reads the tree from disk, runs the static checks, and hands
//! sources plus findings to the reviewer model. Fixes for known paths are
//! written to memory and disk together; the loop stops when the reviewer has
//! nothing left to fix or the pass budget runs out.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use mvpfactory_analysis::{Diagnostic, StaticValidator};
use mvpfactory_artifacts::ArtifactStore;
use mvpfactory_generation::{Generator, ModelRole, parse_json_response};
use mvpfactory_shared::{FactoryError, ProjectState, Result, normalize_path};

use crate::progress::ProgressReporter;
use crate::prompts;

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The reviewer found nothing and the static checks are clean.
    Converged,
    /// The pass budget ran out, or the reviewer stopped fixing while
    /// problems remained.
    IterationBudgetExhausted,
    /// A reviewer call failed or returned an unusable reply.
    ReviewerFailed(String),
}

#[derive(Debug, Default, Deserialize)]
struct ReviewResponse {
    #[serde(default)]
    issues: Vec<Value>,
    #[serde(default)]
    fixed_files: IndexMap<String, String>,
    #[serde(default)]
    summary: String,
}

/// Outcome of a [`RepairLoop::run`].
#[derive(Debug, Clone)]
pub struct RepairReport {
    /// Reviewer passes made.
    pub iterations: usize,
    pub termination: Termination,
    /// Every issue the reviewer raised, across all passes.
    pub issues: Vec<String>,
    pub fixed_paths: BTreeSet<String>,
    /// Findings of the final static check.
    pub remaining: Vec<Diagnostic>,
    /// Summary line of the last reviewer reply.
    pub summary: String,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.remaining.is_empty()
    }
}

impl fmt::Display for RepairReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stop = match &self.termination {
            Termination::Converged => "converged".to_string(),
            Termination::IterationBudgetExhausted => "iteration budget exhausted".to_string(),
            Termination::ReviewerFailed(reason) => format!("reviewer failed: {reason}"),
        };
        writeln!(f, "Repair: {} pass(es), {stop}", self.iterations)?;
        if !self.summary.is_empty() {
            writeln!(f, "Summary: {}", self.summary)?;
        }

        writeln!(f, "Issues found: {}", self.issues.len())?;
        for issue in &self.issues {
            writeln!(f, "  - {issue}")?;
        }
        writeln!(f, "Files fixed: {}", self.fixed_paths.len())?;
        for path in &self.fixed_paths {
            writeln!(f, "  - {path}")?;
        }
        if self.remaining.is_empty() {
            write!(f, "Static checks: clean")
        } else {
            writeln!(f, "Remaining problems: {}", self.remaining.len())?;
            let lines: Vec<String> = self.remaining.iter().map(|d| format!("  - {d}")).collect();
            write!(f, "{}", lines.join("\n"))
        }
    }
}

/// Bounded reviewer/fixer loop.
pub struct RepairLoop<'a, G> {
    pub generator: &'a G,
    pub validator: &'a StaticValidator,
    pub store: &'a ArtifactStore,
    pub max_iterations: usize,
}

impl<G: Generator> RepairLoop<'_, G> {
    /// Run the loop over the project persisted at `root`.
    ///
    /// Reviewer failures end the loop early and keep fixes already applied.
    /// Only write failures are returned as errors.
    #[instrument(skip_all, fields(root = %root.display(), max = self.max_iterations))]
    pub async fn run(
        &self,
        root: &Path,
        state: &mut ProjectState,
        progress: &dyn ProgressReporter,
    ) -> Result<RepairReport> {
        let mut iterations = 0;
        let mut issues = Vec::new();
        let mut fixed_paths = BTreeSet::new();
        let mut summary = String::new();
        let mut termination = Termination::IterationBudgetExhausted;

        while iterations < self.max_iterations {
            iterations += 1;
            progress.note(&format!("Review pass {iterations}/{}", self.max_iterations));

            refresh_from_disk(root, state)?;
            let diagnostics = self.validator.check(root, &state.artifacts).await;
            debug!(iteration = iterations, diagnostics = diagnostics.len(), "reviewing");

            let prompt = prompts::review(&state.spec_document, &state.artifacts, &diagnostics);
            let reply = match self.generator.generate(ModelRole::Review, &prompt).await {
                Ok(raw) => parse_json_response::<ReviewResponse>(&raw),
                Err(e) => Err(e),
            };
            let reply = match reply {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(error = %e, "reviewer failed, stopping repair");
                    termination = Termination::ReviewerFailed(e.to_string());
                    break;
                }
            };

            issues.extend(reply.issues.iter().map(issue_text));
            if !reply.summary.is_empty() {
                summary = reply.summary;
            }

            if reply.fixed_files.is_empty() {
                termination = if reply.issues.is_empty() && diagnostics.is_empty() {
                    Termination::Converged
                } else {
                    Termination::IterationBudgetExhausted
                };
                break;
            }

            for path in self.apply(root, state, reply.fixed_files)? {
                fixed_paths.insert(path);
            }
        }

        refresh_from_disk(root, state)?;
        let remaining = self.validator.check(root, &state.artifacts).await;

        let report = RepairReport {
            iterations,
            termination,
            issues,
            fixed_paths,
            remaining,
            summary,
        };
        info!(
            iterations = report.iterations,
            termination = ?report.termination,
            fixed = report.fixed_paths.len(),
            remaining = report.remaining.len(),
            "repair finished"
        );
        Ok(report)
    }

    /// Write fixes for paths the project tracks; returns the paths written.
    fn apply(
        &self,
        root: &Path,
        state: &mut ProjectState,
        fixes: IndexMap<String, String>,
    ) -> Result<Vec<String>> {
        let mut applied = Vec::new();
        for (raw_path, content) in fixes {
            let path = match normalize_path(&raw_path) {
                Ok(path) if state.tracks(&path) => path,
                _ => {
                    warn!(path = %raw_path, "ignoring fix for unknown path");
                    continue;
                }
            };
            state.artifacts.insert(&path, content.as_str())?;
            self.store.write_one(root, &path, &content)?;
            debug!(%path, "applied fix");
            applied.push(path);
        }
        Ok(applied)
    }
}

/// Reload every tracked artifact from its on-disk copy.
fn refresh_from_disk(root: &Path, state: &mut ProjectState) -> Result<()> {
    let paths: Vec<String> = state.artifacts.paths().map(str::to_string).collect();
    for path in paths {
        let full = root.join(&path);
        match std::fs::read_to_string(&full) {
            Ok(content) => {
                state.artifacts.insert(&path, content)?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(FactoryError::io(full, e)),
        }
    }
    Ok(())
}

fn issue_text(issue: &Value) -> String {
    match issue {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;
    use crate::testing::ScriptedGenerator;

    struct Fixture {
        dir: tempfile::TempDir,
        store: ArtifactStore,
        validator: StaticValidator,
        state: ProjectState,
    }

    fn fixture(files: &[(&str, &str)]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::default();
        let mut state = ProjectState::new_build("notes");
        state.assign_identity("notes").unwrap();
        for (path, content) in files {
            state.file_manifest.insert((*path).into(), "file".into());
            state.artifacts.insert(path, *content).unwrap();
        }
        store.save(dir.path(), &state.artifacts).unwrap();
        Fixture {
            dir,
            store,
            validator: StaticValidator::default(),
            state,
        }
    }

    #[tokio::test]
    async fn clean_first_review_converges_in_one_pass() {
        let mut fx = fixture(&[("app.py", "print('ok')\n")]);
        let generator = ScriptedGenerator::new().with(
            ModelRole::Review,
            r#"{"issues": [], "fixed_files": {}, "summary": "looks good"}"#,
        );
        let repair = RepairLoop {
            generator: &generator,
            validator: &fx.validator,
            store: &fx.store,
            max_iterations: 2,
        };

        let report = repair
            .run(fx.dir.path(), &mut fx.state, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(report.iterations, 1);
        assert_eq!(report.termination, Termination::Converged);
        assert_eq!(generator.calls_for(ModelRole::Review), 1);
        assert!(report.is_clean());
        assert_eq!(report.summary, "looks good");
    }

    #[tokio::test]
    async fn fixes_are_applied_to_known_paths_only() {
        let mut fx = fixture(&[("app.py", "def broken(:\n    pass\n")]);
        let generator = ScriptedGenerator::new()
            .with(
                ModelRole::Review,
                r#"{"issues": ["syntax error in app.py"],
                    "fixed_files": {"app.py": "def fixed():\n    pass\n", "evil.py": "x = 1\n"},
                    "summary": "fixed syntax"}"#,
            )
            .with(ModelRole::Review, r#"{"issues": [], "fixed_files": {}}"#);
        let repair = RepairLoop {
            generator: &generator,
            validator: &fx.validator,
            store: &fx.store,
            max_iterations: 3,
        };

        let report = repair
            .run(fx.dir.path(), &mut fx.state, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(report.iterations, 2);
        assert_eq!(report.termination, Termination::Converged);
        assert_eq!(report.fixed_paths.iter().collect::<Vec<_>>(), vec!["app.py"]);
        assert_eq!(report.issues, vec!["syntax error in app.py".to_string()]);
        assert!(report.is_clean());

        let on_disk = std::fs::read_to_string(fx.dir.path().join("app.py")).unwrap();
        assert!(on_disk.contains("def fixed()"));
        assert!(!fx.dir.path().join("evil.py").exists());
        assert!(!fx.state.artifacts.contains("evil.py"));

        let first_prompt = &generator.prompts_for(ModelRole::Review)[0];
        assert!(first_prompt.contains("Static check findings"));
    }

    #[tokio::test]
    async fn budget_is_enforced() {
        let mut fx = fixture(&[("app.py", "x = 1\n")]);
        let generator = ScriptedGenerator::new().with_fallback(
            ModelRole::Review,
            r#"{"issues": ["style"], "fixed_files": {"app.py": "x = 2\n"}}"#,
        );
        let repair = RepairLoop {
            generator: &generator,
            validator: &fx.validator,
            store: &fx.store,
            max_iterations: 2,
        };

        let report = repair
            .run(fx.dir.path(), &mut fx.state, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(report.iterations, 2);
        assert_eq!(report.termination, Termination::IterationBudgetExhausted);
        assert_eq!(generator.calls_for(ModelRole::Review), 2);
    }

    #[tokio::test]
    async fn reviewer_failure_keeps_applied_fixes() {
        let mut fx = fixture(&[("app.py", "x = 1\n")]);
        let generator = ScriptedGenerator::new()
            .with(
                ModelRole::Review,
                r#"{"issues": ["bug"], "fixed_files": {"app.py": "x = 42\n"}}"#,
            )
            .with(ModelRole::Review, "I cannot answer in JSON today");
        let repair = RepairLoop {
            generator: &generator,
            validator: &fx.validator,
            store: &fx.store,
            max_iterations: 5,
        };

        let report = repair
            .run(fx.dir.path(), &mut fx.state, &SilentProgress)
            .await
            .unwrap();
        assert!(matches!(report.termination, Termination::ReviewerFailed(_)));
        assert!(report.fixed_paths.contains("app.py"));
        assert_eq!(fx.state.artifacts.get("app.py"), Some("x = 42\n"));
        assert!(report.to_string().contains("reviewer failed"));
    }

    #[tokio::test]
    async fn disk_edits_are_seen_by_the_reviewer() {
        let mut fx = fixture(&[("app.py", "x = 1\n")]);
        std::fs::write(fx.dir.path().join("app.py"), "x = 'edited on disk'\n").unwrap();
        let generator = ScriptedGenerator::new()
            .with(ModelRole::Review, r#"{"issues": [], "fixed_files": {}}"#);
        let repair = RepairLoop {
            generator: &generator,
            validator: &fx.validator,
            store: &fx.store,
            max_iterations: 1,
        };

        repair
            .run(fx.dir.path(), &mut fx.state, &SilentProgress)
            .await
            .unwrap();
        assert!(generator.prompts_for(ModelRole::Review)[0].contains("edited on disk"));
    }
}
