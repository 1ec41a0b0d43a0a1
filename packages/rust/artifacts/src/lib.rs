//! On-disk persistence for generated project trees.
//!
//! [`ArtifactStore`] loads a project directory into an [`ArtifactSet`] and
//! writes one back. It also owns the `.factory_meta.json` sidecar that lets
//! an upgrade run reconstruct what the file tree alone cannot tell it.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use mvpfactory_shared::{
    ArtifactSet, FactoryError, META_FILE_NAME, ProjectMeta, Result, normalize_path,
};

/// Directory names never descended into when loading a tree.
pub const DEFAULT_SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "env",
    ".mypy_cache",
    ".pytest_cache",
    "dist",
    "build",
];

/// Outcome of a [`ArtifactStore::save`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SaveSummary {
    /// Paths whose bytes changed (or were created).
    pub written: Vec<String>,
    /// Paths already identical on disk.
    pub unchanged: usize,
}

/// Loads and saves project trees.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    skip_dirs: BTreeSet<String>,
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

impl ArtifactStore {
    /// Build a store that skips the default denylist plus `extra_skip_dirs`.
    pub fn new<I, S>(extra_skip_dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut skip_dirs: BTreeSet<String> =
            DEFAULT_SKIP_DIRS.iter().map(|s| (*s).to_string()).collect();
        skip_dirs.extend(extra_skip_dirs.into_iter().map(Into::into));
        Self { skip_dirs }
    }

    /// Read every text file under `root` into an [`ArtifactSet`].
    ///
    /// Skipped directories and the sidecar file are excluded. Files that are
    /// not valid UTF-8 are treated as binary and left out. A missing root
    /// yields an empty set.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn load(&self, root: &Path) -> Result<ArtifactSet> {
        let mut set = ArtifactSet::new();
        if !root.is_dir() {
            debug!("project directory does not exist, nothing to load");
            return Ok(set);
        }

        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let entries = std::fs::read_dir(&dir).map_err(|e| FactoryError::io(&dir, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| FactoryError::io(&dir, e))?;
                let path = entry.path();
                let file_type = entry.file_type().map_err(|e| FactoryError::io(&path, e))?;
                let name = entry.file_name().to_string_lossy().into_owned();

                if file_type.is_dir() {
                    if !self.skip_dirs.contains(&name) {
                        pending.push(path);
                    }
                    continue;
                }
                if !file_type.is_file() || name == META_FILE_NAME {
                    continue;
                }

                let bytes = std::fs::read(&path).map_err(|e| FactoryError::io(&path, e))?;
                let Ok(content) = String::from_utf8(bytes) else {
                    debug!(path = %path.display(), "skipping binary file");
                    continue;
                };

                let rel = relative_key(root, &path)?;
                set.insert(&rel, content)?;
            }
        }

        info!(files = set.len(), "loaded project tree");
        Ok(set)
    }

    /// Write every entry of `artifacts` under `root`, creating parent
    /// directories. Files whose bytes already match are left untouched.
    #[instrument(skip_all, fields(root = %root.display(), files = artifacts.len()))]
    pub fn save(&self, root: &Path, artifacts: &ArtifactSet) -> Result<SaveSummary> {
        std::fs::create_dir_all(root).map_err(|e| FactoryError::io(root, e))?;

        let mut summary = SaveSummary::default();
        for (rel, content) in artifacts.iter() {
            if write_if_changed(root, rel, content)? {
                summary.written.push(rel.to_string());
            } else {
                summary.unchanged += 1;
            }
        }

        info!(
            written = summary.written.len(),
            unchanged = summary.unchanged,
            "saved project tree"
        );
        Ok(summary)
    }

    /// Write a single entry, used by fixers that update store and disk together.
    pub fn write_one(&self, root: &Path, rel: &str, content: &str) -> Result<()> {
        let rel = normalize_path(rel)?;
        write_if_changed(root, &rel, content)?;
        Ok(())
    }

    /// Read the sidecar metadata, or `None` when the project has none.
    pub fn read_meta(&self, root: &Path) -> Result<Option<ProjectMeta>> {
        let path = root.join(META_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(&path).map_err(|e| FactoryError::io(&path, e))?;
        match serde_json::from_str(&raw) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable project metadata");
                Ok(None)
            }
        }
    }

    /// Write the sidecar metadata atomically (temp file, then rename).
    pub fn write_meta(&self, root: &Path, meta: &ProjectMeta) -> Result<PathBuf> {
        std::fs::create_dir_all(root).map_err(|e| FactoryError::io(root, e))?;

        let json = serde_json::to_string_pretty(meta).map_err(|e| {
            FactoryError::validation(format!("metadata serialization failed: {e}"))
        })?;

        let target = root.join(META_FILE_NAME);
        let temp = root.join(format!("{META_FILE_NAME}.tmp"));
        std::fs::write(&temp, json).map_err(|e| FactoryError::io(&temp, e))?;
        std::fs::rename(&temp, &target).map_err(|e| FactoryError::io(&target, e))?;

        debug!(path = %target.display(), digest = %meta.artifact_digest, "wrote project metadata");
        Ok(target)
    }
}

/// Returns `true` when the file was (re)written.
fn write_if_changed(root: &Path, rel: &str, content: &str) -> Result<bool> {
    let target = root.join(rel);

    if let Ok(existing) = std::fs::read(&target) {
        if existing == content.as_bytes() {
            return Ok(false);
        }
    }

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| FactoryError::io(parent, e))?;
    }
    std::fs::write(&target, content).map_err(|e| FactoryError::io(&target, e))?;
    debug!(path = %rel, size = content.len(), "wrote artifact");
    Ok(true)
}

fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(root).map_err(|_| {
        FactoryError::validation(format!(
            "{} is not inside {}",
            path.display(),
            root.display()
        ))
    })?;
    normalize_path(&rel.to_string_lossy())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
