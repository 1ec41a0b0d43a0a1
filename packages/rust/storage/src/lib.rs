//! File-backed checkpoint storage.
//!
//! A [`CheckpointManager`] persists the full [`ProjectState`] after every
//! completed phase so an interrupted run can resume where it stopped.
//!
//! **Layout** (under the configured root, `.agent_logs/` by default):
//! - `active/<identity>.json`: latest record of an unfinished run
//! - `completed/<identity>_<YYYYmmdd_HHMMSS>.json`: archived records
//!
//! Records are replaced atomically (temp file, then rename); there is no
//! locking and a single writer is assumed.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use mvpfactory_shared::{FactoryError, Phase, ProjectState, Result, RunId};

const ACTIVE_DIR: &str = "active";
const COMPLETED_DIR: &str = "completed";

/// One persisted snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub timestamp: DateTime<Utc>,
    pub phase_completed: Phase,
    pub run_id: RunId,
    pub state: ProjectState,
}

/// Location of an active record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointHandle(PathBuf);

impl CheckpointHandle {
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Project identity encoded in the file name.
    pub fn identity(&self) -> &str {
        self.0
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }
}

/// An active record together with its handle, as returned by
/// [`CheckpointManager::list_active`].
#[derive(Debug, Clone)]
pub struct ActiveCheckpoint {
    pub handle: CheckpointHandle,
    pub record: CheckpointRecord,
}

/// Saves, lists, archives and deletes checkpoint records.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    root: PathBuf,
    run_id: RunId,
}

impl CheckpointManager {
    /// Manager rooted at `root`. Directories are created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            run_id: RunId::new(),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    fn active_dir(&self) -> PathBuf {
        self.root.join(ACTIVE_DIR)
    }

    fn completed_dir(&self) -> PathBuf {
        self.root.join(COMPLETED_DIR)
    }

    /// Handle for `identity`'s active record, whether or not it exists yet.
    pub fn handle_for(&self, identity: &str) -> CheckpointHandle {
        CheckpointHandle(self.active_dir().join(format!("{identity}.json")))
    }

    /// Write `state` as the latest record for its identity, replacing any
    /// previous record.
    #[instrument(skip_all, fields(phase = %phase))]
    pub fn save(&self, state: &ProjectState, phase: Phase) -> Result<CheckpointHandle> {
        let identity = state.require_identity().map_err(|_| {
            FactoryError::Checkpoint("cannot checkpoint a project without an identity".into())
        })?;

        let dir = self.active_dir();
        std::fs::create_dir_all(&dir).map_err(|e| FactoryError::io(&dir, e))?;

        let record = CheckpointRecord {
            timestamp: Utc::now(),
            phase_completed: phase,
            run_id: self.run_id.clone(),
            state: state.clone(),
        };
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| FactoryError::Checkpoint(format!("serialization failed: {e}")))?;

        let handle = self.handle_for(identity);
        let temp = dir.join(format!(".{identity}.json.tmp"));
        std::fs::write(&temp, json).map_err(|e| FactoryError::io(&temp, e))?;
        std::fs::rename(&temp, handle.path()).map_err(|e| FactoryError::io(handle.path(), e))?;

        info!(%identity, run_id = %self.run_id, "checkpoint saved");
        Ok(handle)
    }

    /// Read one record.
    pub fn load(&self, handle: &CheckpointHandle) -> Result<CheckpointRecord> {
        let raw = std::fs::read_to_string(handle.path())
            .map_err(|e| FactoryError::io(handle.path(), e))?;
        serde_json::from_str(&raw).map_err(|e| {
            FactoryError::Checkpoint(format!(
                "corrupt checkpoint {}: {e}",
                handle.path().display()
            ))
        })
    }

    /// All readable active records, newest first. Unreadable records are skipped.
    pub fn list_active(&self) -> Result<Vec<ActiveCheckpoint>> {
        let dir = self.active_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        let entries = std::fs::read_dir(&dir).map_err(|e| FactoryError::io(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| FactoryError::io(&dir, e))?;
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.ends_with(".json") || name.starts_with('.') {
                continue;
            }

            let handle = CheckpointHandle(path);
            match self.load(&handle) {
                Ok(record) => found.push(ActiveCheckpoint { handle, record }),
                Err(e) => debug!(error = %e, "skipping unreadable checkpoint"),
            }
        }

        found.sort_by(|a, b| b.record.timestamp.cmp(&a.record.timestamp));
        Ok(found)
    }

    /// The active record for `identity`, if one exists and is readable.
    pub fn find_active(&self, identity: &str) -> Result<Option<ActiveCheckpoint>> {
        let handle = self.handle_for(identity);
        if !handle.path().exists() {
            return Ok(None);
        }
        let record = self.load(&handle)?;
        Ok(Some(ActiveCheckpoint { handle, record }))
    }

    /// Move an active record into `completed/`. Returns the archive path, or
    /// `None` when the record no longer exists. Existing archives are never
    /// overwritten.
    #[instrument(skip_all, fields(identity = handle.identity()))]
    pub fn archive(&self, handle: &CheckpointHandle) -> Result<Option<PathBuf>> {
        if !handle.path().exists() {
            return Ok(None);
        }

        let dir = self.completed_dir();
        std::fs::create_dir_all(&dir).map_err(|e| FactoryError::io(&dir, e))?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let base = format!("{}_{stamp}", handle.identity());
        let mut target = dir.join(format!("{base}.json"));
        let mut suffix = 1;
        while target.exists() {
            target = dir.join(format!("{base}_{suffix}.json"));
            suffix += 1;
        }

        std::fs::rename(handle.path(), &target).map_err(|e| FactoryError::io(&target, e))?;
        info!(archive = %target.display(), "checkpoint archived");
        Ok(Some(target))
    }

    /// Remove an active record. Missing records are not an error.
    pub fn delete(&self, handle: &CheckpointHandle) -> Result<()> {
        match std::fs::remove_file(handle.path()) {
            Ok(()) => {
                info!(identity = handle.identity(), "checkpoint deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(path = %handle.path().display(), error = %e, "failed to delete checkpoint");
                Err(FactoryError::io(handle.path(), e))
            }
        }
    }
}
