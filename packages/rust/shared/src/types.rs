//! Core domain types for MVP Factory projects.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact_set::ArtifactSet;
use crate::error::{FactoryError, Result};

/// Sidecar metadata file written at the root of every project tree.
pub const META_FILE_NAME: &str = ".factory_meta.json";

/// Well-known artifact path of the design spec.
pub const DESIGN_SPEC_PATH: &str = "design_spec.json";

/// Ordered path → purpose mapping.
pub type FileManifest = IndexMap<String, String>;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Position of a project in the pipeline.
///
/// Variants are declared in execution order; `Error` is absorbing and sorts last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pending,
    Planned,
    Designed,
    FrontendDone,
    BackendDone,
    Persisted,
    Validated,
    Error,
}

impl Phase {
    /// Stable label used in checkpoint records and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Planned => "planned",
            Self::Designed => "designed",
            Self::FrontendDone => "frontend_done",
            Self::BackendDone => "backend_done",
            Self::Persisted => "persisted",
            Self::Validated => "validated",
            Self::Error => "error",
        }
    }

    /// Operator-facing hint about what a resume from this phase will do.
    pub fn resume_hint(&self) -> &'static str {
        match self {
            Self::Pending => "nothing completed yet, planning will run",
            Self::Planned => "planning done, design resumes",
            Self::Designed => "design done, frontend generation resumes",
            Self::FrontendDone => "frontend done, backend generation resumes",
            Self::BackendDone => "backend done, persistence and validation resume",
            Self::Persisted => "saved to disk, validation resumes",
            Self::Validated => "finished",
            Self::Error => "failed",
        }
    }

    /// `true` for `Validated` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Validated | Self::Error)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Build mode / project type
// ---------------------------------------------------------------------------

/// How the current run was entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildMode {
    /// Fresh build from an idea.
    New,
    /// Modification of an existing project tree.
    Upgrade { request: String },
}

/// Shape of the generated project, decided by planning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    FrontendOnly,
    #[default]
    Fullstack,
    BackendOnly,
}

impl ProjectType {
    /// Lenient parse of the planner's `project_type` string. Unknown values map to fullstack.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "frontend_only" | "frontend" => Self::FrontendOnly,
            "backend_only" | "backend" => Self::BackendOnly,
            _ => Self::Fullstack,
        }
    }
}

// ---------------------------------------------------------------------------
// DesignSpec
// ---------------------------------------------------------------------------

/// Canvas rendering hints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanvasSpec {
    #[serde(default)]
    pub use_canvas: bool,
    #[serde(default)]
    pub canvas_guide: Option<String>,
}

/// Theme and component taxonomy shared by every frontend file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignSpec {
    #[serde(default)]
    pub theme: IndexMap<String, String>,
    #[serde(default)]
    pub typography: IndexMap<String, String>,
    #[serde(default)]
    pub components: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub layout: IndexMap<String, String>,
    #[serde(default)]
    pub canvas: CanvasSpec,
    #[serde(default)]
    pub no_image_strategy: String,
    /// Keys the model added beyond the fixed schema (sprites, domain, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DesignSpec {
    /// Theme colour for `key`, or `fallback` when absent.
    pub fn theme_color<'a>(&'a self, key: &str, fallback: &'a str) -> &'a str {
        self.theme.get(key).map(String::as_str).unwrap_or(fallback)
    }

    /// `"GAME"` or `"APP"`, read from the optional `project_domain` key.
    pub fn project_domain(&self) -> &str {
        self.extra
            .get("project_domain")
            .and_then(|v| v.as_str())
            .unwrap_or("APP")
    }
}

impl Default for DesignSpec {
    fn default() -> Self {
        let pairs = |items: &[(&str, &str)]| -> IndexMap<String, String> {
            items
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect()
        };

        let components = [
            ("button_primary", "bg-blue-500 hover:bg-blue-600 text-white font-semibold py-2 px-4 rounded-lg transition-colors"),
            ("button_secondary", "bg-gray-200 hover:bg-gray-300 text-gray-800 font-semibold py-2 px-4 rounded-lg transition-colors"),
            ("card", "bg-white rounded-xl shadow-md p-6"),
            ("input", "w-full border border-gray-300 rounded-lg px-3 py-2 focus:outline-none focus:ring-2 focus:ring-blue-500"),
            ("badge", "inline-flex items-center px-2.5 py-0.5 rounded-full text-xs font-medium bg-blue-100 text-blue-800"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect();

        Self {
            theme: pairs(&[
                ("primary", "blue-500"),
                ("secondary", "indigo-600"),
                ("background", "gray-50"),
                ("surface", "white"),
                ("text_primary", "gray-900"),
                ("text_secondary", "gray-600"),
                ("accent", "emerald-400"),
                ("danger", "red-500"),
            ]),
            typography: pairs(&[
                ("font_stack", "-apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif"),
                ("heading_weight", "font-bold"),
                ("body_size", "text-base"),
            ]),
            components,
            layout: pairs(&[
                ("max_width", "max-w-7xl"),
                ("spacing", "space-y-4"),
                ("grid", "grid grid-cols-1 md:grid-cols-2 lg:grid-cols-3 gap-4"),
            ]),
            canvas: CanvasSpec::default(),
            no_image_strategy: "Replace images with CSS shapes (border-radius, gradient, box-shadow) and unicode glyphs".into(),
            extra: serde_json::Map::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectState
// ---------------------------------------------------------------------------

/// The single mutable aggregate threaded through every pipeline phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectState {
    identity: Option<String>,
    /// The operator's idea that seeded planning.
    pub idea: String,
    pub mode: BuildMode,
    #[serde(default)]
    pub project_type: ProjectType,
    /// Free-text planning document.
    #[serde(default)]
    pub spec_document: String,
    #[serde(default)]
    pub file_manifest: FileManifest,
    /// Upgrade runs only: paths to add or change this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_manifest: Option<FileManifest>,
    #[serde(default)]
    pub interface_contracts: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_spec: Option<DesignSpec>,
    #[serde(default)]
    pub artifacts: ArtifactSet,
    pub phase: Phase,
    /// Most recent human-readable status or report.
    #[serde(default)]
    pub diagnostics: String,
}

impl ProjectState {
    /// Fresh state for a new build.
    pub fn new_build(idea: impl Into<String>) -> Self {
        Self {
            identity: None,
            idea: idea.into(),
            mode: BuildMode::New,
            project_type: ProjectType::default(),
            spec_document: String::new(),
            file_manifest: FileManifest::new(),
            delta_manifest: None,
            interface_contracts: IndexMap::new(),
            design_spec: None,
            artifacts: ArtifactSet::new(),
            phase: Phase::Pending,
            diagnostics: String::new(),
        }
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Identity, or a planning error when it has not been assigned yet.
    pub fn require_identity(&self) -> Result<&str> {
        self.identity
            .as_deref()
            .ok_or_else(|| FactoryError::planning("project identity has not been assigned"))
    }

    /// Assign the project identity. Allowed exactly once.
    ///
    /// The raw name is sanitized into a snake_case directory-safe slug.
    pub fn assign_identity(&mut self, raw: &str) -> Result<&str> {
        if let Some(existing) = &self.identity {
            return Err(FactoryError::validation(format!(
                "project identity already assigned ({existing})"
            )));
        }

        let slug = sanitize_identity(raw);
        if slug.is_empty() {
            return Err(FactoryError::planning(format!(
                "project name {raw:?} does not contain any usable characters"
            )));
        }

        Ok(self.identity.insert(slug))
    }

    /// Mark the run as failed with a diagnostic message.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.phase = Phase::Error;
        self.diagnostics = message.into();
    }

    /// Paths the generation phases must produce this run: the delta manifest
    /// in upgrade mode, the full manifest otherwise.
    pub fn generation_targets(&self) -> &FileManifest {
        self.delta_manifest.as_ref().unwrap_or(&self.file_manifest)
    }

    /// `true` when `path` is a manifest entry or an existing artifact.
    pub fn tracks(&self, path: &str) -> bool {
        self.file_manifest.contains_key(path) || self.artifacts.contains(path)
    }

    /// Replace the interface contracts, keeping only paths the project tracks.
    pub fn set_interface_contracts(&mut self, contracts: IndexMap<String, String>) {
        let mut kept = IndexMap::new();
        for (path, contract) in contracts {
            if self.tracks(&path) {
                kept.insert(path, contract);
            } else {
                tracing::warn!(%path, "dropping interface contract for untracked path");
            }
        }
        self.interface_contracts = kept;
    }
}

/// Lowercase, map separators to `_`, keep `[a-z0-9_]`, trim stray underscores.
fn sanitize_identity(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if matches!(ch, '_' | '-' | ' ' | '.') && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

// ---------------------------------------------------------------------------
// ProjectMeta
// ---------------------------------------------------------------------------

/// The sidecar `.factory_meta.json` stored next to a generated project.
///
/// Holds everything an upgrade run needs that cannot be recovered from the
/// file tree alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub identity: String,
    #[serde(default)]
    pub project_type: ProjectType,
    #[serde(default)]
    pub spec_document: String,
    #[serde(default)]
    pub file_manifest: FileManifest,
    #[serde(default)]
    pub interface_contracts: IndexMap<String, String>,
    /// [`ArtifactSet::digest`] at the time of writing.
    #[serde(default)]
    pub artifact_digest: String,
    pub tool_version: String,
    pub updated_at: DateTime<Utc>,
}

impl ProjectMeta {
    /// Snapshot the metadata of a state whose identity is assigned.
    pub fn from_state(state: &ProjectState, tool_version: &str) -> Result<Self> {
        Ok(Self {
            identity: state.require_identity()?.to_string(),
            project_type: state.project_type,
            spec_document: state.spec_document.clone(),
            file_manifest: state.file_manifest.clone(),
            interface_contracts: state.interface_contracts.clone(),
            artifact_digest: state.artifacts.digest(),
            tool_version: tool_version.to_string(),
            updated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_order_matches_pipeline() {
        assert!(Phase::Pending < Phase::Planned);
        assert!(Phase::Planned < Phase::Designed);
        assert!(Phase::FrontendDone < Phase::BackendDone);
        assert!(Phase::Persisted < Phase::Validated);
        assert!(Phase::Validated.is_terminal());
        assert!(!Phase::Persisted.is_terminal());
    }

    #[test]
    fn phase_serializes_as_label() {
        let json = serde_json::to_string(&Phase::FrontendDone).unwrap();
        assert_eq!(json, r#""frontend_done""#);
        assert_eq!(Phase::FrontendDone.to_string(), "frontend_done");
    }

    #[test]
    fn identity_is_assigned_once() {
        let mut state = ProjectState::new_build("a todo app");
        assert!(state.require_identity().is_err());

        let id = state.assign_identity("Todo App-v2").unwrap().to_string();
        assert_eq!(id, "todo_app_v2");
        assert_eq!(state.identity(), Some("todo_app_v2"));

        let err = state.assign_identity("other").unwrap_err();
        assert!(err.to_string().contains("already assigned"));
        assert_eq!(state.identity(), Some("todo_app_v2"));
    }

    #[test]
    fn identity_rejects_unusable_names() {
        let mut state = ProjectState::new_build("idea");
        assert!(state.assign_identity("../").is_err());
        assert!(state.identity().is_none());
    }

    #[test]
    fn generation_targets_prefer_delta() {
        let mut state = ProjectState::new_build("idea");
        state.file_manifest.insert("a.py".into(), "a".into());
        state.file_manifest.insert("b.py".into(), "b".into());
        assert_eq!(state.generation_targets().len(), 2);

        let mut delta = FileManifest::new();
        delta.insert("b.py".into(), "change b".into());
        state.delta_manifest = Some(delta);
        assert_eq!(state.generation_targets().len(), 1);
        assert!(state.generation_targets().contains_key("b.py"));
    }

    #[test]
    fn contracts_for_untracked_paths_are_dropped() {
        let mut state = ProjectState::new_build("idea");
        state.file_manifest.insert("src/map.js".into(), "map".into());

        let mut contracts = IndexMap::new();
        contracts.insert("src/map.js".into(), "class Map {}".into());
        contracts.insert("src/ghost.js".into(), "class Ghost {}".into());
        state.set_interface_contracts(contracts);

        assert_eq!(state.interface_contracts.len(), 1);
        assert!(state.interface_contracts.contains_key("src/map.js"));
    }

    #[test]
    fn design_spec_keeps_unknown_keys() {
        let json = r#"{
            "theme": {"primary": "rose-500"},
            "canvas": {"use_canvas": true, "canvas_guide": "rAF loop"},
            "project_domain": "GAME",
            "pixel_sprites": {"sprite_scale": 8}
        }"#;
        let spec: DesignSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.theme_color("primary", "blue-500"), "rose-500");
        assert_eq!(spec.theme_color("background", "gray-50"), "gray-50");
        assert!(spec.canvas.use_canvas);
        assert_eq!(spec.project_domain(), "GAME");
        assert!(spec.extra.contains_key("pixel_sprites"));
    }

    #[test]
    fn state_roundtrips_through_json() {
        let mut state = ProjectState::new_build("idea");
        state.assign_identity("shop").unwrap();
        state.mode = BuildMode::Upgrade {
            request: "add cart".into(),
        };
        state.artifacts.insert("index.html", "<html></html>").unwrap();
        state.phase = Phase::FrontendDone;

        let json = serde_json::to_string(&state).unwrap();
        let parsed: ProjectState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.identity(), Some("shop"));
        assert_eq!(parsed.phase, Phase::FrontendDone);
        assert_eq!(parsed.artifacts.get("index.html"), Some("<html></html>"));
        assert!(matches!(parsed.mode, BuildMode::Upgrade { .. }));
    }

    #[test]
    fn project_type_parses_leniently() {
        assert_eq!(ProjectType::from_label("frontend_only"), ProjectType::FrontendOnly);
        assert_eq!(ProjectType::from_label("Backend-Only"), ProjectType::BackendOnly);
        assert_eq!(ProjectType::from_label("???"), ProjectType::Fullstack);
    }
}
