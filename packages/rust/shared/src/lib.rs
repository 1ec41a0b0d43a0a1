//! Shared types, error model, and configuration for MVP Factory.
//!
//! This crate is the foundation depended on by all other MVP Factory crates.
//! It provides:
//! - [`FactoryError`]: the unified error type
//! - Domain types ([`ProjectState`], [`Phase`], [`ArtifactSet`], [`DesignSpec`], [`ProjectMeta`])
//! - Configuration ([`AppConfig`], config loading, API key resolution)

pub mod artifact_set;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use artifact_set::{ArtifactSet, normalize_path};
pub use config::{
    AppConfig, DefaultsConfig, GeminiConfig, ValidationConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{FactoryError, Result};
pub use types::{
    BuildMode, CanvasSpec, DESIGN_SPEC_PATH, DesignSpec, FileManifest, META_FILE_NAME, Phase,
    ProjectMeta, ProjectState, ProjectType, RunId,
};
