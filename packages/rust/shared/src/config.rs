//! Application configuration for MVP Factory.
//!
//! User config lives at `~/.mvpfactory/mvpfactory.toml`.
//! CLI flags and env vars override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FactoryError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "mvpfactory.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".mvpfactory";

// ---------------------------------------------------------------------------
// Config structs (matching mvpfactory.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Gemini API settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Static validation settings.
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root directory that receives `<identity>/` project trees.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Root directory for `active/` and `completed/` checkpoint records.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,

    /// Upper bound on reviewer/fix passes in the repair loop.
    #[serde(default = "default_max_fix_iterations")]
    pub max_fix_iterations: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            checkpoint_dir: default_checkpoint_dir(),
            max_fix_iterations: default_max_fix_iterations(),
        }
    }
}

fn default_output_dir() -> String {
    "output".into()
}
fn default_checkpoint_dir() -> String {
    ".agent_logs".into()
}
fn default_max_fix_iterations() -> usize {
    2
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Secondary env var consulted when the primary one is unset.
    #[serde(default = "default_fallback_api_key_env")]
    pub fallback_api_key_env: String,

    /// Base URL of the Generative Language API.
    #[serde(default = "default_base_url")]
    pub base_url: Url,

    /// Model for planning (new build and upgrade).
    #[serde(default = "default_light_model")]
    pub planning_model: String,

    /// Model for the design spec.
    #[serde(default = "default_light_model")]
    pub design_model: String,

    /// Model for frontend file generation.
    #[serde(default = "default_code_model")]
    pub frontend_model: String,

    /// Model for backend file generation.
    #[serde(default = "default_code_model")]
    pub backend_model: String,

    /// Model for code review in the repair loop.
    #[serde(default = "default_light_model")]
    pub review_model: String,

    /// Model for README generation.
    #[serde(default = "default_light_model")]
    pub docs_model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            fallback_api_key_env: default_fallback_api_key_env(),
            base_url: default_base_url(),
            planning_model: default_light_model(),
            design_model: default_light_model(),
            frontend_model: default_code_model(),
            backend_model: default_code_model(),
            review_model: default_light_model(),
            docs_model: default_light_model(),
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_fallback_api_key_env() -> String {
    "GOOGLE_API_KEY".into()
}
fn default_base_url() -> Url {
    Url::parse("https://generativelanguage.googleapis.com/").expect("valid default base URL")
}
fn default_light_model() -> String {
    "gemini-2.5-flash-lite".into()
}
fn default_code_model() -> String {
    "gemini-2.5-flash".into()
}

/// `[validation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Interpreter used for Python syntax checks. Tree-sitter is used when it is not installed.
    #[serde(default = "default_python_cmd")]
    pub python_cmd: String,

    /// Interpreter used for script syntax checks.
    #[serde(default = "default_node_cmd")]
    pub node_cmd: String,

    /// Per-file timeout for the interpreter syntax checks.
    #[serde(default = "default_node_timeout_secs")]
    pub node_timeout_secs: u64,

    /// Directory names skipped when loading a project tree, in addition to the built-ins.
    #[serde(default)]
    pub extra_skip_dirs: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            python_cmd: default_python_cmd(),
            node_cmd: default_node_cmd(),
            node_timeout_secs: default_node_timeout_secs(),
            extra_skip_dirs: Vec::new(),
        }
    }
}

fn default_python_cmd() -> String {
    "python3".into()
}
fn default_node_cmd() -> String {
    "node".into()
}
fn default_node_timeout_secs() -> u64 {
    10
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.mvpfactory/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| FactoryError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.mvpfactory/mvpfactory.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FactoryError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| FactoryError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FactoryError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| FactoryError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FactoryError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the Gemini API key from the configured env var, falling back to the secondary one.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let primary = &config.gemini.api_key_env;
    let fallback = &config.gemini.fallback_api_key_env;

    for var_name in [primary, fallback] {
        if let Ok(val) = std::env::var(var_name) {
            if !val.is_empty() {
                return Ok(val);
            }
        }
    }

    Err(FactoryError::config(format!(
        "Gemini API key not found. Set the {primary} (or {fallback}) environment variable."
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("GEMINI_API_KEY"));
        assert!(toml_str.contains("node_cmd"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.max_fix_iterations, 2);
        assert_eq!(parsed.defaults.checkpoint_dir, ".agent_logs");
        assert_eq!(parsed.gemini.frontend_model, "gemini-2.5-flash");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
output_dir = "/tmp/mvps"

[gemini]
review_model = "gemini-2.5-pro"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.output_dir, "/tmp/mvps");
        assert_eq!(config.defaults.max_fix_iterations, 2);
        assert_eq!(config.gemini.review_model, "gemini-2.5-pro");
        assert_eq!(config.gemini.planning_model, "gemini-2.5-flash-lite");
        assert_eq!(config.validation.node_timeout_secs, 10);
        assert_eq!(config.validation.python_cmd, "python3");
    }

    #[test]
    fn api_key_resolution_fails_without_env() {
        let mut config = AppConfig::default();
        // Use unique env var names to avoid interfering with other tests
        config.gemini.api_key_env = "MVPF_TEST_NONEXISTENT_KEY_1".into();
        config.gemini.fallback_api_key_env = "MVPF_TEST_NONEXISTENT_KEY_2".into();
        let result = resolve_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
