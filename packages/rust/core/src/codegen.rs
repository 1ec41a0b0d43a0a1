//! Frontend and backend generation phases.
//!
//! Files are generated one at a time in manifest order. Each prompt carries
//! every file generated so far, so later files can follow the APIs of earlier
//! ones.

use tracing::{debug, info, instrument, warn};

use mvpfactory_generation::{Generator, ModelRole, extract_content};
use mvpfactory_shared::{DESIGN_SPEC_PATH, ProjectState, ProjectType};

use crate::progress::ProgressReporter;
use crate::prompts::{self, FileRequest};

const FRONTEND_EXTENSIONS: &[&str] = &[
    ".html", ".css", ".js", ".ts", ".tsx", ".jsx", ".vue", ".svelte",
];
const FRONTEND_DIRS: &[&str] = &["frontend", "static", "public", "src", "client", "web", "templates"];

/// `true` for browser-side files, by extension or by top-level directory.
pub fn is_frontend(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    FRONTEND_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
        || FRONTEND_DIRS
            .iter()
            .any(|dir| lower.starts_with(&format!("{dir}/")))
}

/// Everything that is neither frontend nor the design spec.
pub fn is_backend(path: &str) -> bool {
    path != DESIGN_SPEC_PATH && !is_frontend(path)
}

#[derive(Clone, Copy)]
enum Side {
    Frontend,
    Backend,
}

impl Side {
    fn role(self) -> ModelRole {
        match self {
            Self::Frontend => ModelRole::Frontend,
            Self::Backend => ModelRole::Backend,
        }
    }

    fn owns(self, path: &str) -> bool {
        match self {
            Self::Frontend => is_frontend(path),
            Self::Backend => is_backend(path),
        }
    }
}

/// Generate every frontend target of this run.
#[instrument(skip_all, fields(identity = state.identity().unwrap_or_default()))]
pub async fn generate_frontend<G: Generator>(
    generator: &G,
    state: &mut ProjectState,
    progress: &dyn ProgressReporter,
) {
    generate_side(generator, state, progress, Side::Frontend).await;
}

/// Generate every backend target of this run. Skipped for frontend-only projects.
#[instrument(skip_all, fields(identity = state.identity().unwrap_or_default()))]
pub async fn generate_backend<G: Generator>(
    generator: &G,
    state: &mut ProjectState,
    progress: &dyn ProgressReporter,
) {
    if state.project_type == ProjectType::FrontendOnly {
        info!("frontend-only project, skipping backend generation");
        return;
    }
    generate_side(generator, state, progress, Side::Backend).await;
}

async fn generate_side<G: Generator>(
    generator: &G,
    state: &mut ProjectState,
    progress: &dyn ProgressReporter,
    side: Side,
) {
    let targets: Vec<(String, String)> = state
        .generation_targets()
        .iter()
        .filter(|(path, _)| side.owns(path))
        .map(|(path, purpose)| (path.clone(), purpose.clone()))
        .collect();
    let total = targets.len();
    let mut failed = 0usize;

    for (index, (path, purpose)) in targets.iter().enumerate() {
        let prompt = {
            let request = FileRequest {
                path,
                purpose,
                spec_document: &state.spec_document,
                manifest: &state.file_manifest,
                design_spec: state.design_spec.as_ref(),
                existing: &state.artifacts,
                contracts: &state.interface_contracts,
            };
            match side {
                Side::Frontend => prompts::frontend_file(&request),
                Side::Backend => prompts::backend_file(&request),
            }
        };

        let content = match generator.generate(side.role(), &prompt).await {
            Ok(raw) => {
                let content = extract_content(&raw).into_content();
                debug!(%path, bytes = content.len(), "file generated");
                content
            }
            Err(e) => {
                warn!(%path, error = %e, "generation failed, writing placeholder");
                failed += 1;
                placeholder(path, &e.to_string())
            }
        };

        if let Err(e) = state.artifacts.insert(path, content) {
            warn!(%path, error = %e, "skipping file with unusable path");
            continue;
        }
        progress.file_generated(path, index + 1, total);
    }

    info!(generated = total - failed, failed, "generation pass complete");
}

/// Stand-in content for a file whose generation failed, as a comment in
/// the file's own syntax.
fn placeholder(path: &str, error: &str) -> String {
    let message = format!("Generation failed for {path}: {error}");
    let ext = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" | "vue" | "svelte" | "md" | "xml" => format!("<!-- {message} -->\n"),
        "js" | "mjs" | "cjs" | "ts" | "tsx" | "jsx" | "css" => format!("/* {message} */\n"),
        _ => format!("# {message}\n"),
    }
}
