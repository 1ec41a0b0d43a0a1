//! Design phase: produce the shared design spec for frontend generation.

use tracing::{info, instrument, warn};

use mvpfactory_generation::{Generator, ModelRole, parse_json_response};
use mvpfactory_shared::{BuildMode, DESIGN_SPEC_PATH, DesignSpec, ProjectState};

use crate::codegen::is_frontend;
use crate::prompts;

/// Populate `state.design_spec` and the `design_spec.json` artifact.
///
/// Upgrade runs reuse an existing, parseable spec. Otherwise the model is
/// asked for one; any failure falls back to [`DesignSpec::default`], so this
/// phase never fails the run.
#[instrument(skip_all, fields(identity = state.identity().unwrap_or_default()))]
pub async fn run_design<G: Generator>(generator: &G, state: &mut ProjectState) {
    if matches!(state.mode, BuildMode::Upgrade { .. }) {
        if let Some(existing) = existing_spec(state) {
            info!("reusing existing design spec");
            state.design_spec = Some(existing);
            return;
        }
    }

    let frontend_files: Vec<&str> = state
        .file_manifest
        .keys()
        .map(String::as_str)
        .filter(|path| is_frontend(path))
        .collect();
    let prompt = prompts::design(&state.idea, &state.spec_document, &frontend_files);

    let spec = match generator.generate(ModelRole::Design, &prompt).await {
        Ok(raw) => parse_json_response::<DesignSpec>(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "design reply unusable, using default design spec");
            DesignSpec::default()
        }),
        Err(e) => {
            warn!(error = %e, "design request failed, using default design spec");
            DesignSpec::default()
        }
    };

    match serde_json::to_string_pretty(&spec) {
        Ok(json) => {
            if let Err(e) = state.artifacts.insert(DESIGN_SPEC_PATH, json) {
                warn!(error = %e, "could not record design spec artifact");
            }
        }
        Err(e) => warn!(error = %e, "could not serialize design spec"),
    }
    info!(domain = spec.project_domain(), canvas = spec.canvas.use_canvas, "design spec ready");
    state.design_spec = Some(spec);
}

fn existing_spec(state: &ProjectState) -> Option<DesignSpec> {
    let raw = state.artifacts.get(DESIGN_SPEC_PATH)?;
    match serde_json::from_str(raw) {
        Ok(spec) => Some(spec),
        Err(e) => {
            warn!(error = %e, "existing design spec is unreadable, regenerating");
            None
        }
    }
}
