//! Planning phase: turn an idea (or an upgrade request) into a product
//! document, a file manifest and interface contracts.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use mvpfactory_generation::{Generator, ModelRole, flatten_manifest, parse_json_response};
use mvpfactory_shared::{BuildMode, ProjectState, ProjectType};

use crate::prompts;

#[derive(Debug, Deserialize)]
struct PlanResponse {
    #[serde(default)]
    project_name: Option<String>,
    #[serde(default)]
    project_type: Option<String>,
    #[serde(default)]
    prd: Value,
    #[serde(default)]
    file_tree: Value,
    #[serde(default)]
    interface_contracts: Value,
}

#[derive(Debug, Deserialize)]
struct UpgradePlanResponse {
    #[serde(default)]
    updated_prd: Value,
    #[serde(default)]
    delta_file_tree: Value,
    #[serde(default)]
    change_summary: String,
}

/// Planners sometimes return the PRD as a structured object; keep it as text.
fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

fn contracts_of(value: &Value) -> IndexMap<String, String> {
    let Value::Object(map) = value else {
        return IndexMap::new();
    };
    map.iter()
        .map(|(path, contract)| (path.clone(), text_of(contract)))
        .collect()
}

/// Plan a project from scratch.
///
/// Contract failures (unusable reply, missing name, empty manifest) put the
/// state into `Phase::Error`.
#[instrument(skip_all, fields(idea_len = state.idea.len()))]
pub async fn plan_new<G: Generator>(generator: &G, state: &mut ProjectState) {
    let raw = match generator
        .generate(ModelRole::Planning, &prompts::planning(&state.idea))
        .await
    {
        Ok(raw) => raw,
        Err(e) => return state.fail(format!("planning request failed: {e}")),
    };

    let plan: PlanResponse = match parse_json_response(&raw) {
        Ok(plan) => plan,
        Err(e) => return state.fail(format!("planning reply was unusable: {e}")),
    };

    let manifest = flatten_manifest(&plan.file_tree);
    if manifest.is_empty() {
        return state.fail("planning produced an empty file manifest");
    }

    let Some(name) = plan.project_name.as_deref().filter(|n| !n.trim().is_empty()) else {
        return state.fail("planning reply has no project_name");
    };
    if let Err(e) = state.assign_identity(name) {
        return state.fail(e.to_string());
    }

    state.project_type = plan
        .project_type
        .as_deref()
        .map(ProjectType::from_label)
        .unwrap_or_default();
    state.spec_document = text_of(&plan.prd);
    state.file_manifest = manifest;
    state.set_interface_contracts(contracts_of(&plan.interface_contracts));

    info!(
        identity = state.identity().unwrap_or_default(),
        files = state.file_manifest.len(),
        project_type = ?state.project_type,
        "planning complete"
    );
}

/// Plan the delta for an upgrade run.
///
/// Entries whose path already exists with an identical description are
/// removed from the delta; an empty delta is a planning failure.
#[instrument(skip_all, fields(identity = state.identity().unwrap_or_default()))]
pub async fn plan_upgrade<G: Generator>(generator: &G, state: &mut ProjectState) {
    let request = match &state.mode {
        BuildMode::Upgrade { request } => request.clone(),
        BuildMode::New => return state.fail("upgrade planning requires an upgrade run"),
    };

    let prompt = prompts::upgrade_planning(
        &state.spec_document,
        &state.file_manifest,
        &state.artifacts,
        &request,
    );
    let raw = match generator.generate(ModelRole::Planning, &prompt).await {
        Ok(raw) => raw,
        Err(e) => return state.fail(format!("upgrade planning request failed: {e}")),
    };

    let plan: UpgradePlanResponse = match parse_json_response(&raw) {
        Ok(plan) => plan,
        Err(e) => return state.fail(format!("upgrade planning reply was unusable: {e}")),
    };

    let mut delta = flatten_manifest(&plan.delta_file_tree);
    delta.retain(|path, purpose| {
        let unchanged = state.artifacts.contains(path)
            && state
                .file_manifest
                .get(path)
                .is_some_and(|existing| existing.as_str() == purpose.as_str());
        if unchanged {
            warn!(%path, "dropping unchanged path from upgrade delta");
        }
        !unchanged
    });

    if delta.is_empty() {
        return state.fail("upgrade planning produced no files to change");
    }

    let updated = text_of(&plan.updated_prd);
    if !updated.trim().is_empty() {
        state.spec_document = updated;
    }
    for (path, purpose) in &delta {
        state.file_manifest.insert(path.clone(), purpose.clone());
    }
    state.diagnostics = plan.change_summary;

    info!(delta = delta.len(), "upgrade planning complete");
    state.delta_manifest = Some(delta);
}
