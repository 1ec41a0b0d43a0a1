//! Prompt builders for every model-backed step.
//!
//! Prompts are plain `format!` templates; the response contracts they ask for
//! are parsed in the phase that sends them.

use std::fmt::Write as _;

use indexmap::IndexMap;

use mvpfactory_analysis::Diagnostic;
use mvpfactory_shared::{ArtifactSet, DESIGN_SPEC_PATH, DesignSpec, FileManifest};

/// Files shown in the upgrade code preview.
const PREVIEW_FILE_LIMIT: usize = 8;
/// Lines shown per previewed file.
const PREVIEW_LINE_LIMIT: usize = 25;
const PREVIEW_EXTENSIONS: &[&str] = &[".py", ".js", ".html", ".ts"];

fn manifest_block(manifest: &FileManifest) -> String {
    if manifest.is_empty() {
        return "(no files)".into();
    }
    manifest
        .iter()
        .map(|(path, purpose)| format!("- {path}: {purpose}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn files_block<'a>(files: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    let mut out = String::new();
    for (path, content) in files {
        let _ = write!(out, "\n--- {path} ---\n{content}\n");
    }
    out
}

fn contracts_block(contracts: &IndexMap<String, String>) -> String {
    if contracts.is_empty() {
        return "(no interface contracts)".into();
    }
    contracts
        .iter()
        .map(|(path, contract)| format!("- {path}: {contract}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn planning(idea: &str) -> String {
    format!(
        r#"You are an MVP product manager.
Idea: {idea}

Define the minimum viable product that implements this idea.

Requirements:
1. "prd" is a single string describing the product.
2. Every key of "file_tree" is a real file path (for example src/utils/vector2.js). No directories, no nesting.
3. "project_name" is English snake_case (for example doom_fps_game).
4. Dependency completeness: if file A imports file B, file B must also be in file_tree.
5. "project_type" is exactly one of:
   - "frontend_only": games, SPAs, landing pages. No Python files and no requirements.txt.
   - "fullstack": REST API plus UI, with backend/ and frontend/ trees and a requirements.txt.
   - "backend_only": CLIs, data processing.
6. "interface_contracts" maps a file path to the public API other files rely on,
   for example {{"src/map.js": "class Map {{ loadData(data): void; isWalkable(x, y): bool; }}"}}.

Answer with JSON only:
{{
  "project_name": "snake_case_name",
  "project_type": "frontend_only",
  "prd": "product description",
  "file_tree": {{"index.html": "entry page", "src/game.js": "game loop"}},
  "interface_contracts": {{"src/game.js": "class Game {{ start(): void; }}"}}
}}
"#
    )
}

pub fn upgrade_planning(
    spec_document: &str,
    manifest: &FileManifest,
    artifacts: &ArtifactSet,
    request: &str,
) -> String {
    let mut preview = String::new();
    let previewed = artifacts
        .iter()
        .filter(|(path, _)| {
            !path.starts_with('.') && PREVIEW_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
        })
        .take(PREVIEW_FILE_LIMIT);
    for (path, content) in previewed {
        let head: Vec<&str> = content.lines().take(PREVIEW_LINE_LIMIT).collect();
        let _ = write!(
            preview,
            "\n--- {path} (first {} lines) ---\n{}\n",
            head.len(),
            head.join("\n")
        );
    }
    if preview.is_empty() {
        preview.push_str("(none)");
    }

    format!(
        r#"You are an MVP product manager planning an upgrade of an existing project.

=== Existing PRD ===
{spec_document}

=== Existing files ===
{files}

=== Code preview ===
{preview}

=== Upgrade request ===
{request}

Include in delta_file_tree only files that must be added or changed to fulfil the request.
Never include unchanged files. Keep new files consistent with the existing layout.

Answer with JSON only:
{{
  "updated_prd": "full PRD including the new features",
  "delta_file_tree": {{"path/to/changed_or_new_file": "what changes in this file"}},
  "change_summary": "one-line summary of the upgrade"
}}
"#,
        files = manifest_block(manifest),
    )
}

pub fn design(idea: &str, spec_document: &str, frontend_files: &[&str]) -> String {
    let defaults = serde_json::to_string_pretty(&DesignSpec::default()).unwrap_or_default();
    format!(
        r#"You are a UI/UX designer. Produce a design spec for a product built without image assets.

=== Idea ===
{idea}

=== PRD ===
{spec_document}

=== Frontend files ===
{files}

Use Tailwind CSS class names. Replace images with CSS shapes, gradients and unicode glyphs.
Set "project_domain" to "GAME" for canvas-rendered games and "APP" otherwise.

Answer with JSON only, using this shape (values are examples):
{defaults}
"#,
        files = if frontend_files.is_empty() {
            "(none)".to_string()
        } else {
            frontend_files.join("\n")
        },
    )
}

/// Everything a per-file generation prompt needs.
pub struct FileRequest<'a> {
    pub path: &'a str,
    pub purpose: &'a str,
    pub spec_document: &'a str,
    pub manifest: &'a FileManifest,
    pub design_spec: Option<&'a DesignSpec>,
    pub existing: &'a ArtifactSet,
    pub contracts: &'a IndexMap<String, String>,
}

pub fn frontend_file(req: &FileRequest<'_>) -> String {
    let design = req
        .design_spec
        .map(|spec| serde_json::to_string_pretty(spec).unwrap_or_default())
        .unwrap_or_else(|| "(no design spec)".into());
    let rendering = match req.design_spec {
        Some(spec) if spec.project_domain() == "GAME" || spec.canvas.use_canvas => {
            "Render with the HTML5 Canvas API and a requestAnimationFrame loop (update(dt) then render(ctx)). Do not build the scene from DOM nodes."
        }
        _ => {
            "Render with DOM APIs, the Tailwind CDN and Lucide icons (call lucide.createIcons()). Mobile first, responsive prefixes."
        }
    };

    format!(
        r#"You are a senior frontend developer. Write the complete contents of "{path}".

=== PRD ===
{spec}

=== Design spec ===
{design}

=== All files ===
{manifest}

=== Already generated ===
{existing}

=== Interface contract for this file ===
{own_contract}

=== All interface contracts ===
{contracts}

=== File to write ===
Path: {path}
Purpose: {purpose}

Rules:
1. Complete, runnable code. Never truncate.
2. No image files: no <img src>, no url() backgrounds.
3. No globals: a top-level Game/App object owns state and passes dependencies through constructors.
4. Call other files only through the APIs listed in the interface contracts.
5. Backend calls use fetch with baseURL 'http://localhost:8000'.
6. {rendering}

Reply with a single fenced code block in the file's language and nothing else.
"#,
        path = req.path,
        purpose = req.purpose,
        spec = req.spec_document,
        manifest = manifest_block(req.manifest),
        existing = files_block(existing_context(req.existing)),
        own_contract = req
            .contracts
            .get(req.path)
            .map(String::as_str)
            .unwrap_or("(none for this file)"),
        contracts = contracts_block(req.contracts),
    )
}

pub fn backend_file(req: &FileRequest<'_>) -> String {
    format!(
        r#"You are a senior backend developer. Write the complete contents of "{path}".

=== PRD ===
{spec}

=== All files ===
{manifest}

=== Already generated ===
{existing}

=== Interface contract for this file ===
{own_contract}

=== All interface contracts ===
{contracts}

=== File to write ===
Path: {path}
Purpose: {purpose}

Rules:
1. Complete, runnable code. Never truncate.
2. Python imports inside the project are absolute from the top-level package
   (from backend.models import Item). No relative or bare imports.
   The app is started from the project root with `uvicorn backend.main:app`.
3. Every package directory has an __init__.py.
4. requirements.txt lists only packages the code imports, with version ranges.
5. Pydantic v2 (model_config = ConfigDict(...)) and SQLAlchemy 2.0 (DeclarativeBase) syntax.
6. Enable CORS for the frontend.

Reply with a single fenced code block and nothing else.
"#,
        path = req.path,
        purpose = req.purpose,
        spec = req.spec_document,
        manifest = manifest_block(req.manifest),
        existing = files_block(existing_context(req.existing)),
        own_contract = req
            .contracts
            .get(req.path)
            .map(String::as_str)
            .unwrap_or("(none for this file)"),
        contracts = contracts_block(req.contracts),
    )
}

fn existing_context(existing: &ArtifactSet) -> impl Iterator<Item = (&str, &str)> {
    existing.iter().filter(|(path, _)| *path != DESIGN_SPEC_PATH)
}

pub fn review(spec_document: &str, artifacts: &ArtifactSet, diagnostics: &[Diagnostic]) -> String {
    let findings = if diagnostics.is_empty() {
        String::new()
    } else {
        let lines: Vec<String> = diagnostics.iter().map(ToString::to_string).collect();
        format!("\n=== Static check findings ===\n{}\n", lines.join("\n"))
    };

    format!(
        r#"You are a senior code reviewer. Review the codebase below and fix what is broken.

=== PRD ===
{spec_document}
{findings}
=== Codebase ===
{files}

Check for:
1. Syntax errors and likely runtime errors.
2. Missing or wrong imports. Python imports must be absolute (from backend.models import X),
   never relative (from .x) and never bare (from models import X).
3. Frontend/backend API mismatches (URL, method, field names).
4. Core PRD features that are missing.

Answer with JSON only:
{{
  "issues": ["problem 1", "problem 2"],
  "fixed_files": {{"path/of/file": "complete corrected contents"}},
  "summary": "one-line review summary"
}}
Leave files that need no change out of fixed_files. With nothing to fix, return an empty
issues array and an empty fixed_files object.
"#,
        files = files_block(artifacts.iter()),
    )
}

pub fn readme(spec_document: &str, manifest: &FileManifest, artifacts: &ArtifactSet) -> String {
    format!(
        r#"You are a technical writer. Write a README.md that lets a developer who has never seen
this project run it immediately.

=== PRD ===
{spec_document}

=== Files ===
{manifest}

=== Code ===
{files}

Include: title and one-line description, tech stack, directory tree, prerequisites,
install and run steps (backend virtualenv, requirements, server command; how to open or
serve the frontend), main API endpoints if any, and how to verify it is running.

Answer in Markdown only.
"#,
        manifest = manifest_block(manifest),
        files = files_block(artifacts.iter()),
    )
}
