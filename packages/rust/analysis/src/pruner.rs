//! Dependency-manifest pruning for Python projects.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, instrument};

use mvpfactory_artifacts::ArtifactStore;
use mvpfactory_shared::{ArtifactSet, Result};

/// The dependency manifest at the project root.
pub const MANIFEST_PATH: &str = "requirements.txt";

/// Servers launched from the command line; never imported by the code.
const ALWAYS_KEEP: &[&str] = &["uvicorn", "gunicorn", "hypercorn", "daphne"];

/// Normalized distribution name → top-level import name.
const DISTRIBUTION_IMPORTS: &[(&str, &str)] = &[
    ("fastapi", "fastapi"),
    ("uvicorn", "uvicorn"),
    ("starlette", "starlette"),
    ("pydantic", "pydantic"),
    ("sqlalchemy", "sqlalchemy"),
    ("alembic", "alembic"),
    ("websockets", "websockets"),
    ("python_multipart", "multipart"),
    ("aiofiles", "aiofiles"),
    ("httpx", "httpx"),
    ("requests", "requests"),
    ("python_dotenv", "dotenv"),
    ("python_jose", "jose"),
    ("passlib", "passlib"),
    ("pillow", "PIL"),
    ("bcrypt", "bcrypt"),
    ("cryptography", "cryptography"),
    ("itsdangerous", "itsdangerous"),
    ("jinja2", "jinja2"),
    ("aiosqlite", "aiosqlite"),
    ("asyncpg", "asyncpg"),
    ("psycopg2", "psycopg2"),
    ("psycopg2_binary", "psycopg2"),
    ("pymysql", "pymysql"),
    ("motor", "motor"),
    ("pymongo", "pymongo"),
    ("redis", "redis"),
    ("celery", "celery"),
    ("boto3", "boto3"),
    ("openai", "openai"),
    ("anthropic", "anthropic"),
    ("google_genai", "google"),
    ("google_generativeai", "google"),
    ("numpy", "numpy"),
    ("pandas", "pandas"),
    ("scipy", "scipy"),
    ("matplotlib", "matplotlib"),
    ("scikit_learn", "sklearn"),
    ("torch", "torch"),
    ("tensorflow", "tensorflow"),
    ("pytest", "pytest"),
    ("pytest_asyncio", "pytest_asyncio"),
    ("anyio", "anyio"),
    ("email_validator", "email_validator"),
    ("python_slugify", "slugify"),
    ("pyyaml", "yaml"),
    ("toml", "toml"),
    ("click", "click"),
    ("rich", "rich"),
    ("loguru", "loguru"),
];

/// Packages pulled in implicitly by framework features; kept iff the
/// pattern occurs anywhere in the Python sources.
static USAGE_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("websockets", Regex::new(r"\bWebSocket\b").expect("valid regex")),
        (
            "python_multipart",
            Regex::new(r"\b(Form|File|UploadFile)\b").expect("valid regex"),
        ),
    ]
});

static IMPORT_STMT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^import\s+([\w.]+)").expect("valid regex"));

static FROM_IMPORT_STMT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^from\s+([\w.]+)\s+import").expect("valid regex"));

static REQUIREMENT_NAME_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\[>=<!;\s]").expect("valid regex"));

/// Remove manifest entries that no Python file uses.
///
/// Returns the dropped lines (trimmed). The manifest is rewritten in memory
/// and on disk only when at least one entry was dropped.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn prune_requirements(
    store: &ArtifactStore,
    root: &Path,
    artifacts: &mut ArtifactSet,
) -> Result<Vec<String>> {
    let Some(manifest) = artifacts.get(MANIFEST_PATH) else {
        return Ok(Vec::new());
    };

    let sources: Vec<&str> = artifacts
        .iter()
        .filter(|(path, _)| path.ends_with(".py"))
        .map(|(_, content)| content)
        .collect();
    let imported = imported_top_modules(&sources);
    let all_source = sources.join("\n");

    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    for line in manifest.lines() {
        let entry = line.trim();
        if entry.is_empty() || entry.starts_with('#') || is_needed(entry, &imported, &all_source) {
            kept.push(line);
        } else {
            dropped.push(entry.to_string());
        }
    }

    if dropped.is_empty() {
        return Ok(dropped);
    }

    let mut content = kept.join("\n");
    if manifest.ends_with('\n') {
        content.push('\n');
    }

    store.write_one(root, MANIFEST_PATH, &content)?;
    artifacts.insert(MANIFEST_PATH, content)?;

    info!(dropped = ?dropped, "pruned unused requirements");
    Ok(dropped)
}

fn is_needed(entry: &str, imported: &HashSet<String>, all_source: &str) -> bool {
    let name = normalize_requirement(entry);

    if ALWAYS_KEEP.contains(&name.as_str()) {
        return true;
    }

    if let Some((_, pattern)) = USAGE_PATTERNS.iter().find(|(dist, _)| *dist == name) {
        return pattern.is_match(all_source);
    }

    if let Some((_, import_name)) = DISTRIBUTION_IMPORTS.iter().find(|(dist, _)| *dist == name) {
        return imported.contains(*import_name);
    }

    let base = name.split('_').next().unwrap_or(&name);
    imported.contains(&name) || imported.contains(base)
}

/// `Uvicorn[standard]>=0.29` → `uvicorn`; `python-dotenv` → `python_dotenv`.
fn normalize_requirement(entry: &str) -> String {
    let name = REQUIREMENT_NAME_END.split(entry.trim()).next().unwrap_or("");
    name.to_lowercase().replace('-', "_")
}

fn imported_top_modules(sources: &[&str]) -> HashSet<String> {
    let mut modules = HashSet::new();
    for source in sources {
        for line in source.lines() {
            let line = line.trim();
            let caps = IMPORT_STMT
                .captures(line)
                .or_else(|| FROM_IMPORT_STMT.captures(line));
            if let Some(caps) = caps {
                if let Some(top) = caps[1].split('.').next() {
                    modules.insert(top.to_string());
                }
            }
        }
    }
    modules
}
