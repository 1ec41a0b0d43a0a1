//! Intra-project Python import resolution.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, instrument};

use mvpfactory_artifacts::ArtifactStore;
use mvpfactory_shared::{ArtifactSet, Result};

const PACKAGE_MARKER: &str = "__init__.py";

/// `from .name import ...` / `from ..name import ...`
static RELATIVE_NAMED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)from\s+(\.+)(\w+)(\s+import\s+.+)$").expect("valid regex")
});

/// `from . import ...` / `from .. import ...`
static RELATIVE_PACKAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)from\s+(\.+)\s+import\s+(.+)$").expect("valid regex")
});

/// `from name import ...`
static BARE_FROM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)from\s+(\w+)(\s+import\s+.+)$").expect("valid regex"));

/// `a, b as c`: a complete list of plain names.
static NAME_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w+(\s+as\s+\w+)?(\s*,\s*\w+(\s+as\s+\w+)?)*\s*$").expect("valid regex")
});

/// `import name` or `import name as alias`, nothing else on the line.
static BARE_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)import\s+(\w+)(\s+as\s+\w+)?\s*$").expect("valid regex")
});

/// Rewrite intra-project imports in every `.py` artifact to absolute dotted
/// paths and create any missing package markers.
///
/// Returns the paths that were modified or created, markers first. Each one
/// has already been written to `artifacts` and under `root`.
#[instrument(skip_all, fields(root = %root.display(), files = artifacts.len()))]
pub fn resolve_imports(
    store: &ArtifactStore,
    root: &Path,
    artifacts: &mut ArtifactSet,
) -> Result<Vec<String>> {
    let names = NameTable::build(artifacts);
    let mut fixed = Vec::new();

    for dir in unit_ancestor_dirs(artifacts) {
        let marker = format!("{dir}/{PACKAGE_MARKER}");
        if artifacts.contains(&marker) || root.join(&marker).exists() {
            continue;
        }
        artifacts.insert(&marker, "")?;
        store.write_one(root, &marker, "")?;
        debug!(path = %marker, "created package marker");
        fixed.push(marker);
    }

    let units: Vec<String> = artifacts
        .paths()
        .filter(|p| is_unit(p))
        .map(str::to_string)
        .collect();

    for path in units {
        let Some(source) = artifacts.get(&path) else {
            continue;
        };
        let dir_parts = package_parts(&path);

        let mut changed = false;
        let rewritten: Vec<String> = source
            .split('\n')
            .map(|line| match rewrite_line(line, &dir_parts, &names) {
                Some(new_line) if new_line != line => {
                    changed = true;
                    new_line
                }
                _ => line.to_string(),
            })
            .collect();

        if changed {
            let content = rewritten.join("\n");
            store.write_one(root, &path, &content)?;
            artifacts.insert(&path, content)?;
            debug!(%path, "rewrote imports");
            fixed.push(path);
        }
    }

    info!(fixed = fixed.len(), "import resolution complete");
    Ok(fixed)
}

fn is_unit(path: &str) -> bool {
    path.ends_with(".py")
}

/// Directory components of `path` (everything but the file name).
fn package_parts(path: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = path.split('/').collect();
    parts.pop();
    parts
}

/// Every directory that is an ancestor of at least one unit file, sorted.
fn unit_ancestor_dirs(artifacts: &ArtifactSet) -> BTreeSet<String> {
    let mut dirs = BTreeSet::new();
    for path in artifacts.paths().filter(|p| is_unit(p)) {
        let parts = package_parts(path);
        for depth in 1..=parts.len() {
            dirs.insert(parts[..depth].join("/"));
        }
    }
    dirs
}

// ---------------------------------------------------------------------------
// Name table
// ---------------------------------------------------------------------------

/// Short name → absolute dotted path for every package and module.
struct NameTable(HashMap<String, String>);

impl NameTable {
    fn build(artifacts: &ArtifactSet) -> Self {
        let mut dirs = BTreeSet::new();
        for path in artifacts.paths() {
            let parts = package_parts(path);
            for depth in 1..=parts.len() {
                dirs.insert(parts[..depth].join("/"));
            }
        }

        let mut table = HashMap::new();
        for dir in &dirs {
            let name = dir.rsplit('/').next().unwrap_or(dir);
            table
                .entry(name.to_string())
                .or_insert_with(|| dir.replace('/', "."));
        }

        // Modules shadow packages of the same name.
        for path in artifacts.paths().filter(|p| is_unit(p)) {
            let Some(stem_path) = path.strip_suffix(".py") else {
                continue;
            };
            let stem = stem_path.rsplit('/').next().unwrap_or(stem_path);
            if stem == "__init__" {
                continue;
            }
            table.insert(stem.to_string(), stem_path.replace('/', "."));
        }

        Self(table)
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Line rewriting
// ---------------------------------------------------------------------------

/// The package `levels_up` levels above the file's own package, clamped at
/// the project root.
fn ancestor<'a>(dir_parts: &'a [&'a str], levels_up: usize) -> &'a [&'a str] {
    &dir_parts[..dir_parts.len().saturating_sub(levels_up)]
}

/// Rewritten form of `line`, or `None` when no pattern applies.
fn rewrite_line(line: &str, dir_parts: &[&str], names: &NameTable) -> Option<String> {
    if let Some(caps) = RELATIVE_NAMED.captures(line) {
        let (indent, dots, target, tail) = (&caps[1], &caps[2], &caps[3], &caps[4]);
        let absolute = match names.get(target) {
            Some(known) => known.to_string(),
            None => {
                let mut parts = ancestor(dir_parts, dots.len() - 1).to_vec();
                parts.push(target);
                parts.join(".")
            }
        };
        return Some(format!("{indent}from {absolute}{tail}"));
    }

    if let Some(caps) = RELATIVE_PACKAGE.captures(line) {
        let (indent, dots, imported) = (&caps[1], &caps[2], &caps[3]);
        let base = ancestor(dir_parts, dots.len() - 1);
        // At the root there is no package to name; star and parenthesized
        // imports are left for the reviewer.
        if base.is_empty() || !NAME_LIST.is_match(imported) {
            return None;
        }
        return Some(format!("{indent}from {} import {imported}", base.join(".")));
    }

    if let Some(caps) = BARE_FROM.captures(line) {
        let absolute = names.get(&caps[2])?;
        return Some(format!("{}from {absolute}{}", &caps[1], &caps[3]));
    }

    if let Some(caps) = BARE_IMPORT.captures(line) {
        let name = &caps[2];
        let (package, _) = names.get(name)?.rsplit_once('.')?;
        let alias = caps.get(3).map_or("", |m| m.as_str());
        return Some(format!("{}from {package} import {name}{alias}", &caps[1]));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticValidator;

    fn fixture(files: &[(&str, &str)]) -> (tempfile::TempDir, ArtifactStore, ArtifactSet) {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::default();
        let mut set = ArtifactSet::new();
        for (path, content) in files {
            set.insert(path, *content).unwrap();
        }
        store.save(tmp.path(), &set).unwrap();
        (tmp, store, set)
    }

    #[test]
    fn relative_import_of_known_module_becomes_absolute() {
        let (tmp, store, mut set) = fixture(&[
            ("backend/models.py", "class Item: ...\n"),
            ("backend/api/routes.py", "from .models import Item\n\nroutes = []\n"),
        ]);

        let fixed = resolve_imports(&store, tmp.path(), &mut set).unwrap();
        assert!(fixed.contains(&"backend/api/routes.py".to_string()));
        assert_eq!(
            set.get("backend/api/routes.py").unwrap(),
            "from backend.models import Item\n\nroutes = []\n"
        );

        let on_disk = std::fs::read_to_string(tmp.path().join("backend/api/routes.py")).unwrap();
        assert_eq!(on_disk, set.get("backend/api/routes.py").unwrap());
    }

    #[test]
    fn creates_markers_for_unit_ancestors_only() {
        let (tmp, store, mut set) = fixture(&[
            ("backend/api/routes.py", "x = 1\n"),
            ("frontend/app.js", "let x = 1;\n"),
        ]);

        let fixed = resolve_imports(&store, tmp.path(), &mut set).unwrap();
        assert_eq!(
            fixed,
            vec!["backend/__init__.py".to_string(), "backend/api/__init__.py".to_string()]
        );
        assert_eq!(set.get("backend/__init__.py"), Some(""));
        assert!(tmp.path().join("backend/api/__init__.py").exists());
        assert!(!tmp.path().join("frontend/__init__.py").exists());
    }

    #[test]
    fn existing_marker_on_disk_is_left_alone() {
        let (tmp, store, mut set) = fixture(&[("pkg/mod.py", "x = 1\n")]);
        std::fs::write(tmp.path().join("pkg/__init__.py"), "VERSION = 1\n").unwrap();

        let fixed = resolve_imports(&store, tmp.path(), &mut set).unwrap();
        assert!(fixed.is_empty());
        assert!(!set.contains("pkg/__init__.py"));
    }

    #[test]
    fn unknown_relative_name_is_clamped_at_root() {
        let (tmp, store, mut set) = fixture(&[
            ("backend/__init__.py", ""),
            ("backend/main.py", "from ...config import settings\n"),
        ]);

        resolve_imports(&store, tmp.path(), &mut set).unwrap();
        assert_eq!(set.get("backend/main.py").unwrap(), "from config import settings\n");
    }

    #[test]
    fn package_relative_import_resolves_or_clamps() {
        let (tmp, store, mut set) = fixture(&[
            ("backend/__init__.py", ""),
            ("backend/api/__init__.py", ""),
            ("backend/api/v1.py", "from . import deps\n"),
            ("main.py", "from . import backend\n"),
        ]);

        resolve_imports(&store, tmp.path(), &mut set).unwrap();
        assert_eq!(set.get("backend/api/v1.py").unwrap(), "from backend.api import deps\n");
        assert_eq!(set.get("main.py").unwrap(), "from . import backend\n");
    }

    #[tokio::test]
    async fn package_imports_at_the_root_keep_valid_syntax() {
        let (tmp, store, mut set) = fixture(&[
            ("backend/__init__.py", ""),
            ("backend/main.py", "from .. import *\nx = 1\n"),
            ("app.py", "from . import (routes,\n    models)\n"),
            ("backend/api/__init__.py", ""),
            ("backend/api/v2.py", "from . import *\nfrom . import (a,\n    b)\n"),
        ]);
        let validator = StaticValidator::default();
        assert!(validator.check(tmp.path(), &set).await.is_empty());

        let fixed = resolve_imports(&store, tmp.path(), &mut set).unwrap();
        assert!(fixed.is_empty(), "{fixed:?}");
        assert_eq!(set.get("backend/main.py").unwrap(), "from .. import *\nx = 1\n");
        assert_eq!(set.get("app.py").unwrap(), "from . import (routes,\n    models)\n");
        assert!(validator.check(tmp.path(), &set).await.is_empty());
    }

    #[test]
    fn multi_name_package_import_is_rewritten_whole() {
        let (tmp, store, mut set) = fixture(&[
            ("backend/__init__.py", ""),
            ("backend/api/__init__.py", ""),
            ("backend/api/v1.py", "    from . import deps, auth as a\n"),
        ]);

        resolve_imports(&store, tmp.path(), &mut set).unwrap();
        assert_eq!(
            set.get("backend/api/v1.py").unwrap(),
            "    from backend.api import deps, auth as a\n"
        );
    }

    #[test]
    fn bare_imports_and_indentation() {
        let (tmp, store, mut set) = fixture(&[
            ("backend/__init__.py", ""),
            ("backend/services/__init__.py", ""),
            ("backend/services/billing.py", "def charge(): ...\n"),
            ("backend/database.py", "engine = None\n"),
            (
                "backend/main.py",
                "import os\nimport billing as b\nfrom database import engine\n\ndef run():\n    from billing import charge\n    import json, billing\n",
            ),
        ]);

        resolve_imports(&store, tmp.path(), &mut set).unwrap();
        assert_eq!(
            set.get("backend/main.py").unwrap(),
            "import os\nfrom backend.services import billing as b\nfrom backend.database import engine\n\ndef run():\n    from backend.services.billing import charge\n    import json, billing\n"
        );
    }

    #[test]
    fn modules_shadow_packages_with_the_same_name() {
        let (tmp, store, mut set) = fixture(&[
            ("backend/__init__.py", ""),
            ("backend/models/__init__.py", ""),
            ("backend/models/user.py", "class User: ...\n"),
            ("backend/api/__init__.py", ""),
            ("backend/api/models.py", "class Schema: ...\n"),
            ("backend/app.py", "from models import Schema\n"),
        ]);

        resolve_imports(&store, tmp.path(), &mut set).unwrap();
        assert_eq!(
            set.get("backend/app.py").unwrap(),
            "from backend.api.models import Schema\n"
        );
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let (tmp, store, mut set) = fixture(&[
            ("backend/models.py", "x = 1\n"),
            ("backend/api/routes.py", "from .models import x\n"),
        ]);

        resolve_imports(&store, tmp.path(), &mut set).unwrap();
        let again = resolve_imports(&store, tmp.path(), &mut set).unwrap();
        assert!(again.is_empty());
    }
}
