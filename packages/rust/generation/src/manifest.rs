//! Planning replies sometimes nest the file tree by directory; fold it flat.

use serde_json::Value;
use tracing::warn;

use mvpfactory_shared::{FileManifest, normalize_path};

/// Flatten a (possibly nested) `file_tree` value into path → purpose.
///
/// Nested objects contribute their keys as directory prefixes. Keys ending
/// in `/` are directories and never become entries. Non-string leaves and
/// paths that fail normalization are dropped.
pub fn flatten_manifest(tree: &Value) -> FileManifest {
    let mut manifest = FileManifest::new();
    if let Value::Object(map) = tree {
        for (key, value) in map {
            collect(key, value, &mut manifest);
        }
    }
    manifest
}

fn collect(path: &str, value: &Value, out: &mut FileManifest) {
    match value {
        Value::Object(children) => {
            let prefix = path.trim_end_matches('/');
            for (key, child) in children {
                collect(&format!("{prefix}/{key}"), child, out);
            }
        }
        Value::String(purpose) if !path.ends_with('/') => match normalize_path(path) {
            Ok(normalized) => {
                out.insert(normalized, purpose.clone());
            }
            Err(e) => warn!(%path, error = %e, "dropping manifest entry"),
        },
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_tree_passes_through_in_order() {
        let tree = json!({
            "index.html": "entry page",
            "src/game.js": "game loop",
            "src/utils/vector2.js": "math"
        });
        let manifest = flatten_manifest(&tree);
        let keys: Vec<&str> = manifest.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["index.html", "src/game.js", "src/utils/vector2.js"]);
    }

    #[test]
    fn nested_tree_is_flattened() {
        let tree = json!({
            "backend/": {
                "main.py": "app entry",
                "api": { "routes.py": "routes" }
            },
            "requirements.txt": "deps"
        });
        let manifest = flatten_manifest(&tree);
        assert_eq!(manifest.get("backend/main.py").unwrap(), "app entry");
        assert_eq!(manifest.get("backend/api/routes.py").unwrap(), "routes");
        assert!(manifest.contains_key("requirements.txt"));
        assert_eq!(manifest.len(), 3);
    }

    #[test]
    fn directory_keys_and_bad_paths_are_dropped() {
        let tree = json!({
            "static/": "assets folder",
            "../escape.py": "nope",
            "notes": 42,
            "app.py": "entry"
        });
        let manifest = flatten_manifest(&tree);
        assert_eq!(manifest.len(), 1);
        assert!(manifest.contains_key("app.py"));
    }
}
