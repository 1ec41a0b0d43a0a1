//! In-memory artifact mapping: normalized relative path → text content.
//!
//! Persistence (directory walk, writes) lives in `mvpfactory-artifacts`;
//! this type only owns the mapping and its path invariant so that it can be
//! embedded in [`crate::ProjectState`] and serialized into checkpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{FactoryError, Result};

/// Path → content mapping for every generated file of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactSet(BTreeMap<String, String>);

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an entry. The path is normalized first.
    pub fn insert(&mut self, path: &str, content: impl Into<String>) -> Result<String> {
        let key = normalize_path(path)?;
        self.0.insert(key.clone(), content.into());
        Ok(key)
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.0.remove(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `(path, content)` pairs in sorted path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overlay every entry of `other` onto this set.
    pub fn merge(&mut self, other: ArtifactSet) {
        self.0.extend(other.0);
    }

    /// SHA-256 over all `(path, content)` pairs in sorted order.
    ///
    /// Each field is length-prefixed so that moving bytes between a path and
    /// its content changes the digest.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (path, content) in &self.0 {
            hasher.update((path.len() as u64).to_le_bytes());
            hasher.update(path.as_bytes());
            hasher.update((content.len() as u64).to_le_bytes());
            hasher.update(content.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

impl FromIterator<(String, String)> for ArtifactSet {
    /// Collect already-normalized pairs. Entries with invalid paths are dropped.
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (path, content) in iter {
            if let Err(e) = set.insert(&path, content) {
                tracing::warn!(%path, error = %e, "dropping artifact with invalid path");
            }
        }
        set
    }
}

/// Normalize a relative artifact path.
///
/// Backslashes become forward slashes, a leading drive letter and leading
/// `./` or `/` are stripped, and empty or `.` segments are collapsed.
/// Paths that are empty or climb out of the project root (`..`) are rejected.
pub fn normalize_path(raw: &str) -> Result<String> {
    let mut path = raw.trim().replace('\\', "/");

    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        path = path[2..].to_string();
    }

    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(FactoryError::validation(format!(
                    "artifact path escapes the project root: {raw}"
                )));
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(FactoryError::validation(format!(
            "artifact path is empty: {raw:?}"
        )));
    }

    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_handles_separators_and_drive_letters() {
        assert_eq!(normalize_path("backend\\api\\main.py").unwrap(), "backend/api/main.py");
        assert_eq!(normalize_path("C:\\proj\\index.html").unwrap(), "proj/index.html");
        assert_eq!(normalize_path("./src//game.js").unwrap(), "src/game.js");
        assert_eq!(normalize_path("/static/app.css").unwrap(), "static/app.css");
    }

    #[test]
    fn normalize_rejects_escapes_and_empty() {
        assert!(normalize_path("../etc/passwd").is_err());
        assert!(normalize_path("src/../../x.py").is_err());
        assert!(normalize_path("  ").is_err());
        assert!(normalize_path("./").is_err());
    }

    #[test]
    fn insert_normalizes_keys() {
        let mut set = ArtifactSet::new();
        let key = set.insert("backend\\models.py", "x = 1").unwrap();
        assert_eq!(key, "backend/models.py");
        assert_eq!(set.get("backend/models.py"), Some("x = 1"));
        assert!(!set.contains("backend\\models.py"));
    }

    #[test]
    fn digest_is_order_independent_and_content_sensitive() {
        let mut a = ArtifactSet::new();
        a.insert("a.py", "1").unwrap();
        a.insert("b.py", "2").unwrap();

        let mut b = ArtifactSet::new();
        b.insert("b.py", "2").unwrap();
        b.insert("a.py", "1").unwrap();
        assert_eq!(a.digest(), b.digest());

        b.insert("b.py", "3").unwrap();
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn serializes_as_plain_map() {
        let mut set = ArtifactSet::new();
        set.insert("index.html", "<html></html>").unwrap();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"{"index.html":"<html></html>"}"#);
    }
}
