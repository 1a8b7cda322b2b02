//! Versioned artifacts passed between actions.

use crate::utils::{iso_timestamp, sha256_hex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Name of the application source artifact.
pub const APP_CODE: &str = "AppCode";

/// Name of the infrastructure definitions artifact.
pub const INFRA_CODE: &str = "InfraCode";

/// A named, versioned bundle of files.
///
/// The name identifies the artifact within one execution. The version is the
/// source revision the files were taken from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// The artifact name (e.g., "AppCode").
    pub name: String,

    /// The source revision of the content.
    pub version: String,

    /// File contents keyed by relative path.
    #[serde(default)]
    pub files: BTreeMap<String, Vec<u8>>,

    /// Additional metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// When the artifact was created (ISO 8601).
    pub created_at: String,
}

impl Artifact {
    /// Creates an empty artifact.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            files: BTreeMap::new(),
            metadata: HashMap::new(),
            created_at: iso_timestamp(),
        }
    }

    /// Adds a file.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// Replaces all files.
    #[must_use]
    pub fn with_files(mut self, files: BTreeMap<String, Vec<u8>>) -> Self {
        self.files = files;
        self
    }

    /// Adds metadata to the artifact.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns a file's content.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Returns the total size of all files in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// SHA-256 over paths and contents in path order.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let mut buf = Vec::with_capacity(self.size_bytes() + self.files.len() * 16);
        for (path, content) in &self.files {
            buf.extend_from_slice(path.as_bytes());
            buf.push(0);
            buf.extend_from_slice(&(content.len() as u64).to_le_bytes());
            buf.extend_from_slice(content);
        }
        sha256_hex(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_creation() {
        let artifact = Artifact::new(APP_CODE, "abc123")
            .with_file("src/handler.js", "exports.handler = () => {}")
            .with_metadata("branch", "main");

        assert_eq!(artifact.name, "AppCode");
        assert_eq!(artifact.version, "abc123");
        assert_eq!(artifact.files.len(), 1);
        assert_eq!(artifact.metadata.get("branch"), Some(&"main".to_string()));
        assert!(artifact.file("src/handler.js").is_some());
    }

    #[test]
    fn test_content_hash_depends_on_content_not_order() {
        let a = Artifact::new("x", "1").with_file("a", "1").with_file("b", "2");
        let b = Artifact::new("x", "1").with_file("b", "2").with_file("a", "1");
        let c = Artifact::new("x", "1").with_file("a", "1").with_file("b", "3");

        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
        assert_eq!(a.content_hash().len(), 64);
    }

    #[test]
    fn test_path_boundaries_change_hash() {
        let a = Artifact::new("x", "1").with_file("ab", "c");
        let b = Artifact::new("x", "1").with_file("a", "bc");
        assert_ne!(a.content_hash(), b.content_hash());
    }
}
