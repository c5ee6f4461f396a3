//! Per-project manifest (`treeshift.toml`).
//!
//! ```toml
//! closed = false
//! linked = ["shared"]
//! read_only = ["generated"]
//! archives = ["base/lib/base.jar"]
//!
//! [[source_roots]]
//! path = "src"
//! exclude = ["legacy"]
//!
//! [[source_roots]]
//! path = "lib/util.jar"
//! archive = true
//! ```
//!
//! Paths are relative to the project, except `archives`, which are relative
//! to the workspace root so that archives of other projects can be named.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// A source root declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRootEntry {
    pub path: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub archive: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl SourceRootEntry {
    pub fn folder(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            archive: false,
            exclude: Vec::new(),
        }
    }
}

/// Contents of a project manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectManifest {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub closed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub read_only: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub archives: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_roots: Vec<SourceRootEntry>,
}

impl ProjectManifest {
    /// Parse a manifest; `path` is only used in errors.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ScanError> {
        toml::from_str(text).map_err(|source| ScanError::Manifest {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml(&self) -> Result<String, ScanError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Manifest used for projects without one: `src` is the only source
    /// root when it exists.
    pub fn implicit(has_src: bool) -> Self {
        Self {
            source_roots: if has_src {
                vec![SourceRootEntry::folder("src")]
            } else {
                Vec::new()
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest() {
        let text = r#"
linked = ["shared"]
archives = ["base/lib/base.jar"]

[[source_roots]]
path = "src"
exclude = ["legacy"]

[[source_roots]]
path = "lib/util.jar"
archive = true
"#;
        let manifest = ProjectManifest::parse(text, Path::new("app/treeshift.toml")).unwrap();
        assert!(!manifest.closed);
        assert_eq!(manifest.linked, vec!["shared"]);
        assert_eq!(manifest.source_roots.len(), 2);
        assert_eq!(manifest.source_roots[0].exclude, vec!["legacy"]);
        assert!(manifest.source_roots[1].archive);
    }

    #[test]
    fn test_invalid_manifest_names_the_file() {
        let err = ProjectManifest::parse("source_roots = 3", Path::new("app/treeshift.toml")).unwrap_err();
        assert!(err.to_string().starts_with("Invalid manifest app/treeshift.toml"));
    }

    #[test]
    fn test_to_toml_skips_defaults() {
        let manifest = ProjectManifest::implicit(true);
        let text = manifest.to_toml().unwrap();
        assert!(!text.contains("closed"));
        assert_eq!(ProjectManifest::parse(&text, Path::new("m")).unwrap(), manifest);
    }
}
