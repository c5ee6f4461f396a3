//! Reorganization and scan configuration types.

use std::path::PathBuf;

use derive_builder::Builder;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Configuration for move, copy and delete operations.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ReorgConfig {
    /// Rewrite imports and qualified references when moving source units.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub update_references: bool,

    /// Rewrite fully qualified type names in non-source files and string
    /// literals.
    #[builder(default = "false")]
    #[serde(default)]
    pub update_qualified_names: bool,

    /// Files searched for qualified names (glob syntax, matched on file name).
    #[builder(default = "default_qualified_name_patterns()")]
    #[serde(default = "default_qualified_name_patterns")]
    pub qualified_name_patterns: Vec<String>,

    /// Deleting a namespace also deletes its sub-namespaces.
    #[builder(default = "false")]
    #[serde(default)]
    pub delete_sub_namespaces: bool,

    /// Offer to delete getters and setters of deleted fields.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub suggest_accessor_deletion: bool,

    /// Extension of source-unit files (without the dot).
    #[builder(default = "default_source_extension()")]
    #[serde(default = "default_source_extension")]
    pub source_extension: String,

    /// Extensions of archive files that other projects may reference.
    #[builder(default = "default_archive_extensions()")]
    #[serde(default = "default_archive_extensions")]
    pub archive_extensions: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_source_extension() -> String {
    "java".to_string()
}

fn default_archive_extensions() -> Vec<String> {
    vec!["jar".to_string(), "zip".to_string()]
}

fn default_qualified_name_patterns() -> Vec<String> {
    vec![
        "*.xml".to_string(),
        "*.properties".to_string(),
        "*.MF".to_string(),
    ]
}

impl ReorgConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref ext) = self.source_extension {
            if ext.is_empty() || ext.contains('.') {
                return Err(format!("Invalid source extension: '{ext}'"));
            }
        }
        if let Some(ref patterns) = self.qualified_name_patterns {
            for pattern in patterns {
                Glob::new(pattern).map_err(|e| format!("Invalid pattern '{pattern}': {e}"))?;
            }
        }
        Ok(())
    }
}

impl ReorgConfig {
    /// Create a new config builder.
    pub fn builder() -> ReorgConfigBuilder {
        ReorgConfigBuilder::default()
    }

    /// Check whether a file name has one of the archive extensions.
    pub fn is_archive_name(&self, name: &str) -> bool {
        name.rsplit_once('.')
            .is_some_and(|(_, ext)| self.archive_extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)))
    }

    /// Compile the qualified-name file patterns.
    pub fn qualified_name_matcher(&self) -> Result<GlobSet, ModelError> {
        build_glob_set(&self.qualified_name_patterns)
    }
}

impl Default for ReorgConfig {
    fn default() -> Self {
        Self {
            update_references: true,
            update_qualified_names: false,
            qualified_name_patterns: default_qualified_name_patterns(),
            delete_sub_namespaces: false,
            suggest_accessor_deletion: true,
            source_extension: default_source_extension(),
            archive_extensions: default_archive_extensions(),
        }
    }
}

/// Configuration for loading a workspace from disk.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Workspace root; every sub-directory is a project.
    pub root: PathBuf,

    /// Name of the per-project manifest file.
    #[builder(default = "default_manifest_name()")]
    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,

    /// Extension of source-unit files (without the dot).
    #[builder(default = "default_source_extension()")]
    #[serde(default = "default_source_extension")]
    pub source_extension: String,

    /// Patterns to ignore (glob syntax, matched on entry name).
    #[builder(default = "default_ignore_patterns()")]
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// Include hidden files (starting with .).
    #[builder(default = "false")]
    #[serde(default)]
    pub include_hidden: bool,

    /// Number of threads for reading files (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,
}

fn default_manifest_name() -> String {
    "treeshift.toml".to_string()
}

fn default_ignore_patterns() -> Vec<String> {
    vec!["target".to_string(), "node_modules".to_string()]
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        } else {
            return Err("Root path is required".to_string());
        }
        if let Some(ref patterns) = self.ignore_patterns {
            for pattern in patterns {
                Glob::new(pattern).map_err(|e| format!("Invalid pattern '{pattern}': {e}"))?;
            }
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a simple config for loading a workspace root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest_name: default_manifest_name(),
            source_extension: default_source_extension(),
            ignore_patterns: default_ignore_patterns(),
            include_hidden: false,
            threads: 0,
        }
    }

    /// Compile the ignore patterns.
    pub fn ignore_matcher(&self) -> Result<GlobSet, ModelError> {
        build_glob_set(&self.ignore_patterns)
    }

    /// Check if hidden files should be skipped.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.include_hidden && name.starts_with('.')
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Compile a list of glob patterns into one matcher.
pub fn build_glob_set(patterns: &[String]) -> Result<GlobSet, ModelError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).map_err(|e| ModelError::pattern(pattern, &e))?);
    }
    builder.build().map_err(|e| ModelError::InvalidConfig {
        message: e.to_string(),
    })
}
