//! Error types for workspace model operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::node::{ResourceId, SymbolId};

/// Errors raised by the workspace model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The id does not name a node of this workspace.
    #[error("Unknown resource {0:?}")]
    UnknownResource(ResourceId),

    /// The id does not name a node of this workspace.
    #[error("Unknown symbol {0:?}")]
    UnknownSymbol(SymbolId),

    /// The resource was deleted.
    #[error("Resource does not exist: {path}")]
    Missing { path: PathBuf },

    /// A sibling with the same name already exists.
    #[error("'{name}' already exists in {parent}")]
    NameCollision { parent: PathBuf, name: String },

    /// The operation needs a container (folder or project).
    #[error("Not a container: {path}")]
    NotAContainer { path: PathBuf },

    /// The operation needs a file.
    #[error("Not a file: {path}")]
    NotAFile { path: PathBuf },

    /// A resource cannot be moved or copied into its own subtree.
    #[error("Cannot move or copy {path} into itself")]
    IntoItself { path: PathBuf },

    /// Roots and projects cannot be moved or copied.
    #[error("Cannot move or copy {path}")]
    Immovable { path: PathBuf },

    /// Invalid name for a new resource.
    #[error("Invalid name: '{name}'")]
    InvalidName { name: String },

    /// Malformed element handle.
    #[error("Invalid element handle: '{handle}'")]
    InvalidHandle { handle: String },

    /// A handle names no live element.
    #[error("No element matches '{handle}'")]
    Unresolved { handle: String },

    /// Invalid glob pattern in configuration.
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl ModelError {
    /// Create an invalid pattern error from a glob error.
    pub fn pattern(pattern: impl Into<String>, source: &globset::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: source.kind().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_messages() {
        let err = ModelError::NameCollision {
            parent: PathBuf::from("proj/src/p"),
            name: "A.java".to_string(),
        };
        assert_eq!(err.to_string(), "'A.java' already exists in proj/src/p");
    }

    #[test]
    fn test_pattern_error() {
        let glob_err = globset::Glob::new("a[").unwrap_err();
        let err = ModelError::pattern("a[", &glob_err);
        assert!(matches!(err, ModelError::InvalidPattern { .. }));
        assert!(err.to_string().starts_with("Invalid pattern 'a['"));
    }
}
