//! Error types for loading and writing workspaces.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use treeshift_core::ModelError;

/// Errors that can occur while loading or writing a workspace.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// A project manifest could not be parsed.
    #[error("Invalid manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A manifest could not be serialized.
    #[error("Cannot serialize manifest: {0}")]
    ManifestWrite(#[from] toml::ser::Error),

    /// A manifest entry names something the project does not contain.
    #[error("{manifest}: '{entry}' does not name a {expected}")]
    BadEntry {
        manifest: PathBuf,
        entry: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Error reading a file or directory.
    ReadError,
    /// File is not valid UTF-8 and was loaded without contents.
    Binary,
    /// File could not be written back (no contents to write).
    Skipped,
}

/// Non-fatal problem encountered while loading or writing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub message: String,
    pub kind: WarningKind,
}

impl ScanWarning {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_kinds() {
        let err = ScanError::io("a/b", std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(matches!(err, ScanError::NotFound { .. }));
        assert_eq!(err.to_string(), "Path not found: a/b");

        let err = ScanError::io("a", std::io::Error::other("boom"));
        assert!(matches!(err, ScanError::Io { .. }));
    }
}
