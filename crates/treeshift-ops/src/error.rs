//! Error types for reorganization planning and change execution.

use std::path::PathBuf;

use thiserror::Error;
use treeshift_core::ModelError;

/// Reasons a selection cannot be reorganized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotApplicable {
    #[error("Nothing to reorganize")]
    Empty,

    #[error("Selection contains an element that does not exist")]
    MissingElement,

    #[error("Selected elements do not share a common parent")]
    NoCommonParent,

    #[error("Selection mixes elements that cannot be reorganized together")]
    Mixed,

    #[error("Selection contains elements without editable source")]
    Binary,
}

/// Errors raised while executing a change.
#[derive(Debug, Error)]
pub enum ChangeError {
    /// The element was modified after the change was created.
    #[error("{path} was modified after the change was created")]
    Stale { path: PathBuf },

    /// The element no longer exists (or exists when it should not).
    #[error("{path} is not in the expected state")]
    Missing { path: PathBuf },

    /// A workspace mutation failed.
    #[error("'{name}' failed: {source}")]
    Failed {
        name: String,
        #[source]
        source: ModelError,
    },

    /// Execution was cancelled; performed steps were rolled back.
    #[error("Change execution cancelled")]
    Cancelled,
}

/// Errors of the reorganization engine.
///
/// Validation problems are not errors: they are reported through
/// [`treeshift_core::RefactoringStatus`].
#[derive(Debug, Error)]
pub enum ReorgError {
    /// A blocking confirmation was declined or the cancellation token fired.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation unavailable: {0}")]
    NotApplicable(#[from] NotApplicable),

    /// The workspace changed between planning and execution.
    #[error("Workspace changed: {0}")]
    Stale(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Change(#[from] ChangeError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid descriptor: {0}")]
    Descriptor(#[from] serde_json::Error),
}

impl ReorgError {
    /// Cancellation is an abort, not a failure to report.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Change(ChangeError::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_applicable_converts() {
        let err: ReorgError = NotApplicable::NoCommonParent.into();
        assert_eq!(
            err.to_string(),
            "Operation unavailable: Selected elements do not share a common parent"
        );
        assert!(!err.is_cancelled());
        assert!(ReorgError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_change_error_message() {
        let err = ChangeError::Stale {
            path: PathBuf::from("app/src/p/A.java"),
        };
        assert_eq!(
            err.to_string(),
            "app/src/p/A.java was modified after the change was created"
        );
    }
}
