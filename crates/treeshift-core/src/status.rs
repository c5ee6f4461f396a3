//! Graded validation results.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::node::Element;

/// Severity of a status entry. Ordered from harmless to blocking.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    #[default]
    Ok,
    Info,
    Warning,
    Error,
    Fatal,
}

/// One finding of a validation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub severity: Severity,
    pub message: String,
    pub element: Option<Element>,
}

/// Accumulated result of validation steps.
///
/// Only [`Severity::Fatal`] blocks an operation; everything below is surfaced
/// to the caller and processing continues.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefactoringStatus {
    entries: Vec<StatusEntry>,
}

impl RefactoringStatus {
    /// An empty (OK) status.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::with_entry(Severity::Fatal, message, None)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_entry(Severity::Error, message, None)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_entry(Severity::Warning, message, None)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::with_entry(Severity::Info, message, None)
    }

    fn with_entry(severity: Severity, message: impl Into<String>, element: Option<Element>) -> Self {
        let mut status = Self::new();
        status.add(severity, message, element);
        status
    }

    /// Add an entry.
    pub fn add(&mut self, severity: Severity, message: impl Into<String>, element: Option<Element>) {
        self.entries.push(StatusEntry {
            severity,
            message: message.into(),
            element,
        });
    }

    pub fn add_fatal(&mut self, message: impl Into<String>) {
        self.add(Severity::Fatal, message, None);
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.add(Severity::Error, message, None);
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.add(Severity::Warning, message, None);
    }

    pub fn add_info(&mut self, message: impl Into<String>) {
        self.add(Severity::Info, message, None);
    }

    /// Append all entries of another status.
    pub fn merge(&mut self, other: RefactoringStatus) {
        self.entries.extend(other.entries);
    }

    /// Highest severity among the entries.
    pub fn severity(&self) -> Severity {
        self.entries
            .iter()
            .map(|e| e.severity)
            .max()
            .unwrap_or_default()
    }

    pub fn is_ok(&self) -> bool {
        self.severity() == Severity::Ok
    }

    pub fn has_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// True when at least one entry reaches `severity`.
    pub fn has_entry_at_least(&self, severity: Severity) -> bool {
        self.severity() >= severity
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    /// Message of the most severe entry.
    pub fn message(&self) -> Option<&str> {
        let severity = self.severity();
        self.entries
            .iter()
            .find(|e| e.severity == severity)
            .map(|e| e.message.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_severity_is_maximum() {
        let mut status = RefactoringStatus::new();
        assert!(status.is_ok());

        status.add_info("fyi");
        status.add_warning("careful");
        assert_eq!(status.severity(), Severity::Warning);
        assert!(!status.has_fatal());

        status.merge(RefactoringStatus::fatal("stop"));
        assert!(status.has_fatal());
        assert_eq!(status.message(), Some("stop"));
        assert_eq!(status.entries().len(), 3);
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Warning.to_string(), "warning");
        assert!(Severity::Error < Severity::Fatal);
    }
}
