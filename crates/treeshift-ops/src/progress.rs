//! Progress reporting types for change execution.

use std::time::Duration;

use serde::Serialize;

use crate::change::Change;

/// Progress information for a running change.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyProgress {
    /// Name of the change being executed.
    pub change: String,
    /// Leaf changes performed so far.
    pub steps_completed: usize,
    /// Total number of leaf changes.
    pub steps_total: usize,
    /// The leaf about to run.
    pub current_step: Option<String>,
}

impl ApplyProgress {
    pub fn new(change: impl Into<String>, steps_total: usize) -> Self {
        Self {
            change: change.into(),
            steps_completed: 0,
            steps_total,
            current_step: None,
        }
    }

    /// Get the progress as a percentage (0.0 to 100.0).
    pub fn percentage(&self) -> f64 {
        if self.steps_total > 0 {
            (self.steps_completed as f64 / self.steps_total as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn is_done(&self) -> bool {
        self.steps_completed >= self.steps_total
    }
}

/// Result of a finished execution.
#[derive(Debug, Clone)]
pub struct ApplyComplete {
    pub change: String,
    pub steps: usize,
    /// The inverse change, present when execution succeeded.
    pub undo: Option<Change>,
    /// Error message of a failed or cancelled execution. Performed steps
    /// were rolled back.
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl ApplyComplete {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Get a human-readable summary of the execution.
    pub fn summary(&self) -> String {
        match &self.error {
            None => format!(
                "{}: {} step(s) in {:.2?}",
                self.change, self.steps, self.elapsed
            ),
            Some(error) => format!("{} rolled back: {error}", self.change),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        let mut progress = ApplyProgress::new("Move", 4);
        assert_eq!(progress.percentage(), 0.0);
        progress.steps_completed = 1;
        assert_eq!(progress.percentage(), 25.0);
        assert!(!progress.is_done());

        assert_eq!(ApplyProgress::new("Empty", 0).percentage(), 0.0);
    }

    #[test]
    fn test_summary() {
        let complete = ApplyComplete {
            change: "Delete elements".into(),
            steps: 2,
            undo: None,
            error: Some("Change execution cancelled".into()),
            elapsed: Duration::from_millis(3),
        };
        assert!(!complete.is_success());
        assert_eq!(
            complete.summary(),
            "Delete elements rolled back: Change execution cancelled"
        );
    }
}
