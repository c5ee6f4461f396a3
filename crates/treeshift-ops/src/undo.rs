//! Undo log of executed changes.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use treeshift_core::Workspace;

use crate::change::Change;
use crate::error::ChangeError;

/// An entry in the undo log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoEntry {
    /// Unique ID for this entry.
    pub id: u64,
    /// When the change was executed.
    pub timestamp: DateTime<Utc>,
    /// Name of the executed change.
    pub description: String,
    /// Inverse of the executed change.
    pub undo: Change,
}

/// Undo log with configurable maximum depth.
#[derive(Debug)]
pub struct UndoLog {
    entries: VecDeque<UndoEntry>,
    max_entries: usize,
    next_id: u64,
}

impl Default for UndoLog {
    fn default() -> Self {
        Self::new(100)
    }
}

impl UndoLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries.min(1000)),
            max_entries,
            next_id: 0,
        }
    }

    /// Record the inverse of an executed change. Returns the entry id.
    pub fn record(&mut self, description: impl Into<String>, undo: Change) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        if self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(UndoEntry {
            id,
            timestamp: Utc::now(),
            description: description.into(),
            undo,
        });
        id
    }

    pub fn latest(&self) -> Option<&UndoEntry> {
        self.entries.back()
    }

    pub fn pop(&mut self) -> Option<UndoEntry> {
        self.entries.pop_back()
    }

    /// Revert the most recent change. The entry stays in the log when the
    /// inverse cannot be performed.
    pub fn undo_last(&mut self, ws: &mut Workspace) -> Result<Option<UndoEntry>, ChangeError> {
        let Some(entry) = self.entries.back() else {
            return Ok(None);
        };
        entry.undo.perform(ws)?;
        info!(change = %entry.description, "Reverted change");
        Ok(self.entries.pop_back())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &UndoEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::FolderRef;

    #[test]
    fn test_undo_log_max_entries() {
        let mut log = UndoLog::new(3);
        for i in 0..4 {
            log.record(format!("change {i}"), Change::composite("noop", Vec::new()));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.iter().next().unwrap().id, 1);
        assert_eq!(log.pop().unwrap().description, "change 3");
    }

    #[test]
    fn test_undo_last_restores_workspace() {
        let mut ws = Workspace::new();
        let app = ws.add_project("app").unwrap();
        let docs = ws.create_folder(app, "docs").unwrap();
        let readme = ws.add_file(docs, "README", "hi").unwrap();

        let change = Change::move_resource(&ws, readme, FolderRef::below(app, "notes"), None);
        let undo = change.perform(&mut ws).unwrap();
        assert!(ws.find_resource("app/notes/README").is_some());

        let mut log = UndoLog::default();
        log.record(change.name.clone(), undo);
        let entry = log.undo_last(&mut ws).unwrap().unwrap();
        assert!(entry.description.starts_with("Move"));
        assert!(ws.find_resource("app/docs/README").is_some());
        assert!(ws.find_resource("app/notes/README").is_none());
        assert!(log.is_empty());
        assert!(log.undo_last(&mut ws).unwrap().is_none());
    }
}
