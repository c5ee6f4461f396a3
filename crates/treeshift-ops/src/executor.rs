//! Change execution, synchronous and on a blocking worker with progress
//! reporting.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use treeshift_core::Workspace;

use crate::OPERATION_CHANNEL_SIZE;
use crate::change::Change;
use crate::error::ChangeError;
use crate::progress::{ApplyComplete, ApplyProgress};

/// Message sent while a change executes.
#[derive(Debug)]
pub enum ApplyResult {
    /// A leaf is about to run.
    Progress(ApplyProgress),
    /// Execution finished.
    Complete(ApplyComplete),
}

/// Validate and perform `change`, returning its inverse.
pub fn perform_change(ws: &mut Workspace, change: &Change) -> Result<Change, ChangeError> {
    let started = Instant::now();
    let undo = change.perform(ws)?;
    info!(
        change = %change.name,
        steps = change.leaves().len(),
        elapsed = ?started.elapsed(),
        "Applied change"
    );
    Ok(undo)
}

/// Start executing `change` on a blocking worker.
///
/// Returns a receiver for progress updates; the last message is always
/// [`ApplyResult::Complete`]. Cancelling the token rolls back the steps
/// performed so far.
pub fn start_apply(
    workspace: Arc<Mutex<Workspace>>,
    change: Change,
    cancel: CancellationToken,
) -> mpsc::Receiver<ApplyResult> {
    let (tx, rx) = mpsc::channel(OPERATION_CHANNEL_SIZE);

    tokio::task::spawn_blocking(move || {
        let started = Instant::now();
        let steps = change.leaves().len();
        let mut progress = ApplyProgress::new(change.name.clone(), steps);

        let result = {
            let mut ws = workspace.lock().unwrap_or_else(PoisonError::into_inner);
            change.perform_observed(&mut ws, &cancel, &mut |leaf, completed, _total| {
                progress.steps_completed = completed;
                progress.current_step = Some(leaf.name.clone());
                let _ = tx.blocking_send(ApplyResult::Progress(progress.clone()));
            })
        };

        let complete = match result {
            Ok(undo) => {
                info!(change = %change.name, steps, "Applied change");
                ApplyComplete {
                    change: change.name.clone(),
                    steps,
                    undo: Some(undo),
                    error: None,
                    elapsed: started.elapsed(),
                }
            }
            Err(e) => {
                warn!(change = %change.name, error = %e, "Change execution failed");
                ApplyComplete {
                    change: change.name.clone(),
                    steps,
                    undo: None,
                    error: Some(e.to_string()),
                    elapsed: started.elapsed(),
                }
            }
        };
        let _ = tx.blocking_send(ApplyResult::Complete(complete));
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::FolderRef;

    fn workspace() -> (Workspace, Change) {
        let mut ws = Workspace::new();
        let app = ws.add_project("app").unwrap();
        let docs = ws.create_folder(app, "docs").unwrap();
        let a = ws.add_file(docs, "a.txt", "a").unwrap();
        let b = ws.add_file(docs, "b.txt", "b").unwrap();
        let change = Change::composite(
            "Reorganize docs",
            vec![
                Change::move_resource(&ws, a, FolderRef::below(app, "notes"), None),
                Change::delete_resource(&ws, b),
            ],
        );
        (ws, change)
    }

    #[tokio::test]
    async fn test_start_apply_reports_progress() {
        let (ws, change) = workspace();
        let ws = Arc::new(Mutex::new(ws));
        let mut rx = start_apply(ws.clone(), change, CancellationToken::new());

        let mut updates = 0;
        let mut complete = None;
        while let Some(result) = rx.recv().await {
            match result {
                ApplyResult::Progress(_) => updates += 1,
                ApplyResult::Complete(c) => complete = Some(c),
            }
        }
        let complete = complete.unwrap();
        assert!(complete.is_success());
        assert_eq!(updates, 2);
        assert!(complete.undo.is_some());

        let ws = ws.lock().unwrap();
        assert!(ws.find_resource("app/notes/a.txt").is_some());
        assert!(ws.find_resource("app/docs/b.txt").is_none());
    }

    #[tokio::test]
    async fn test_cancelled_apply_rolls_back() {
        let (ws, change) = workspace();
        let ws = Arc::new(Mutex::new(ws));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut rx = start_apply(ws.clone(), change, cancel);

        let mut complete = None;
        while let Some(result) = rx.recv().await {
            if let ApplyResult::Complete(c) = result {
                complete = Some(c);
            }
        }
        assert!(!complete.unwrap().is_success());
        let ws = ws.lock().unwrap();
        assert!(ws.find_resource("app/docs/a.txt").is_some());
        assert!(ws.find_resource("app/docs/b.txt").is_some());
    }

    #[test]
    fn test_perform_change_returns_inverse() {
        let (mut ws, change) = workspace();
        let undo = perform_change(&mut ws, &change).unwrap();
        perform_change(&mut ws, &undo).unwrap();
        assert!(ws.find_resource("app/docs/a.txt").is_some());
        assert!(ws.find_resource("app/docs/b.txt").is_some());
    }
}
