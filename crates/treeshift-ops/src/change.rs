//! Change trees and their execution.
//!
//! A [`Change`] is a snapshot: leaves record the modification stamps seen at
//! planning time and execution fails fast when the workspace moved on.
//! Performing a change returns its inverse.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use treeshift_core::source::{self, TextEdit};
use treeshift_core::{ModelError, ResourceId, Workspace};

use crate::error::ChangeError;

/// A folder that may not exist yet: `path` is created below `base` on
/// execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRef {
    pub base: ResourceId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

impl FolderRef {
    pub fn existing(folder: ResourceId) -> Self {
        Self {
            base: folder,
            path: String::new(),
        }
    }

    pub fn below(base: ResourceId, path: impl Into<String>) -> Self {
        Self {
            base,
            path: path.into(),
        }
    }

    fn ensure(&self, ws: &mut Workspace, created: &mut Vec<ResourceId>) -> Result<ResourceId, ModelError> {
        ws.ensure_folder_path(self.base, &self.path, created)
    }
}

/// One node of a change tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub name: String,
    pub kind: ChangeKind,
}

/// Change primitives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChangeKind {
    Composite {
        children: Vec<Change>,
    },
    MoveResource {
        resource: ResourceId,
        destination: FolderRef,
        new_name: Option<String>,
        stamp: Option<u64>,
    },
    CopyResource {
        resource: ResourceId,
        destination: FolderRef,
        new_name: Option<String>,
        /// Replacement text of the copy (copied source units).
        contents: Option<String>,
    },
    DeleteResource {
        resource: ResourceId,
        stamp: Option<u64>,
    },
    RestoreResource {
        resource: ResourceId,
    },
    EditText {
        file: ResourceId,
        edits: Vec<TextEdit>,
        stamp: Option<u64>,
    },
    ReplaceText {
        file: ResourceId,
        contents: String,
    },
}

impl Change {
    pub fn composite(name: impl Into<String>, children: Vec<Change>) -> Self {
        Self {
            name: name.into(),
            kind: ChangeKind::Composite { children },
        }
    }

    /// Move a resource, recording its current stamp.
    pub fn move_resource(
        ws: &Workspace,
        resource: ResourceId,
        destination: FolderRef,
        new_name: Option<String>,
    ) -> Self {
        let name = new_name.as_deref().unwrap_or(ws.resource(resource).name.as_str()).to_string();
        Self {
            name: format!("Move '{}' as '{name}'", ws.resource_path(resource).display()),
            kind: ChangeKind::MoveResource {
                resource,
                destination,
                new_name,
                stamp: Some(ws.stamp(resource)),
            },
        }
    }

    pub fn copy_resource(
        ws: &Workspace,
        resource: ResourceId,
        destination: FolderRef,
        new_name: Option<String>,
        contents: Option<String>,
    ) -> Self {
        let name = new_name.as_deref().unwrap_or(ws.resource(resource).name.as_str()).to_string();
        Self {
            name: format!("Copy '{}' as '{name}'", ws.resource_path(resource).display()),
            kind: ChangeKind::CopyResource {
                resource,
                destination,
                new_name,
                contents,
            },
        }
    }

    pub fn delete_resource(ws: &Workspace, resource: ResourceId) -> Self {
        Self {
            name: format!("Delete '{}'", ws.resource_path(resource).display()),
            kind: ChangeKind::DeleteResource {
                resource,
                stamp: Some(ws.stamp(resource)),
            },
        }
    }

    pub fn edit_text(ws: &Workspace, file: ResourceId, edits: Vec<TextEdit>) -> Self {
        Self {
            name: format!("Update '{}'", ws.resource_path(file).display()),
            kind: ChangeKind::EditText {
                file,
                edits,
                stamp: Some(ws.stamp(file)),
            },
        }
    }

    /// True for an empty composite.
    pub fn is_empty(&self) -> bool {
        match &self.kind {
            ChangeKind::Composite { children } => children.iter().all(Change::is_empty),
            _ => false,
        }
    }

    /// Leaves in execution order.
    pub fn leaves(&self) -> Vec<&Change> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, leaves: &mut Vec<&'a Change>) {
        match &self.kind {
            ChangeKind::Composite { children } => {
                for child in children {
                    child.collect_leaves(leaves);
                }
            }
            _ => leaves.push(self),
        }
    }

    /// Resources touched by the change.
    pub fn affected_resources(&self) -> Vec<ResourceId> {
        let mut affected = Vec::new();
        for leaf in self.leaves() {
            let id = match &leaf.kind {
                ChangeKind::MoveResource { resource, .. }
                | ChangeKind::CopyResource { resource, .. }
                | ChangeKind::DeleteResource { resource, .. }
                | ChangeKind::RestoreResource { resource } => *resource,
                ChangeKind::EditText { file, .. } | ChangeKind::ReplaceText { file, .. } => *file,
                ChangeKind::Composite { .. } => continue,
            };
            if !affected.contains(&id) {
                affected.push(id);
            }
        }
        affected
    }

    /// Leaf names, one per line of output.
    pub fn describe(&self) -> Vec<String> {
        self.leaves().iter().map(|l| l.name.clone()).collect()
    }

    /// Check every leaf against the current workspace before anything runs.
    pub fn validate(&self, ws: &Workspace) -> Result<(), ChangeError> {
        for leaf in self.leaves() {
            leaf.validate_leaf(ws)?;
        }
        Ok(())
    }

    fn validate_leaf(&self, ws: &Workspace) -> Result<(), ChangeError> {
        let live = |id: ResourceId| -> Result<(), ChangeError> {
            if ws.resource_exists(id) {
                Ok(())
            } else {
                Err(ChangeError::Missing {
                    path: ws.resource_path(id),
                })
            }
        };
        let fresh = |id: ResourceId, stamp: Option<u64>| -> Result<(), ChangeError> {
            live(id)?;
            match stamp {
                Some(stamp) if ws.stamp(id) != stamp => Err(ChangeError::Stale {
                    path: ws.resource_path(id),
                }),
                _ => Ok(()),
            }
        };

        match &self.kind {
            ChangeKind::Composite { .. } => Ok(()),
            ChangeKind::MoveResource {
                resource,
                destination,
                stamp,
                ..
            } => {
                fresh(*resource, *stamp)?;
                live(destination.base)
            }
            ChangeKind::CopyResource {
                resource,
                destination,
                ..
            } => {
                live(*resource)?;
                live(destination.base)
            }
            ChangeKind::DeleteResource { resource, stamp } => fresh(*resource, *stamp),
            ChangeKind::RestoreResource { resource } => match ws.get_resource(*resource) {
                Some(node) if !node.exists => Ok(()),
                _ => Err(ChangeError::Missing {
                    path: ws.resource_path(*resource),
                }),
            },
            ChangeKind::EditText { file, stamp, .. } => fresh(*file, *stamp),
            ChangeKind::ReplaceText { file, .. } => live(*file),
        }
    }

    /// Validate, then perform every leaf. Returns the undo change.
    pub fn perform(&self, ws: &mut Workspace) -> Result<Change, ChangeError> {
        self.perform_observed(ws, &CancellationToken::new(), &mut |_, _, _| {})
    }

    /// Like [`Change::perform`], reporting each leaf before it runs as
    /// `(leaf, completed, total)`. A failing or cancelled execution rolls
    /// back the leaves already performed.
    pub fn perform_observed(
        &self,
        ws: &mut Workspace,
        cancel: &CancellationToken,
        observer: &mut dyn FnMut(&Change, usize, usize),
    ) -> Result<Change, ChangeError> {
        self.validate(ws)?;

        let leaves = self.leaves();
        let total = leaves.len();
        ws.build(|ws| {
            let mut undos: Vec<Change> = Vec::with_capacity(total);
            for (completed, leaf) in leaves.iter().enumerate() {
                let step = if cancel.is_cancelled() {
                    Err(ChangeError::Cancelled)
                } else {
                    observer(leaf, completed, total);
                    leaf.perform_leaf(ws)
                };
                match step {
                    Ok(undo) => undos.push(undo),
                    Err(e) => {
                        warn!(change = %leaf.name, error = %e, "Rolling back change");
                        rollback(ws, undos);
                        return Err(e);
                    }
                }
            }
            undos.reverse();
            debug!(change = %self.name, steps = total, "Performed change");
            Ok(Change::composite(format!("Undo {}", self.name), undos))
        })
    }

    fn perform_leaf(&self, ws: &mut Workspace) -> Result<Change, ChangeError> {
        let failed = |source: ModelError| ChangeError::Failed {
            name: self.name.clone(),
            source,
        };
        let inverse = |kind: ChangeKind| Change {
            name: format!("Undo {}", self.name),
            kind,
        };

        match &self.kind {
            ChangeKind::Composite { .. } => Ok(Change::composite(self.name.clone(), Vec::new())),
            ChangeKind::MoveResource {
                resource,
                destination,
                new_name,
                ..
            } => {
                let node = ws.resource(*resource);
                let (old_parent, old_name) = (node.parent, node.name.to_string());
                let old_parent = old_parent.ok_or_else(|| ChangeError::Missing {
                    path: ws.resource_path(*resource),
                })?;
                let mut created = Vec::new();
                let target = destination.ensure(ws, &mut created).map_err(failed)?;
                ws.move_resource(*resource, target, new_name.as_deref())
                    .map_err(failed)?;

                let mut children = vec![inverse(ChangeKind::MoveResource {
                    resource: *resource,
                    destination: FolderRef::existing(old_parent),
                    new_name: Some(old_name),
                    stamp: None,
                })];
                children.extend(delete_created(ws, &created));
                Ok(Change::composite(format!("Undo {}", self.name), children))
            }
            ChangeKind::CopyResource {
                resource,
                destination,
                new_name,
                contents,
            } => {
                let mut created = Vec::new();
                let target = destination.ensure(ws, &mut created).map_err(failed)?;
                let copy = ws
                    .copy_resource(*resource, target, new_name.as_deref())
                    .map_err(failed)?;
                if let Some(contents) = contents {
                    ws.set_text(copy, contents.clone()).map_err(failed)?;
                }

                let mut children = vec![inverse(ChangeKind::DeleteResource {
                    resource: copy,
                    stamp: None,
                })];
                children.extend(delete_created(ws, &created));
                Ok(Change::composite(format!("Undo {}", self.name), children))
            }
            ChangeKind::DeleteResource { resource, .. } => {
                ws.delete_resource(*resource).map_err(failed)?;
                Ok(inverse(ChangeKind::RestoreResource {
                    resource: *resource,
                }))
            }
            ChangeKind::RestoreResource { resource } => {
                ws.restore_resource(*resource).map_err(failed)?;
                Ok(inverse(ChangeKind::DeleteResource {
                    resource: *resource,
                    stamp: None,
                }))
            }
            ChangeKind::EditText { file, edits, .. } => {
                let old = ws.resource(*file).contents.clone().unwrap_or_default();
                ws.set_text(*file, source::apply_edits(&old, edits))
                    .map_err(failed)?;
                Ok(inverse(ChangeKind::ReplaceText {
                    file: *file,
                    contents: old,
                }))
            }
            ChangeKind::ReplaceText { file, contents } => {
                let old = ws.resource(*file).contents.clone().unwrap_or_default();
                ws.set_text(*file, contents.clone()).map_err(failed)?;
                Ok(inverse(ChangeKind::ReplaceText {
                    file: *file,
                    contents: old,
                }))
            }
        }
    }
}

/// Undo steps removing folders created on the way to a destination,
/// innermost first.
fn delete_created(ws: &Workspace, created: &[ResourceId]) -> Vec<Change> {
    created
        .iter()
        .rev()
        .map(|id| Change {
            name: format!("Delete '{}'", ws.resource_path(*id).display()),
            kind: ChangeKind::DeleteResource {
                resource: *id,
                stamp: None,
            },
        })
        .collect()
}

fn rollback(ws: &mut Workspace, undos: Vec<Change>) {
    for undo in undos.into_iter().rev() {
        for leaf in undo.leaves() {
            if let Err(e) = leaf.perform_leaf(ws) {
                warn!(change = %leaf.name, error = %e, "Rollback step failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treeshift_core::TextRange;

    fn workspace() -> (Workspace, ResourceId, ResourceId, ResourceId) {
        let mut ws = Workspace::new();
        let app = ws.add_project("app").unwrap();
        let src = ws.create_folder(app, "src").unwrap();
        ws.add_source_root(src, false, vec![]).unwrap();
        let p = ws.add_folders(src, "p").unwrap();
        let a = ws.add_file(p, "A.java", "package p;\nclass A {}\n").unwrap();
        (ws, src, p, a)
    }

    #[test]
    fn test_move_into_new_folder_and_undo() {
        let (mut ws, src, p, a) = workspace();
        let change = Change::composite(
            "Move",
            vec![Change::move_resource(&ws, a, FolderRef::below(src, "q/r"), None)],
        );

        let undo = change.perform(&mut ws).unwrap();
        assert!(ws.find_resource("app/src/q/r/A.java").is_some());
        assert!(ws.namespace_for_folder(ws.find_resource("app/src/q/r").unwrap()).is_some());

        undo.perform(&mut ws).unwrap();
        assert_eq!(ws.resource(a).parent, Some(p));
        assert!(ws.find_resource("app/src/q").is_none());
    }

    #[test]
    fn test_stale_change_fails_fast() {
        let (mut ws, src, _, a) = workspace();
        let change = Change::composite(
            "Edit then move",
            vec![
                Change::edit_text(&ws, a, vec![TextEdit::insert(0, "// x\n")]),
                Change::move_resource(&ws, a, FolderRef::existing(src), None),
            ],
        );
        ws.set_text(a, "package p;\nclass A { }\n").unwrap();

        let err = change.perform(&mut ws).unwrap_err();
        assert!(matches!(err, ChangeError::Stale { .. }));
        // Nothing was applied.
        assert_eq!(
            ws.resource(a).contents.as_deref(),
            Some("package p;\nclass A { }\n")
        );
    }

    #[test]
    fn test_failure_rolls_back() {
        let (mut ws, src, p, a) = workspace();
        ws.add_file(src, "A.java", "class A {}").unwrap();
        let change = Change::composite(
            "Edit then collide",
            vec![
                Change::edit_text(&ws, a, vec![TextEdit::replace(TextRange::new(8, 1), "q")]),
                Change::move_resource(&ws, a, FolderRef::existing(src), None),
            ],
        );

        let err = change.perform(&mut ws).unwrap_err();
        assert!(matches!(err, ChangeError::Failed { .. }));
        assert_eq!(ws.resource(a).parent, Some(p));
        assert_eq!(ws.resource(a).contents.as_deref(), Some("package p;\nclass A {}\n"));
    }

    #[test]
    fn test_delete_copy_and_cancel() {
        let (mut ws, src, _, a) = workspace();
        let change = Change::composite(
            "Copy and delete",
            vec![
                Change::copy_resource(&ws, a, FolderRef::existing(src), Some("B.java".into()), None),
                Change::delete_resource(&ws, a),
            ],
        );
        assert_eq!(change.affected_resources(), vec![a]);
        assert_eq!(change.describe().len(), 2);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = change
            .perform_observed(&mut ws, &cancel, &mut |_, _, _| {})
            .unwrap_err();
        assert!(matches!(err, ChangeError::Cancelled));
        assert!(ws.resource_exists(a));

        let mut steps = Vec::new();
        let undo = change
            .perform_observed(&mut ws, &CancellationToken::new(), &mut |leaf, done, total| {
                steps.push((leaf.name.clone(), done, total))
            })
            .unwrap();
        assert_eq!(steps.len(), 2);
        assert!(!ws.resource_exists(a));
        assert!(ws.find_resource("app/src/B.java").is_some());

        undo.perform(&mut ws).unwrap();
        assert!(ws.resource_exists(a));
        assert!(ws.find_resource("app/src/B.java").is_none());
    }
}
