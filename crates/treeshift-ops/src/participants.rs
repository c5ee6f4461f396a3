//! Structural deltas, delta consumers and pluggable participants.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use treeshift_core::{Element, RefactoringStatus, Workspace};

use crate::change::{Change, ChangeKind, FolderRef};
use crate::replay::DescriptorOperation;

/// What happens to one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeltaKind {
    Added,
    Removed,
    Changed,
}

/// One entry of a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaEntry {
    pub path: PathBuf,
    pub kind: DeltaKind,
    /// Source path of a moved resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moved_from: Option<PathBuf>,
}

/// Pending structural changes, per workspace path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDelta {
    entries: IndexMap<PathBuf, DeltaEntry>,
}

impl ResourceDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_added(&mut self, path: impl Into<PathBuf>) {
        self.mark(path.into(), DeltaKind::Added, None);
    }

    pub fn mark_removed(&mut self, path: impl Into<PathBuf>) {
        self.mark(path.into(), DeltaKind::Removed, None);
    }

    pub fn mark_changed(&mut self, path: impl Into<PathBuf>) {
        self.mark(path.into(), DeltaKind::Changed, None);
    }

    pub fn mark_moved(&mut self, from: impl Into<PathBuf>, to: impl Into<PathBuf>) {
        let from = from.into();
        self.mark(from.clone(), DeltaKind::Removed, None);
        self.mark(to.into(), DeltaKind::Added, Some(from));
    }

    fn mark(&mut self, path: PathBuf, kind: DeltaKind, moved_from: Option<PathBuf>) {
        let kind = match (self.entries.get(&path).map(|e| e.kind), kind) {
            // A change never hides an addition or removal.
            (Some(previous @ (DeltaKind::Added | DeltaKind::Removed)), DeltaKind::Changed) => previous,
            (Some(DeltaKind::Removed), DeltaKind::Added) => DeltaKind::Changed,
            (_, kind) => kind,
        };
        self.entries.insert(
            path.clone(),
            DeltaEntry {
                path,
                kind,
                moved_from,
            },
        );
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<DeltaKind> {
        self.entries.get(path.as_ref()).map(|e| e.kind)
    }

    pub fn entries(&self) -> impl Iterator<Item = &DeltaEntry> {
        self.entries.values()
    }

    /// Paths of the given kind.
    pub fn paths(&self, kind: DeltaKind) -> Vec<&Path> {
        self.entries
            .values()
            .filter(|e| e.kind == kind)
            .map(|e| e.path.as_path())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Describe what executing `change` on `ws` would do.
    pub fn from_change(ws: &Workspace, change: &Change) -> Self {
        let target = |destination: &FolderRef, name: &str| -> PathBuf {
            let mut path = ws.resource_path(destination.base);
            path.extend(destination.path.split('/').filter(|s| !s.is_empty()));
            path.push(name);
            path
        };

        let mut delta = Self::new();
        for leaf in change.leaves() {
            match &leaf.kind {
                ChangeKind::MoveResource {
                    resource,
                    destination,
                    new_name,
                    ..
                } => {
                    let name = new_name.as_deref().unwrap_or(ws.resource(*resource).name.as_str());
                    delta.mark_moved(ws.resource_path(*resource), target(destination, name));
                }
                ChangeKind::CopyResource {
                    resource,
                    destination,
                    new_name,
                    ..
                } => {
                    let name = new_name.as_deref().unwrap_or(ws.resource(*resource).name.as_str());
                    delta.mark_added(target(destination, name));
                }
                ChangeKind::DeleteResource { resource, .. } => {
                    delta.mark_removed(ws.resource_path(*resource));
                }
                ChangeKind::RestoreResource { resource } => {
                    delta.mark_added(ws.resource_path(*resource));
                }
                ChangeKind::EditText { file, .. } | ChangeKind::ReplaceText { file, .. } => {
                    delta.mark_changed(ws.resource_path(*file));
                }
                ChangeKind::Composite { .. } => {}
            }
        }
        delta
    }
}

/// Subsystem that may object to a pending delta.
pub trait DeltaConsumer {
    fn check(&self, ws: &Workspace, delta: &ResourceDelta) -> RefactoringStatus;
}

/// Warns when a project manifest would be moved or removed.
#[derive(Debug, Clone)]
pub struct ManifestGuard {
    pub manifest_name: String,
}

impl ManifestGuard {
    pub fn new(manifest_name: impl Into<String>) -> Self {
        Self {
            manifest_name: manifest_name.into(),
        }
    }
}

impl DeltaConsumer for ManifestGuard {
    fn check(&self, _ws: &Workspace, delta: &ResourceDelta) -> RefactoringStatus {
        let mut status = RefactoringStatus::new();
        for path in delta.paths(DeltaKind::Removed) {
            if path.file_name().is_some_and(|n| n == self.manifest_name.as_str()) {
                status.add_warning(format!(
                    "Project manifest '{}' is moved or deleted",
                    path.display()
                ));
            }
        }
        status
    }
}

/// Arguments handed to participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorgArguments {
    pub operation: DescriptorOperation,
    pub destination: Option<Element>,
    pub update_references: bool,
}

/// External observer of a pending operation. One instance is created per
/// element it accepts.
pub trait Participant {
    fn name(&self) -> &str;

    /// Return false to decline the element.
    fn initialize(&mut self, ws: &Workspace, element: Element, args: &ReorgArguments) -> bool;

    fn check_conditions(&mut self, _ws: &Workspace, _cancel: &CancellationToken) -> RefactoringStatus {
        RefactoringStatus::new()
    }

    /// Sub-change appended to the operation's change.
    fn create_change(&mut self, ws: &Workspace) -> Option<Change>;
}

/// Creates participant instances.
pub type ParticipantFactory = Box<dyn Fn() -> Box<dyn Participant> + Send + Sync>;

/// Registered participant factories.
#[derive(Default)]
pub struct ParticipantRegistry {
    factories: Vec<(String, ParticipantFactory)>,
}

impl std::fmt::Debug for ParticipantRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.factories.iter().map(|(name, _)| name))
            .finish()
    }
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, factory: ParticipantFactory) {
        self.factories.push((name.into(), factory));
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Instantiate every participant interested in one of `elements`.
    pub fn load(
        &self,
        ws: &Workspace,
        elements: impl IntoIterator<Item = Element>,
        args: &ReorgArguments,
    ) -> Vec<Box<dyn Participant>> {
        let mut loaded = Vec::new();
        for element in elements {
            for (name, factory) in &self.factories {
                let mut participant = factory();
                if participant.initialize(ws, element, args) {
                    debug!(participant = %name, ?element, "Loaded participant");
                    loaded.push(participant);
                }
            }
        }
        loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::FolderRef;

    #[test]
    fn test_delta_marks_merge() {
        let mut delta = ResourceDelta::new();
        delta.mark_added("a/b.txt");
        delta.mark_changed("a/b.txt");
        assert_eq!(delta.get("a/b.txt"), Some(DeltaKind::Added));

        delta.mark_removed("a/c.txt");
        delta.mark_added("a/c.txt");
        assert_eq!(delta.get("a/c.txt"), Some(DeltaKind::Changed));

        delta.mark_moved("a/d.txt", "e/d.txt");
        assert_eq!(delta.paths(DeltaKind::Removed), vec![Path::new("a/d.txt")]);
        assert_eq!(delta.len(), 4);
    }

    #[test]
    fn test_delta_from_change() {
        let mut ws = Workspace::new();
        let app = ws.add_project("app").unwrap();
        let docs = ws.create_folder(app, "docs").unwrap();
        let readme = ws.add_file(docs, "README", "hi").unwrap();
        let manifest = ws.add_file(app, "treeshift.toml", "").unwrap();

        let change = Change::composite(
            "Reorganize",
            vec![
                Change::move_resource(&ws, readme, FolderRef::below(app, "notes"), None),
                Change::delete_resource(&ws, manifest),
            ],
        );
        let delta = ResourceDelta::from_change(&ws, &change);
        assert_eq!(delta.get("app/docs/README"), Some(DeltaKind::Removed));
        assert_eq!(delta.get("app/notes/README"), Some(DeltaKind::Added));

        let status = ManifestGuard::new("treeshift.toml").check(&ws, &delta);
        assert_eq!(status.severity(), treeshift_core::Severity::Warning);
    }

    struct Recorder {
        accepted: bool,
    }

    impl Participant for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn initialize(&mut self, ws: &Workspace, element: Element, _args: &ReorgArguments) -> bool {
            self.accepted = element
                .as_resource()
                .is_some_and(|r| ws.resource(r).is_file());
            self.accepted
        }

        fn create_change(&mut self, _ws: &Workspace) -> Option<Change> {
            self.accepted.then(|| Change::composite("recorded", Vec::new()))
        }
    }

    #[test]
    fn test_registry_loads_interested_participants() {
        let mut ws = Workspace::new();
        let app = ws.add_project("app").unwrap();
        let file = ws.add_file(app, "a.txt", "").unwrap();

        let mut registry = ParticipantRegistry::new();
        registry.register("recorder", Box::new(|| Box::new(Recorder { accepted: false })));
        let args = ReorgArguments {
            operation: DescriptorOperation::Delete,
            destination: None,
            update_references: false,
        };

        let loaded = registry.load(&ws, [Element::Resource(file), Element::Resource(app)], &args);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name(), "recorder");
    }
}
