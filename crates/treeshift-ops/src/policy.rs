//! Reorganization policies and selection classification.

use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;
use treeshift_core::{
    Element, RefactoringStatus, ReorgConfig, ResourceKind, SymbolId, SymbolKind, Workspace,
};

use crate::destination::{self, ResolvedDestination};
use crate::error::NotApplicable;
use crate::selection::{Selection, common_parent};

/// Structural operation applied to a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ReorgOperation {
    Copy,
    Move,
}

/// Granularity of a selection, each with its own destination grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum PolicyKind {
    Namespaces,
    SourceRoots,
    FilesFoldersAndUnits,
    SubUnitElements,
}

/// Operation switches taken from [`ReorgConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorgFlags {
    pub update_references: bool,
    pub update_qualified_names: bool,
    pub delete_sub_namespaces: bool,
    pub suggest_accessor_deletion: bool,
}

impl From<&ReorgConfig> for ReorgFlags {
    fn from(config: &ReorgConfig) -> Self {
        Self {
            update_references: config.update_references,
            update_qualified_names: config.update_qualified_names,
            delete_sub_namespaces: config.delete_sub_namespaces,
            suggest_accessor_deletion: config.suggest_accessor_deletion,
        }
    }
}

impl Default for ReorgFlags {
    fn default() -> Self {
        Self::from(&ReorgConfig::default())
    }
}

/// A copy or move bound to one classified selection.
#[derive(Debug, Clone)]
pub struct ReorgPolicy {
    pub operation: ReorgOperation,
    pub kind: PolicyKind,
    /// The selection after archive members, projects and the root were
    /// discarded.
    pub selection: Selection,
    pub common_parent: Element,
    pub destination: Option<Element>,
    pub flags: ReorgFlags,
}

impl ReorgPolicy {
    /// Cheap structural check whether `element` may be offered as a
    /// destination.
    pub fn can_be_destination(&self, ws: &Workspace, element: Element) -> bool {
        ws.element_exists(element) && destination::resolve(ws, self, element).is_some()
    }

    /// Full destination validation.
    pub fn verify_destination(&self, ws: &Workspace, element: Element) -> RefactoringStatus {
        destination::verify(ws, self, element)
    }

    /// Validate and store a destination. The destination is only kept when
    /// the status is not fatal.
    pub fn set_destination(&mut self, ws: &Workspace, element: Element) -> RefactoringStatus {
        let status = self.verify_destination(ws, element);
        self.destination = (!status.has_fatal()).then_some(element);
        status
    }

    /// Destination resolved to the container the selection lands in.
    pub fn resolved_destination(&self, ws: &Workspace) -> Option<ResolvedDestination> {
        destination::resolve(ws, self, self.destination?)
    }

    /// Every policy requires a common parent; classification guarantees it.
    pub fn can_enable(&self, ws: &Workspace) -> bool {
        !self.selection.is_empty()
            && self.selection.elements().all(|e| ws.element_exists(e))
            && common_parent(ws, &self.selection).is_some()
    }

    /// Selected source units.
    pub fn units(&self, ws: &Workspace) -> Vec<SymbolId> {
        self.selection
            .symbols
            .iter()
            .copied()
            .filter(|s| ws.symbol(*s).kind.is_unit())
            .collect()
    }
}

/// Pick the policy for a copy or move selection.
pub fn classify(
    ws: &Workspace,
    selection: &Selection,
    operation: ReorgOperation,
    flags: ReorgFlags,
) -> Result<ReorgPolicy, NotApplicable> {
    if selection.elements().any(|e| !ws.element_exists(e)) {
        return Err(NotApplicable::MissingElement);
    }

    let selection = strip_unmovable(ws, selection);
    if selection.is_empty() {
        return Err(NotApplicable::Empty);
    }
    let parent = common_parent(ws, &selection).ok_or(NotApplicable::NoCommonParent)?;

    let kinds: Vec<&SymbolKind> = selection.symbols.iter().map(|s| &ws.symbol(*s).kind).collect();
    let no_resources = selection.resources.is_empty();

    let kind = if no_resources && kinds.iter().all(|k| k.is_namespace()) {
        PolicyKind::Namespaces
    } else if no_resources && kinds.iter().all(|k| k.is_source_root()) {
        PolicyKind::SourceRoots
    } else if selection.resources.iter().all(|r| {
        matches!(ws.resource(*r).kind, ResourceKind::File | ResourceKind::Folder)
    }) && kinds.iter().all(|k| k.is_unit())
    {
        PolicyKind::FilesFoldersAndUnits
    } else if no_resources && kinds.iter().all(|k| k.is_inside_unit()) {
        PolicyKind::SubUnitElements
    } else {
        return Err(NotApplicable::Mixed);
    };

    debug!(%kind, %operation, elements = selection.len(), "Classified selection");

    Ok(ReorgPolicy {
        operation,
        kind,
        selection,
        common_parent: parent,
        destination: None,
        flags,
    })
}

/// Discard archive members, projects and the workspace root.
fn strip_unmovable(ws: &Workspace, selection: &Selection) -> Selection {
    let resources = selection
        .resources
        .iter()
        .copied()
        .filter(|r| {
            !matches!(ws.resource(*r).kind, ResourceKind::Root | ResourceKind::Project)
        })
        .collect();

    let symbols = selection
        .symbols
        .iter()
        .copied()
        .filter(|s| {
            let node = ws.symbol(*s);
            !node.kind.is_project() && (node.kind.is_source_root() || !node.binary)
        })
        .collect();

    Selection { resources, symbols }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treeshift_core::ResourceId;

    struct Fixture {
        ws: Workspace,
        project: ResourceId,
        src: ResourceId,
        p: ResourceId,
        a: ResourceId,
    }

    fn fixture() -> Fixture {
        let mut ws = Workspace::new();
        let project = ws.add_project("app").unwrap();
        let src = ws.create_folder(project, "src").unwrap();
        ws.add_source_root(src, false, vec![]).unwrap();
        let p = ws.create_folder(src, "p").unwrap();
        ws.create_folder(src, "q").unwrap();
        let a = ws
            .add_file(p, "A.java", "package p;\nimport q.B;\nclass A { int f; }\n")
            .unwrap();
        let lib = ws.create_folder(project, "lib").unwrap();
        ws.add_source_root(lib, true, vec![]).unwrap();
        ws.add_file(lib, "L.java", "class L {}").unwrap();
        Fixture {
            ws,
            project,
            src,
            p,
            a,
        }
    }

    fn kind_of(ws: &Workspace, selection: Selection) -> Result<PolicyKind, NotApplicable> {
        classify(ws, &selection, ReorgOperation::Move, ReorgFlags::default()).map(|p| p.kind)
    }

    #[test]
    fn test_classify_namespaces_and_roots() {
        let f = fixture();
        let p = f.ws.namespace_for_folder(f.p).unwrap();
        let root = f.ws.symbol_for_resource(f.src).unwrap();
        let q = f.ws.find_namespace(root, "q").unwrap();

        assert_eq!(
            kind_of(&f.ws, Selection::from_symbols([p, q])),
            Ok(PolicyKind::Namespaces)
        );
        assert_eq!(
            kind_of(&f.ws, Selection::from_symbols([root])),
            Ok(PolicyKind::SourceRoots)
        );
    }

    #[test]
    fn test_classify_files_and_units() {
        let f = fixture();
        let unit = f.ws.symbol_for_resource(f.a).unwrap();
        let notes = {
            let mut ws = f.ws.clone();
            let notes = ws.add_file(f.p, "notes.txt", "").unwrap();
            let mut selection = Selection::from_symbols([ws.symbol_for_resource(f.a).unwrap()]);
            selection.insert(Element::Resource(notes));
            kind_of(&ws, selection)
        };
        assert_eq!(notes, Ok(PolicyKind::FilesFoldersAndUnits));
        assert_eq!(
            kind_of(&f.ws, Selection::from_symbols([unit])),
            Ok(PolicyKind::FilesFoldersAndUnits)
        );
    }

    #[test]
    fn test_classify_sub_unit_elements() {
        let f = fixture();
        let unit = f.ws.symbol_for_resource(f.a).unwrap();
        let imports = f.ws.imports_of(unit);
        assert_eq!(
            kind_of(&f.ws, Selection::from_symbols(imports)),
            Ok(PolicyKind::SubUnitElements)
        );
        let ty = f.ws.top_level_types(unit)[0];
        assert_eq!(
            kind_of(&f.ws, Selection::from_symbols([ty])),
            Ok(PolicyKind::SubUnitElements)
        );
    }

    #[test]
    fn test_classify_rejections() {
        let f = fixture();
        assert_eq!(kind_of(&f.ws, Selection::new()), Err(NotApplicable::Empty));

        // Projects are discarded, leaving nothing.
        assert_eq!(
            kind_of(&f.ws, Selection::from_resources([f.project])),
            Err(NotApplicable::Empty)
        );

        // Archive members are discarded as well.
        let lib_unit = f
            .ws
            .symbol_for_resource(f.ws.find_resource("app/lib/L.java").unwrap())
            .unwrap();
        assert_eq!(
            kind_of(&f.ws, Selection::from_symbols([lib_unit])),
            Err(NotApplicable::Empty)
        );

        // A namespace and a unit of another namespace share no parent.
        let unit = f.ws.symbol_for_resource(f.a).unwrap();
        let root = f.ws.symbol_for_resource(f.src).unwrap();
        let q = f.ws.find_namespace(root, "q").unwrap();
        assert_eq!(
            kind_of(&f.ws, Selection::from_symbols([unit, q])),
            Err(NotApplicable::NoCommonParent)
        );

        // A namespace mixed with a folder resource has no policy.
        let ns = f.ws.namespace_for_folder(f.p).unwrap();
        let mut mixed = Selection::from_symbols([ns]);
        mixed.insert(Element::Resource(f.ws.find_resource("app/src/q").unwrap()));
        assert_eq!(kind_of(&f.ws, mixed), Err(NotApplicable::Mixed));
    }

    #[test]
    fn test_classified_selection_has_common_parent() {
        let f = fixture();
        let unit = f.ws.symbol_for_resource(f.a).unwrap();
        let selection = Selection::from_symbols([unit]);
        let policy = classify(&f.ws, &selection, ReorgOperation::Copy, ReorgFlags::default()).unwrap();
        assert!(policy.can_enable(&f.ws));
        assert!(common_parent(&f.ws, &policy.selection).is_some());
    }
}
