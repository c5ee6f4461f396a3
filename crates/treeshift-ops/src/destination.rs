//! Destination resolution and validation per policy.

use treeshift_core::{Element, RefactoringStatus, ResourceId, SymbolId, SymbolKind, Workspace};

use crate::policy::{PolicyKind, ReorgPolicy};

/// The container a selection lands in once a destination is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedDestination {
    SourceRoot(SymbolId),
    Project(ResourceId),
    Namespace(SymbolId),
    Container(ResourceId),
    Type(SymbolId),
    Unit(SymbolId),
}

impl ResolvedDestination {
    pub fn element(&self) -> Element {
        match *self {
            Self::SourceRoot(id) | Self::Namespace(id) | Self::Type(id) | Self::Unit(id) => {
                Element::Symbol(id)
            }
            Self::Project(id) | Self::Container(id) => Element::Resource(id),
        }
    }

    /// Folder receiving moved resources, for resource-level destinations.
    pub fn folder(&self, ws: &Workspace) -> Option<ResourceId> {
        match *self {
            Self::SourceRoot(id) | Self::Namespace(id) => ws.symbol(id).resource,
            Self::Project(id) | Self::Container(id) => Some(id),
            Self::Type(_) | Self::Unit(_) => None,
        }
    }

    /// Resource holding the destination (the unit file for textual targets).
    fn resource(&self, ws: &Workspace) -> Option<ResourceId> {
        match *self {
            Self::Type(id) | Self::Unit(id) => ws.backing_resource(id),
            _ => self.folder(ws),
        }
    }

    /// Destination is read-only or has no editable source.
    fn is_read_only(&self, ws: &Workspace) -> bool {
        match self.element() {
            Element::Symbol(id) => ws.is_read_only_symbol(id),
            Element::Resource(id) => ws.resource(id).read_only,
        }
    }
}

/// Resolve a candidate destination according to the policy's grammar.
pub fn resolve(ws: &Workspace, policy: &ReorgPolicy, element: Element) -> Option<ResolvedDestination> {
    match policy.kind {
        PolicyKind::Namespaces => source_root_target(ws, element).map(ResolvedDestination::SourceRoot),
        PolicyKind::SourceRoots => project_target(ws, element).map(ResolvedDestination::Project),
        PolicyKind::FilesFoldersAndUnits => container_target(ws, element),
        PolicyKind::SubUnitElements => member_target(ws, policy, element),
    }
}

fn source_root_target(ws: &Workspace, element: Element) -> Option<SymbolId> {
    let symbol = match element {
        Element::Symbol(id) => id,
        Element::Resource(id) => ws.symbol_for_resource(id)?,
    };
    match ws.symbol(symbol).kind {
        SymbolKind::Project => project_source_root(ws, symbol),
        SymbolKind::SourceRoot { .. } => Some(symbol),
        _ => ws.source_root_of(symbol),
    }
}

/// The source root a project stands for: the project folder itself when it
/// is a root, otherwise its only editable root.
fn project_source_root(ws: &Workspace, project: SymbolId) -> Option<SymbolId> {
    let roots = &ws.symbol(project).children;
    let project_folder = ws.symbol(project).resource;
    if let Some(own) = roots.iter().find(|r| ws.symbol(**r).resource == project_folder) {
        return Some(*own);
    }
    let mut editable = roots.iter().filter(|r| !ws.symbol(**r).binary);
    match (editable.next(), editable.next()) {
        (Some(root), None) => Some(*root),
        _ => None,
    }
}

fn project_target(ws: &Workspace, element: Element) -> Option<ResourceId> {
    let resource = match element {
        Element::Resource(id) => id,
        Element::Symbol(id) if ws.symbol(id).kind.is_project() => ws.symbol(id).resource?,
        Element::Symbol(_) => return None,
    };
    ws.resource(resource).is_project().then_some(resource)
}

fn container_target(ws: &Workspace, element: Element) -> Option<ResolvedDestination> {
    match element {
        Element::Symbol(id) => {
            let node = ws.symbol(id);
            match node.kind {
                SymbolKind::Namespace => Some(ResolvedDestination::Namespace(id)),
                SymbolKind::SourceRoot { .. } => match ws.find_namespace(id, "") {
                    Some(ns) => Some(ResolvedDestination::Namespace(ns)),
                    None => node.resource.map(ResolvedDestination::Container),
                },
                SymbolKind::Project => node.resource.map(ResolvedDestination::Container),
                _ => ws.namespace_of(id).map(ResolvedDestination::Namespace),
            }
        }
        Element::Resource(id) => {
            let node = ws.resource(id);
            if node.is_file() {
                return container_target(ws, Element::Resource(node.parent?));
            }
            if !node.kind.is_container() || node.parent.is_none() {
                return None;
            }
            Some(match ws.namespace_for_folder(id) {
                Some(ns) => ResolvedDestination::Namespace(ns),
                None => ResolvedDestination::Container(id),
            })
        }
    }
}

/// Import and namespace declarations (and the import container).
fn is_header(kind: &SymbolKind) -> bool {
    kind.is_declaration()
}

fn member_target(ws: &Workspace, policy: &ReorgPolicy, element: Element) -> Option<ResolvedDestination> {
    let target = match element {
        Element::Symbol(id) => id,
        Element::Resource(id) => ws.symbol_for_resource(id)?,
    };
    let selected: Vec<&SymbolKind> = policy
        .selection
        .symbols
        .iter()
        .map(|s| &ws.symbol(*s).kind)
        .collect();

    if selected.iter().all(|k| is_header(k)) {
        let kind = &ws.symbol(target).kind;
        if !(kind.is_unit() || kind.is_inside_unit()) {
            return None;
        }
        return ws.enclosing_unit(target).map(ResolvedDestination::Unit);
    }

    let node = ws.symbol(target);
    match node.kind {
        SymbolKind::SourceUnit => unit_target(ws, &selected, target),
        // Members dropped on a header land in the unit's first type.
        ref kind if is_header(kind) => ws
            .enclosing_unit(target)
            .and_then(|unit| unit_target(ws, &selected, unit)),
        SymbolKind::Type => Some(ResolvedDestination::Type(target)),
        SymbolKind::Field { .. } | SymbolKind::Method { .. } | SymbolKind::Initializer => node
            .parent
            .and_then(|p| ws.enclosing_type(p))
            .map(ResolvedDestination::Type),
        _ => None,
    }
}

fn unit_target(ws: &Workspace, selected: &[&SymbolKind], unit: SymbolId) -> Option<ResolvedDestination> {
    if selected.iter().all(|k| k.is_type()) {
        Some(ResolvedDestination::Unit(unit))
    } else {
        ws.top_level_types(unit)
            .first()
            .copied()
            .map(ResolvedDestination::Type)
    }
}

/// Validate a destination against the policy.
pub fn verify(ws: &Workspace, policy: &ReorgPolicy, element: Element) -> RefactoringStatus {
    if !ws.element_exists(element) {
        return RefactoringStatus::fatal("The destination does not exist");
    }

    let backing = match element {
        Element::Resource(id) => Some(id),
        Element::Symbol(id) => ws.backing_resource(id),
    };
    if backing.is_some_and(|r| !ws.is_accessible(r)) {
        return RefactoringStatus::fatal("The destination is not accessible");
    }

    let Some(resolved) = resolve(ws, policy, element) else {
        let header_target = element
            .as_symbol()
            .is_some_and(|s| is_header(&ws.symbol(s).kind));
        if policy.kind == PolicyKind::SubUnitElements && header_target {
            return RefactoringStatus::fatal(
                "Members cannot be placed in import or namespace declarations",
            );
        }
        return RefactoringStatus::fatal(format!(
            "The element cannot be a destination for {}",
            policy.kind
        ));
    };

    if resolved.is_read_only(ws) || resolved.resource(ws).is_some_and(|r| ws.resource(r).read_only) {
        return RefactoringStatus::fatal("The destination is read-only");
    }

    if equals_parent(ws, policy, resolved) {
        return RefactoringStatus::fatal("Destination equals current parent");
    }

    if inside_selection(ws, policy, resolved) {
        return RefactoringStatus::fatal("The destination is contained in the selection");
    }

    if policy.selection.has_linked_resources(ws) && !can_host_linked(ws, resolved) {
        return RefactoringStatus::fatal(
            "Linked resources can only be placed in a project or a project-level source root",
        );
    }

    if let ResolvedDestination::SourceRoot(root) = resolved {
        if let Some(status) = check_exclusions(ws, policy, root) {
            return status;
        }
    }

    RefactoringStatus::new()
}

/// Resource an element stands for in the resource tree.
fn resource_of(ws: &Workspace, element: Element) -> Option<ResourceId> {
    match element {
        Element::Resource(id) => Some(id),
        Element::Symbol(id) => ws.symbol(id).resource,
    }
}

fn equals_parent(ws: &Workspace, policy: &ReorgPolicy, resolved: ResolvedDestination) -> bool {
    let parent = policy.common_parent;
    let target = resolved.element();
    if parent == target {
        return true;
    }
    if let ResolvedDestination::Unit(unit) = resolved {
        // Header declarations hang off the unit's import container.
        return parent
            .as_symbol()
            .and_then(|p| ws.symbol(p).parent)
            .is_some_and(|p| p == unit);
    }
    match (resource_of(ws, parent), resource_of(ws, target)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn inside_selection(ws: &Workspace, policy: &ReorgPolicy, resolved: ResolvedDestination) -> bool {
    let target_symbol = resolved.element().as_symbol();
    let target_resource = resolved.resource(ws);

    let covers_resource = |selected: ResourceId| {
        target_resource.is_some_and(|t| t == selected || ws.is_resource_ancestor(selected, t))
    };

    policy.selection.resources.iter().any(|r| covers_resource(*r))
        || policy.selection.symbols.iter().any(|s| {
            target_symbol.is_some_and(|t| t == *s || ws.is_symbol_ancestor(*s, t))
                || ws.symbol(*s).resource.is_some_and(&covers_resource)
        })
}

fn can_host_linked(ws: &Workspace, resolved: ResolvedDestination) -> bool {
    let Some(folder) = resolved.folder(ws) else {
        return false;
    };
    let node = ws.resource(folder);
    node.is_project()
        || (ws.source_root_decl(folder).is_some()
            && node.parent.is_some_and(|p| ws.resource(p).is_project()))
}

/// Namespaces excluded by the destination root's filters would vanish.
fn check_exclusions(ws: &Workspace, policy: &ReorgPolicy, root: SymbolId) -> Option<RefactoringStatus> {
    let folder = ws.symbol(root).resource?;
    let decl = ws.source_root_decl(folder)?;
    let matcher = treeshift_core::build_glob_set(&decl.exclusions).ok()?;
    policy.selection.symbols.iter().find_map(|ns| {
        let name = &ws.symbol(*ns).name;
        matcher.is_match(name.replace('.', "/")).then(|| {
            RefactoringStatus::fatal(format!(
                "Namespace '{name}' would be excluded from the destination source root"
            ))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ReorgFlags, ReorgOperation, classify};
    use crate::selection::Selection;
    use treeshift_core::Severity;

    struct Fixture {
        ws: Workspace,
        src: ResourceId,
        p: ResourceId,
        q: ResourceId,
        a: ResourceId,
        text: ResourceId,
    }

    fn fixture() -> Fixture {
        let mut ws = Workspace::new();
        let project = ws.add_project("app").unwrap();
        let src = ws.create_folder(project, "src").unwrap();
        ws.add_source_root(src, false, vec![]).unwrap();
        let p = ws.create_folder(src, "p").unwrap();
        let q = ws.create_folder(src, "q").unwrap();
        let a = ws
            .add_file(
                p,
                "A.java",
                "package p;\nimport q.B;\nclass A {\n    int f;\n    void m() {}\n}\n",
            )
            .unwrap();
        ws.add_file(q, "B.java", "package q;\nclass B {\n}\n").unwrap();
        let text = ws.add_file(p, "a.txt", "hello").unwrap();
        ws.add_project("other").unwrap();
        Fixture {
            ws,
            src,
            p,
            q,
            a,
            text,
        }
    }

    fn policy(ws: &Workspace, selection: Selection) -> ReorgPolicy {
        classify(ws, &selection, ReorgOperation::Move, ReorgFlags::default()).unwrap()
    }

    #[test]
    fn test_destination_equals_parent_is_fatal() {
        let f = fixture();
        let policy = policy(&f.ws, Selection::from_resources([f.text]));
        let status = policy.verify_destination(&f.ws, Element::Resource(f.p));
        assert_eq!(status.severity(), Severity::Fatal);
        assert_eq!(status.message(), Some("Destination equals current parent"));

        // The namespace backed by the same folder is the same place.
        let ns = f.ws.namespace_for_folder(f.p).unwrap();
        assert!(policy.verify_destination(&f.ws, Element::Symbol(ns)).has_fatal());
        assert!(policy.verify_destination(&f.ws, Element::Resource(f.q)).is_ok());
    }

    #[test]
    fn test_files_resolve_to_namespaces() {
        let f = fixture();
        let unit = f.ws.symbol_for_resource(f.a).unwrap();
        let policy = policy(&f.ws, Selection::from_symbols([unit]));
        let q_ns = f.ws.namespace_for_folder(f.q).unwrap();
        let b = f.ws.find_resource("app/src/q/B.java").unwrap();

        // A file destination resolves to its folder.
        assert_eq!(
            resolve(&f.ws, &policy, Element::Resource(b)),
            Some(ResolvedDestination::Namespace(q_ns))
        );
        assert!(policy.can_be_destination(&f.ws, Element::Resource(f.q)));
    }

    #[test]
    fn test_folder_cannot_move_into_itself() {
        let mut f = fixture();
        let inner = f.ws.create_folder(f.p, "inner").unwrap();
        let policy = policy(&f.ws, Selection::from_resources([f.p]));
        let status = policy.verify_destination(&f.ws, Element::Resource(inner));
        assert!(status.has_fatal());
    }

    #[test]
    fn test_read_only_destination() {
        let mut f = fixture();
        f.ws.set_read_only(f.q, true);
        let policy = policy(&f.ws, Selection::from_resources([f.text]));
        let status = policy.verify_destination(&f.ws, Element::Resource(f.q));
        assert_eq!(status.message(), Some("The destination is read-only"));
    }

    #[test]
    fn test_namespaces_need_a_source_root() {
        let f = fixture();
        let ns = f.ws.namespace_for_folder(f.p).unwrap();
        let policy = policy(&f.ws, Selection::from_symbols([ns]));

        let root = f.ws.symbol_for_resource(f.src).unwrap();
        // Same root is the current parent.
        assert!(policy.verify_destination(&f.ws, Element::Symbol(root)).has_fatal());

        let other = f.ws.find_resource("other").unwrap();
        assert!(!policy.can_be_destination(&f.ws, Element::Resource(other)));
    }

    #[test]
    fn test_source_roots_need_another_project() {
        let f = fixture();
        let root = f.ws.symbol_for_resource(f.src).unwrap();
        let policy = policy(&f.ws, Selection::from_symbols([root]));
        let other = f.ws.find_resource("other").unwrap();
        let app = f.ws.find_resource("app").unwrap();

        assert!(policy.verify_destination(&f.ws, Element::Resource(other)).is_ok());
        assert!(policy.verify_destination(&f.ws, Element::Resource(app)).has_fatal());
    }

    #[test]
    fn test_members_skip_to_parent_type() {
        let f = fixture();
        let a_unit = f.ws.symbol_for_resource(f.a).unwrap();
        let a_type = f.ws.top_level_types(a_unit)[0];
        let field = f.ws.symbol(a_type).children[0];
        let policy = policy(&f.ws, Selection::from_symbols([field]));

        let b_unit = f
            .ws
            .symbol_for_resource(f.ws.find_resource("app/src/q/B.java").unwrap())
            .unwrap();
        let b_type = f.ws.top_level_types(b_unit)[0];
        assert_eq!(
            resolve(&f.ws, &policy, Element::Symbol(b_unit)),
            Some(ResolvedDestination::Type(b_type))
        );

        // A method of A resolves to A, the current parent.
        let method = f.ws.symbol(a_type).children[1];
        let status = policy.verify_destination(&f.ws, Element::Symbol(method));
        assert_eq!(status.message(), Some("Destination equals current parent"));

        // Import declarations hand members on to the type of their unit.
        let import = f.ws.imports_of(a_unit)[0];
        let status = policy.verify_destination(&f.ws, Element::Symbol(import));
        assert_eq!(status.message(), Some("Destination equals current parent"));
    }

    #[test]
    fn test_members_on_header_resolve_to_first_type() {
        let mut f = fixture();
        let c_file = f
            .ws
            .add_file(f.q, "C.java", "package q;\nimport p.A;\nclass C {\n}\nclass D {\n}\n")
            .unwrap();
        let c_unit = f.ws.symbol_for_resource(c_file).unwrap();
        let c_type = f.ws.top_level_types(c_unit)[0];
        let a_unit = f.ws.symbol_for_resource(f.a).unwrap();
        let field = f.ws.symbol(f.ws.top_level_types(a_unit)[0]).children[0];
        let policy = policy(&f.ws, Selection::from_symbols([field]));

        let import = f.ws.imports_of(c_unit)[0];
        assert_eq!(
            resolve(&f.ws, &policy, Element::Symbol(import)),
            Some(ResolvedDestination::Type(c_type))
        );
        let container = f.ws.symbol(import).parent.unwrap();
        assert_eq!(
            resolve(&f.ws, &policy, Element::Symbol(container)),
            Some(ResolvedDestination::Type(c_type))
        );
        assert!(policy.verify_destination(&f.ws, Element::Symbol(import)).is_ok());
    }

    #[test]
    fn test_linked_resources_need_project_level_destination() {
        let mut f = fixture();
        f.ws.set_linked(f.text, true);
        let policy = policy(&f.ws, Selection::from_resources([f.text]));
        assert!(policy.verify_destination(&f.ws, Element::Resource(f.q)).has_fatal());
        assert!(policy.verify_destination(&f.ws, Element::Resource(f.src)).is_ok());
    }
}
