//! Delete-set normalization.
//!
//! A delete selection is turned into a consistent closure by a fixed
//! sequence of passes. Each pass consumes the closure and returns the next
//! one; confirmations go through the [`ConfirmationContext`] threaded along.
//! The order of the passes matters:
//!
//! 1. expand sub-namespaces (when configured)
//! 2. drop elements covered by a selected ancestor
//! 3. confirm folders containing source roots
//! 4. confirm archives referenced by other projects
//! 5. add units whose every top-level type is deleted
//! 6. drop covered symbols again
//! 7. confirm read-only elements (declining cancels the operation)
//! 8. add accessors of deleted fields (when configured)
//! 9. decide which namespaces are removed and which are only cleared

use std::collections::HashSet;

use indexmap::IndexSet;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use treeshift_core::source::{self, TextEdit};
use treeshift_core::{
    Element, RefactoringStatus, ResourceId, SymbolId, SymbolKind, Workspace,
};

use crate::change::Change;
use crate::error::{NotApplicable, ReorgError};
use crate::policy::ReorgFlags;
use crate::query::{ConfirmationContext, QueryKind, Question};
use crate::references::TextChangeSet;
use crate::selection::{Selection, remove_descendants};

/// What happens to a selected namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum NamespaceMode {
    /// The backing folder is deleted.
    Remove,
    /// Only the files directly inside the folder are deleted.
    Clear,
}

/// Normalized set of elements to delete.
#[derive(Debug, Clone, Default)]
pub struct DeleteClosure {
    pub symbols: IndexSet<SymbolId>,
    pub resources: IndexSet<ResourceId>,
    /// Namespaces to remove or clear, innermost first. Includes parent
    /// namespaces that end up empty.
    pub namespaces: Vec<(SymbolId, NamespaceMode)>,
    pub accessors_added: bool,
    pub status: RefactoringStatus,
}

impl DeleteClosure {
    pub fn from_selection(selection: &Selection) -> Self {
        Self {
            symbols: selection.symbols.clone(),
            resources: selection.resources.clone(),
            ..Self::default()
        }
    }

    pub fn selection(&self) -> Selection {
        Selection {
            resources: self.resources.clone(),
            symbols: self.symbols.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.resources.is_empty()
    }

    pub fn contains(&self, element: Element) -> bool {
        match element {
            Element::Resource(id) => self.resources.contains(&id),
            Element::Symbol(id) => self.symbols.contains(&id),
        }
    }

    fn remove(&mut self, element: Element) {
        match element {
            Element::Resource(id) => {
                self.resources.shift_remove(&id);
            }
            Element::Symbol(id) => {
                self.symbols.shift_remove(&id);
            }
        }
    }

    fn elements(&self) -> Vec<Element> {
        self.resources
            .iter()
            .copied()
            .map(Element::Resource)
            .chain(self.symbols.iter().copied().map(Element::Symbol))
            .collect()
    }

    pub fn mode_of(&self, namespace: SymbolId) -> Option<NamespaceMode> {
        self.namespaces
            .iter()
            .find(|(ns, _)| *ns == namespace)
            .map(|(_, mode)| *mode)
    }
}

/// Whether a delete may be offered for `selection`.
///
/// Unlike copy and move, deleting does not need a common parent.
pub fn check_delete(ws: &Workspace, selection: &Selection) -> Result<(), NotApplicable> {
    if selection.is_empty() {
        return Err(NotApplicable::Empty);
    }
    if selection.elements().any(|e| !ws.element_exists(e)) {
        return Err(NotApplicable::MissingElement);
    }
    let binary_member = selection.symbols.iter().any(|s| {
        let node = ws.symbol(*s);
        node.binary && !node.kind.is_source_root()
    });
    if binary_member {
        return Err(NotApplicable::Binary);
    }
    if selection.resources.iter().any(|r| ws.resource(*r).parent.is_none()) {
        return Err(NotApplicable::Mixed);
    }
    Ok(())
}

/// Runs the normalization passes.
pub struct DeleteNormalizer<'w, 'c, 'q> {
    ws: &'w Workspace,
    flags: ReorgFlags,
    confirmations: &'c mut ConfirmationContext<'q>,
    cancel: &'c CancellationToken,
}

impl<'w, 'c, 'q> DeleteNormalizer<'w, 'c, 'q> {
    pub fn new(
        ws: &'w Workspace,
        flags: ReorgFlags,
        confirmations: &'c mut ConfirmationContext<'q>,
        cancel: &'c CancellationToken,
    ) -> Self {
        Self {
            ws,
            flags,
            confirmations,
            cancel,
        }
    }

    pub fn normalize(&mut self, selection: &Selection) -> Result<DeleteClosure, ReorgError> {
        check_delete(self.ws, selection)?;

        let closure = DeleteClosure::from_selection(selection);
        let closure = self.expand_sub_namespaces(closure);
        let closure = self.remove_covered(closure, true);
        self.checkpoint()?;
        let closure = self.confirm_source_root_folders(closure);
        let closure = self.confirm_referenced_archives(closure);
        let closure = self.add_empty_units(closure);
        let closure = self.remove_covered(closure, false);
        let closure = self.confirm_read_only(closure)?;
        self.checkpoint()?;
        let closure = self.add_accessors(closure);
        let closure = self.plan_namespaces(closure)?;

        info!(
            symbols = closure.symbols.len(),
            resources = closure.resources.len(),
            namespaces = closure.namespaces.len(),
            "Normalized delete selection"
        );
        Ok(closure)
    }

    fn checkpoint(&self) -> Result<(), ReorgError> {
        if self.cancel.is_cancelled() {
            Err(ReorgError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn expand_sub_namespaces(&self, mut closure: DeleteClosure) -> DeleteClosure {
        if !self.flags.delete_sub_namespaces {
            return closure;
        }
        let namespaces: Vec<SymbolId> = closure
            .symbols
            .iter()
            .copied()
            .filter(|s| self.ws.symbol(*s).kind.is_namespace())
            .collect();
        for ns in namespaces {
            closure.symbols.extend(self.ws.sub_namespaces(ns));
        }
        debug!(symbols = closure.symbols.len(), "Expanded sub-namespaces");
        closure
    }

    pub fn remove_covered(&self, mut closure: DeleteClosure, include_resources: bool) -> DeleteClosure {
        let reduced = remove_descendants(self.ws, &closure.selection(), include_resources);
        closure.symbols = reduced.symbols;
        closure.resources = reduced.resources;
        closure
    }

    pub fn confirm_source_root_folders(&mut self, mut closure: DeleteClosure) -> DeleteClosure {
        let ws = self.ws;
        let folders: Vec<ResourceId> = closure
            .resources
            .iter()
            .copied()
            .filter(|r| ws.resource(*r).kind.is_container() && ws.contains_source_root(*r))
            .collect();
        for folder in folders {
            let question = Question::about(
                ws,
                QueryKind::SourceRootFolder,
                Element::Resource(folder),
                format!(
                    "'{}' contains source roots. Delete it anyway?",
                    ws.resource_path(folder).display()
                ),
            );
            if !self.confirmations.confirm_all(&question) {
                debug!(folder = %ws.resource_path(folder).display(), "Keeping folder with source roots");
                closure.remove(Element::Resource(folder));
            }
        }
        closure
    }

    pub fn confirm_referenced_archives(&mut self, mut closure: DeleteClosure) -> DeleteClosure {
        let ws = self.ws;
        let mut asked: HashSet<ResourceId> = HashSet::new();
        for element in closure.elements() {
            let archive = match element {
                Element::Resource(r) if ws.resource(r).is_file() => r,
                Element::Symbol(s) if matches!(ws.symbol(s).kind, SymbolKind::SourceRoot { archive: true }) => {
                    match ws.symbol(s).resource {
                        Some(r) => r,
                        None => continue,
                    }
                }
                _ => continue,
            };
            let referencing = ws.projects_referencing(archive);
            if referencing.is_empty() || !asked.insert(archive) {
                continue;
            }
            let names = referencing.iter().map(|p| ws.resource(*p).name.as_str()).join(", ");
            let question = Question::about(
                ws,
                QueryKind::ReferencedArchive,
                Element::Resource(archive),
                format!(
                    "'{}' is referenced by {names}. Delete it anyway?",
                    ws.resource_path(archive).display()
                ),
            );
            if !self.confirmations.confirm(&question) {
                closure.remove(element);
                closure.remove(Element::Resource(archive));
                if let Some(root) = ws.symbol_for_resource(archive) {
                    closure.remove(Element::Symbol(root));
                }
            }
        }
        closure
    }

    pub fn add_empty_units(&self, mut closure: DeleteClosure) -> DeleteClosure {
        let ws = self.ws;
        let units: IndexSet<SymbolId> = closure
            .symbols
            .iter()
            .filter(|s| ws.symbol(**s).kind.is_inside_unit())
            .filter_map(|s| ws.enclosing_unit(*s))
            .collect();
        for unit in units {
            let types = ws.top_level_types(unit);
            if !types.is_empty() && types.iter().all(|t| closure.symbols.contains(t)) {
                debug!(unit = %ws.qualified_name(unit), "Deleting unit left without types");
                closure.symbols.insert(unit);
            }
        }
        closure
    }

    fn is_read_only(&self, element: Element) -> bool {
        let ws = self.ws;
        let subtree_read_only = |r: ResourceId| {
            ws.resource(r).read_only
                || ws
                    .resource_descendants(r)
                    .iter()
                    .any(|d| ws.resource(*d).read_only)
        };
        match element {
            Element::Resource(r) => subtree_read_only(r),
            Element::Symbol(s) => {
                let node = ws.symbol(s);
                if node.kind.is_inside_unit() {
                    ws.is_read_only_symbol(s)
                } else {
                    ws.is_read_only_symbol(s) || node.resource.is_some_and(subtree_read_only)
                }
            }
        }
    }

    pub fn confirm_read_only(&mut self, closure: DeleteClosure) -> Result<DeleteClosure, ReorgError> {
        let ws = self.ws;
        for element in closure.elements() {
            if !self.is_read_only(element) {
                continue;
            }
            let label = match element {
                Element::Resource(r) => ws.resource_path(r).display().to_string(),
                Element::Symbol(s) => ws.qualified_name(s),
            };
            let question = Question::about(
                ws,
                QueryKind::ReadOnly,
                element,
                format!("'{label}' is read-only. Delete it anyway?"),
            );
            if !self.confirmations.confirm_all(&question) {
                info!(element = %label, "Read-only deletion declined, cancelling");
                return Err(ReorgError::Cancelled);
            }
        }
        Ok(closure)
    }

    /// Getters and setters of `field` that are not selected yet.
    fn accessors(&self, closure: &DeleteClosure, field: SymbolId) -> Vec<SymbolId> {
        let ws = self.ws;
        let Some(owner) = ws.symbol(field).parent else {
            return Vec::new();
        };
        let name = ws.symbol(field).name.as_str();
        let mut chars = name.chars();
        let capitalized = match chars.next() {
            Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str()),
            None => return Vec::new(),
        };
        let boolean = matches!(
            &ws.symbol(field).kind,
            SymbolKind::Field { type_name } if type_name == "boolean" || type_name == "Boolean"
        );
        let getters = if boolean {
            vec![format!("get{capitalized}"), format!("is{capitalized}")]
        } else {
            vec![format!("get{capitalized}")]
        };
        let setter = format!("set{capitalized}");

        ws.symbol(owner)
            .children
            .iter()
            .copied()
            .filter(|m| !closure.symbols.contains(m))
            .filter(|m| {
                let node = ws.symbol(*m);
                match node.kind {
                    SymbolKind::Method { parameters: 0, .. } => getters.iter().any(|g| node.name == g.as_str()),
                    SymbolKind::Method { parameters: 1, .. } => node.name == setter.as_str(),
                    _ => false,
                }
            })
            .collect()
    }

    pub fn add_accessors(&mut self, mut closure: DeleteClosure) -> DeleteClosure {
        if !self.flags.suggest_accessor_deletion {
            return closure;
        }
        let ws = self.ws;
        let fields: Vec<SymbolId> = closure
            .symbols
            .iter()
            .copied()
            .filter(|s| ws.symbol(*s).kind.is_field())
            .collect();
        for field in fields {
            let accessors = self.accessors(&closure, field);
            if accessors.is_empty() {
                continue;
            }
            let names = accessors.iter().map(|a| ws.symbol(*a).name.as_str()).join(", ");
            let question = Question::about(
                ws,
                QueryKind::Accessors,
                Element::Symbol(field),
                format!(
                    "Field '{}' has accessors {names}. Delete them too?",
                    ws.qualified_name(field)
                ),
            );
            if self.confirmations.confirm_all(&question) {
                closure.symbols.extend(accessors);
                closure.accessors_added = true;
            }
        }
        closure
    }

    /// Whether every direct child of `folder` is deleted already.
    fn all_children_deleted(&self, folder: ResourceId, deleted: &HashSet<ResourceId>) -> bool {
        self.ws
            .resource(folder)
            .children
            .iter()
            .all(|c| deleted.contains(c))
    }

    pub fn plan_namespaces(&mut self, mut closure: DeleteClosure) -> Result<DeleteClosure, ReorgError> {
        let ws = self.ws;
        let selected: Vec<SymbolId> = closure
            .symbols
            .iter()
            .copied()
            .filter(|s| ws.symbol(*s).kind.is_namespace())
            .sorted_by(|a, b| ws.symbol(*b).name.cmp(&ws.symbol(*a).name))
            .collect();
        if selected.is_empty() {
            return Ok(closure);
        }

        // Resources gone once the closure is deleted.
        let mut deleted: HashSet<ResourceId> = closure.resources.iter().copied().collect();
        deleted.extend(
            closure
                .symbols
                .iter()
                .filter(|s| ws.symbol(**s).kind.is_unit())
                .filter_map(|s| ws.symbol(*s).resource),
        );

        let mut planned: HashSet<SymbolId> = HashSet::new();
        for ns in selected {
            self.checkpoint()?;
            let Some(folder) = ws.symbol(ns).resource else {
                continue;
            };
            let is_default = ws.symbol(ns).name.is_empty();
            let subtree_selected = ws
                .sub_namespaces(ns)
                .iter()
                .all(|sub| closure.symbols.contains(sub));
            let foreign_folders = ws.resource(folder).children.iter().any(|c| {
                let child = ws.resource(*c);
                child.is_folder() && ws.namespace_for_folder(*c).is_none() && !deleted.contains(c)
            });

            if is_default || !subtree_selected || foreign_folders {
                debug!(namespace = %ws.symbol(ns).name, "Clearing namespace");
                closure.namespaces.push((ns, NamespaceMode::Clear));
                deleted.extend(
                    ws.resource(folder)
                        .children
                        .iter()
                        .copied()
                        .filter(|c| ws.resource(*c).is_file()),
                );
                planned.insert(ns);
                continue;
            }

            debug!(namespace = %ws.symbol(ns).name, "Removing namespace");
            closure.namespaces.push((ns, NamespaceMode::Remove));
            deleted.insert(folder);
            deleted.extend(ws.resource_descendants(folder));
            planned.insert(ns);

            let mut current = folder;
            while let Some(parent) = ws.resource(current).parent {
                let Some(parent_ns) = ws.namespace_for_folder(parent) else {
                    break;
                };
                if ws.symbol(parent_ns).name.is_empty()
                    || closure.symbols.contains(&parent_ns)
                    || planned.contains(&parent_ns)
                    || !self.all_children_deleted(parent, &deleted)
                {
                    break;
                }
                if ws.resource(parent).linked {
                    let question = Question::about(
                        ws,
                        QueryKind::LinkedFolder,
                        Element::Resource(parent),
                        format!(
                            "'{}' is a linked folder. Delete it as well?",
                            ws.resource_path(parent).display()
                        ),
                    );
                    if !self.confirmations.confirm(&question) {
                        break;
                    }
                }
                debug!(namespace = %ws.symbol(parent_ns).name, "Removing emptied parent namespace");
                closure.namespaces.push((parent_ns, NamespaceMode::Remove));
                deleted.insert(parent);
                planned.insert(parent_ns);
                current = parent;
            }
        }
        Ok(closure)
    }
}

/// Change deleting a normalized closure: member edits first, then files and
/// folders, then namespaces innermost first.
pub fn delete_change(ws: &Workspace, closure: &DeleteClosure) -> Change {
    let mut removed: IndexSet<ResourceId> = IndexSet::new();
    for resource in &closure.resources {
        removed.insert(*resource);
    }
    for symbol in &closure.symbols {
        let node = ws.symbol(*symbol);
        if node.kind.is_namespace() || node.kind.is_inside_unit() {
            continue;
        }
        if let Some(resource) = node.resource {
            removed.insert(resource);
        }
    }

    let mut edits = TextChangeSet::new();
    let by_unit = closure
        .symbols
        .iter()
        .copied()
        .filter(|s| ws.symbol(*s).kind.is_inside_unit())
        .filter_map(|s| ws.enclosing_unit(s).map(|u| (u, s)))
        .into_group_map();
    for (unit, members) in by_unit {
        let (Some(file), Some(text)) = (ws.symbol(unit).resource, ws.unit_text(unit)) else {
            continue;
        };
        if removed.contains(&file) || ws.resource_ancestors(file).any(|a| removed.contains(&a)) {
            continue;
        }
        for member in members {
            if let Some(range) = ws.symbol(member).range {
                edits.add(file, TextEdit::delete(source::expand_to_lines(text, range)));
            }
        }
    }

    let mut namespace_changes = Vec::new();
    for (ns, mode) in &closure.namespaces {
        let Some(folder) = ws.symbol(*ns).resource else {
            continue;
        };
        match mode {
            NamespaceMode::Remove => {
                namespace_changes.push(Change::delete_resource(ws, folder));
            }
            NamespaceMode::Clear => {
                for child in &ws.resource(folder).children {
                    if ws.resource(*child).is_file() && !removed.contains(child) {
                        namespace_changes.push(Change::delete_resource(ws, *child));
                    }
                }
            }
        }
    }

    let mut children = edits.into_changes(ws);
    children.extend(
        removed
            .iter()
            .filter(|r| !ws.resource_ancestors(**r).any(|a| removed.contains(&a)))
            .map(|r| Change::delete_resource(ws, *r)),
    );
    children.extend(namespace_changes);

    let name = if closure.accessors_added {
        "Delete elements and their accessors"
    } else {
        "Delete elements"
    };
    Change::composite(name, children)
}
