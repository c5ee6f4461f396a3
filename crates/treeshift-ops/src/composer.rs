//! Change composition and participant notification.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use treeshift_core::source::{self, SourceOutline, TextEdit};
use treeshift_core::{
    BufferState, Element, RefactoringStatus, ReorgConfig, ResourceId, Severity, SymbolId, SymbolKind,
    TextRange, Workspace,
};

use crate::change::{Change, FolderRef};
use crate::delete::{DeleteClosure, delete_change};
use crate::destination::ResolvedDestination;
use crate::error::ReorgError;
use crate::participants::{DeltaConsumer, ParticipantRegistry, ReorgArguments, ResourceDelta};
use crate::policy::{PolicyKind, ReorgOperation, ReorgPolicy};
use crate::qualified::{QualifiedNameUpdater, QualifiedRename};
use crate::query::{ConfirmationContext, NewNameTarget, QueryKind, Question, decision_key, suggest_name};
use crate::references::{
    ImportRewrite, MoveReferenceUpdater, TextChangeSet, namespace_declaration_edit,
    with_namespace_declaration,
};
use crate::replay::{DescriptorOperation, RecordedDecisions};
use crate::search::{SearchEngine, SearchMatch, imports_for_moved_text};

/// Outcome of planning an operation.
#[derive(Debug, Clone, Serialize)]
pub struct ReorgPlan {
    /// The change to execute; absent when the status is fatal or nothing is
    /// left to do.
    #[serde(skip)]
    pub change: Option<Change>,
    pub status: RefactoringStatus,
    pub delta: ResourceDelta,
    pub description: String,
    pub decisions: RecordedDecisions,
    #[serde(skip)]
    pub binary_references: Vec<SearchMatch>,
}

impl ReorgPlan {
    /// A plan refused by validation.
    pub fn rejected(description: impl Into<String>, status: RefactoringStatus) -> Self {
        Self {
            change: None,
            status,
            delta: ResourceDelta::new(),
            description: description.into(),
            decisions: RecordedDecisions::default(),
            binary_references: Vec::new(),
        }
    }

    pub fn is_executable(&self) -> bool {
        self.change.is_some() && !self.status.has_fatal()
    }

    /// Human-readable change steps.
    pub fn steps(&self) -> Vec<String> {
        self.change.as_ref().map(Change::describe).unwrap_or_default()
    }
}

/// Display label of an element.
pub fn element_label(ws: &Workspace, element: Element) -> String {
    match element {
        Element::Resource(r) => ws.resource_path(r).display().to_string(),
        Element::Symbol(s) => {
            let node = ws.symbol(s);
            if node.kind.is_namespace() && node.name.is_empty() {
                "(default namespace)".to_string()
            } else {
                ws.qualified_name(s)
            }
        }
    }
}

/// Rename the declaration of type `old` to `new`.
fn rename_primary_type(text: &str, old: &str, new: &str) -> String {
    let tokens = source::tokenize(text);
    let declaration = source::identifier_chains(text, &tokens)
        .into_iter()
        .find(|c| c.declaration && c.len() == 1 && c.prefix_text(text, 1) == old);
    match declaration {
        Some(chain) => source::apply_edits(text, &[TextEdit::replace(chain.range(), new)]),
        None => text.to_string(),
    }
}

/// Offset of the `}` closing the type declared at `range`.
fn closing_brace(text: &str, outline: &SourceOutline, range: TextRange) -> Option<usize> {
    let brace = outline
        .types
        .iter()
        .find(|t| t.range == range)
        .map(|t| t.body_end)
        .unwrap_or_else(|| range.end().saturating_sub(1));
    (text.get(brace..brace + 1) == Some("}")).then_some(brace)
}

fn file_stem(name: &str) -> &str {
    name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
}

/// Warn about unsaved buffers; refuse buffers out of sync with disk.
pub fn check_buffers(ws: &Workspace, change: &Change) -> RefactoringStatus {
    let mut status = RefactoringStatus::new();
    let mut files = Vec::new();
    for id in change.affected_resources() {
        if !ws.resource_exists(id) {
            continue;
        }
        if ws.resource(id).is_file() {
            files.push(id);
        } else {
            files.extend(
                ws.resource_descendants(id)
                    .into_iter()
                    .filter(|d| ws.resource(*d).is_file()),
            );
        }
    }
    files.sort();
    files.dedup();

    for file in files {
        let path = ws.resource_path(file);
        match ws.resource(file).buffer {
            BufferState::Saved => {}
            BufferState::Dirty => status.add(
                Severity::Warning,
                format!("'{}' has unsaved changes", path.display()),
                Some(Element::Resource(file)),
            ),
            BufferState::Unsynchronized => status.add(
                Severity::Fatal,
                format!("'{}' is out of sync with the file system", path.display()),
                Some(Element::Resource(file)),
            ),
        }
    }
    status
}

/// Pieces of a change under construction.
#[derive(Debug, Default)]
struct Draft {
    structural: Vec<Change>,
    edits: TextChangeSet,
    status: RefactoringStatus,
    binary_references: Vec<SearchMatch>,
}

impl Draft {
    fn skip(&mut self, ws: &Workspace, element: Element) {
        let label = element_label(ws, element);
        warn!(element = %label, "Skipping element");
        self.status
            .add(Severity::Info, format!("'{label}' was skipped"), Some(element));
    }
}

/// Turns validated operations into change trees.
pub struct ChangeComposer<'a> {
    ws: &'a Workspace,
    config: &'a ReorgConfig,
    search: &'a dyn SearchEngine,
    participants: &'a ParticipantRegistry,
    consumers: &'a [Box<dyn DeltaConsumer>],
    cancel: &'a CancellationToken,
}

impl<'a> ChangeComposer<'a> {
    pub fn new(
        ws: &'a Workspace,
        config: &'a ReorgConfig,
        search: &'a dyn SearchEngine,
        participants: &'a ParticipantRegistry,
        consumers: &'a [Box<dyn DeltaConsumer>],
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            ws,
            config,
            search,
            participants,
            consumers,
            cancel,
        }
    }

    fn checkpoint(&self) -> Result<(), ReorgError> {
        if self.cancel.is_cancelled() {
            Err(ReorgError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Compose a copy or move.
    pub fn compose_reorg(
        &self,
        policy: &ReorgPolicy,
        confirmations: &mut ConfirmationContext<'_>,
    ) -> Result<ReorgPlan, ReorgError> {
        let ws = self.ws;
        let verb = match policy.operation {
            ReorgOperation::Copy => "Copy",
            ReorgOperation::Move => "Move",
        };
        let Some(destination) = policy.destination else {
            return Ok(ReorgPlan::rejected(
                verb,
                RefactoringStatus::fatal("No destination selected"),
            ));
        };
        let description = format!(
            "{verb} {} element(s) to '{}'",
            policy.selection.len(),
            element_label(ws, destination)
        );

        let status = policy.verify_destination(ws, destination);
        if status.has_fatal() {
            return Ok(ReorgPlan::rejected(description, status));
        }
        let Some(target) = policy.resolved_destination(ws) else {
            return Ok(ReorgPlan::rejected(
                description,
                RefactoringStatus::fatal("The destination cannot be resolved"),
            ));
        };

        let mut draft = Draft {
            status,
            ..Draft::default()
        };
        match (policy.kind, target) {
            (PolicyKind::Namespaces, ResolvedDestination::SourceRoot(root)) => {
                self.namespaces(policy, root, confirmations, &mut draft)?
            }
            (PolicyKind::SourceRoots, ResolvedDestination::Project(project)) => {
                self.source_roots(policy, project, confirmations, &mut draft)?
            }
            (PolicyKind::FilesFoldersAndUnits, target) => {
                self.files_and_units(policy, target, confirmations, &mut draft)?
            }
            (PolicyKind::SubUnitElements, target) => {
                self.members(policy, target, confirmations, &mut draft)?
            }
            _ => {
                return Ok(ReorgPlan::rejected(
                    description,
                    RefactoringStatus::fatal("The destination cannot be resolved"),
                ));
            }
        }

        let Draft {
            structural,
            edits,
            status,
            binary_references,
        } = draft;
        let mut children = edits.into_changes(ws);
        children.extend(structural);

        let args = ReorgArguments {
            operation: policy.operation.into(),
            destination: Some(destination),
            update_references: policy.flags.update_references,
        };
        self.finish(
            description,
            children,
            status,
            binary_references,
            policy.selection.elements().collect(),
            &args,
        )
    }

    /// Compose the deletion of a normalized closure.
    pub fn compose_delete(&self, closure: &DeleteClosure) -> Result<ReorgPlan, ReorgError> {
        let description = format!("Delete {} element(s)", closure.symbols.len() + closure.resources.len());
        let args = ReorgArguments {
            operation: DescriptorOperation::Delete,
            destination: None,
            update_references: false,
        };
        let elements = closure
            .resources
            .iter()
            .copied()
            .map(Element::Resource)
            .chain(closure.symbols.iter().copied().map(Element::Symbol))
            .collect();
        self.finish(
            description,
            vec![delete_change(self.ws, closure)],
            closure.status.clone(),
            Vec::new(),
            elements,
            &args,
        )
    }

    fn finish(
        &self,
        description: String,
        mut children: Vec<Change>,
        mut status: RefactoringStatus,
        binary_references: Vec<SearchMatch>,
        elements: Vec<Element>,
        args: &ReorgArguments,
    ) -> Result<ReorgPlan, ReorgError> {
        let ws = self.ws;
        for mut participant in self.participants.load(ws, elements, args) {
            self.checkpoint()?;
            status.merge(participant.check_conditions(ws, self.cancel));
            if let Some(change) = participant.create_change(ws) {
                debug!(participant = participant.name(), "Participant contributed a change");
                children.push(change);
            }
        }

        let change = Change::composite(description.clone(), children);
        status.merge(check_buffers(ws, &change));

        let delta = ResourceDelta::from_change(ws, &change);
        for consumer in self.consumers {
            status.merge(consumer.check(ws, &delta));
        }
        if !binary_references.is_empty() {
            status.add_warning(format!(
                "{} reference(s) in units without editable source cannot be updated",
                binary_references.len()
            ));
        }

        let executable = !status.has_fatal() && !change.is_empty();
        info!(
            plan = %description,
            steps = change.leaves().len(),
            severity = %status.severity(),
            executable,
            "Composed change"
        );
        Ok(ReorgPlan {
            change: executable.then_some(change),
            status,
            delta,
            description,
            decisions: RecordedDecisions::default(),
            binary_references,
        })
    }

    /// Ask for a free name for a copy. `None` skips the element.
    fn copy_name(
        &self,
        confirmations: &mut ConfirmationContext<'_>,
        element: Element,
        target: NewNameTarget,
        original: &str,
        taken: impl Fn(&str) -> bool,
        draft: &mut Draft,
    ) -> Option<String> {
        let suggestion = suggest_name(target, original, &taken);
        let key = decision_key(self.ws, "new-name", element);
        match confirmations.new_name(key, target, original, &suggestion) {
            Some(name) if !name.is_empty() && !taken(&name) => Some(name),
            Some(name) => {
                draft.status.add(
                    Severity::Error,
                    format!("'{name}' is already used at the destination"),
                    Some(element),
                );
                None
            }
            None => {
                draft.skip(self.ws, element);
                None
            }
        }
    }

    /// Ask whether `existing` may be replaced.
    fn overwrite(&self, confirmations: &mut ConfirmationContext<'_>, existing: Element) -> bool {
        let question = Question::about(
            self.ws,
            QueryKind::Overwrite,
            existing,
            format!(
                "'{}' already exists at the destination. Replace it?",
                element_label(self.ws, existing)
            ),
        );
        confirmations.confirm(&question)
    }

    fn namespaces(
        &self,
        policy: &ReorgPolicy,
        root: SymbolId,
        confirmations: &mut ConfirmationContext<'_>,
        draft: &mut Draft,
    ) -> Result<(), ReorgError> {
        let ws = self.ws;
        let Some(root_folder) = ws.symbol(root).resource else {
            return Ok(());
        };
        let copy = policy.operation == ReorgOperation::Copy;

        let mut namespaces: Vec<SymbolId> = policy.selection.symbols.iter().copied().collect();
        namespaces.sort_by(|a, b| ws.symbol(*a).name.cmp(&ws.symbol(*b).name));

        for ns in namespaces {
            self.checkpoint()?;
            let Some(folder) = ws.symbol(ns).resource else {
                continue;
            };
            let name = ws.symbol(ns).name.to_string();
            let existing = ws.find_namespace(root, &name);
            let mut target_name = name.clone();

            if let Some(existing) = existing {
                if copy {
                    match self.copy_name(
                        confirmations,
                        Element::Symbol(ns),
                        NewNameTarget::Namespace,
                        &name,
                        |n| !source::is_namespace_name(n) || ws.find_namespace(root, n).is_some(),
                        draft,
                    ) {
                        Some(new_name) => target_name = new_name,
                        None => continue,
                    }
                } else {
                    if !self.overwrite(confirmations, Element::Symbol(existing)) {
                        draft.skip(ws, Element::Symbol(ns));
                        continue;
                    }
                    if let Some(existing_folder) = ws.symbol(existing).resource {
                        for child in &ws.resource(folder).children {
                            if let Some(clash) = ws.child_named(existing_folder, &ws.resource(*child).name) {
                                draft.structural.push(Change::delete_resource(ws, clash));
                            }
                        }
                    }
                }
            }

            let (sub_folders, members): (Vec<ResourceId>, Vec<ResourceId>) = ws
                .resource(folder)
                .children
                .iter()
                .copied()
                .partition(|c| ws.namespace_for_folder(*c).is_some());
            let renamed = target_name != name;

            if existing.is_none() && sub_folders.is_empty() && !name.is_empty() {
                let destination = FolderRef::below(root_folder, source::qualifier(&name).replace('.', "/"));
                let leaf = source::simple_name(&name).to_string();
                draft.structural.push(if copy {
                    Change::copy_resource(ws, folder, destination, Some(leaf), None)
                } else {
                    Change::move_resource(ws, folder, destination, Some(leaf))
                });
                continue;
            }

            let destination = FolderRef::below(root_folder, target_name.replace('.', "/"));
            for member in members {
                let change = if copy {
                    let contents = renamed
                        .then(|| ws.resource(member))
                        .filter(|node| node.extension() == Some(self.config.source_extension.as_str()))
                        .and_then(|node| node.contents.as_deref())
                        .map(|text| with_namespace_declaration(text, &target_name));
                    Change::copy_resource(ws, member, destination.clone(), None, contents)
                } else {
                    Change::move_resource(ws, member, destination.clone(), None)
                };
                draft.structural.push(change);
            }
            if !copy && sub_folders.is_empty() {
                draft.structural.push(Change::delete_resource(ws, folder));
            }
        }
        Ok(())
    }

    fn source_roots(
        &self,
        policy: &ReorgPolicy,
        project: ResourceId,
        confirmations: &mut ConfirmationContext<'_>,
        draft: &mut Draft,
    ) -> Result<(), ReorgError> {
        let ws = self.ws;
        let copy = policy.operation == ReorgOperation::Copy;
        for root in policy.selection.symbols.iter().copied() {
            self.checkpoint()?;
            let Some(folder) = ws.symbol(root).resource else {
                continue;
            };
            let name = ws.resource(folder).name.to_string();
            let mut new_name = None;
            if let Some(existing) = ws.child_named(project, &name) {
                if copy {
                    match self.copy_name(
                        confirmations,
                        Element::Symbol(root),
                        NewNameTarget::SourceRoot,
                        &name,
                        |n| ws.child_named(project, n).is_some(),
                        draft,
                    ) {
                        Some(n) => new_name = Some(n),
                        None => continue,
                    }
                } else if self.overwrite(confirmations, Element::Resource(existing)) {
                    draft.structural.push(Change::delete_resource(ws, existing));
                } else {
                    draft.skip(ws, Element::Symbol(root));
                    continue;
                }
            }
            let destination = FolderRef::existing(project);
            draft.structural.push(if copy {
                Change::copy_resource(ws, folder, destination, new_name, None)
            } else {
                Change::move_resource(ws, folder, destination, None)
            });
        }
        Ok(())
    }

    /// Contents of a copied unit, when they differ from the original.
    fn copied_unit_contents(&self, unit: SymbolId, namespace: Option<&str>, new_name: Option<&str>) -> Option<String> {
        let ws = self.ws;
        let text = ws.unit_text(unit)?;
        let mut contents = text.to_string();
        if let Some(namespace) = namespace {
            if namespace != ws.namespace_name(unit) {
                contents = with_namespace_declaration(&contents, namespace);
            }
        }
        if let Some(new_name) = new_name {
            let (old, new) = (file_stem(&ws.symbol(unit).name), file_stem(new_name));
            if source::is_identifier(new) {
                contents = rename_primary_type(&contents, old, new);
            }
        }
        (contents != text).then_some(contents)
    }

    fn files_and_units(
        &self,
        policy: &ReorgPolicy,
        target: ResolvedDestination,
        confirmations: &mut ConfirmationContext<'_>,
        draft: &mut Draft,
    ) -> Result<(), ReorgError> {
        let ws = self.ws;
        let Some(folder) = target.folder(ws) else {
            draft.status.add_fatal("The destination cannot hold files");
            return Ok(());
        };
        let destination_ns = match target {
            ResolvedDestination::Namespace(ns) => Some(ns),
            _ => ws.namespace_for_folder(folder),
        };
        let namespace = destination_ns.map(|ns| ws.symbol(ns).name.to_string());
        let copy = policy.operation == ReorgOperation::Copy;

        let items: Vec<(ResourceId, Option<SymbolId>, Element)> = policy
            .selection
            .resources
            .iter()
            .map(|r| (*r, None, Element::Resource(*r)))
            .chain(
                policy
                    .selection
                    .symbols
                    .iter()
                    .filter_map(|u| ws.symbol(*u).resource.map(|r| (r, Some(*u), Element::Symbol(*u)))),
            )
            .collect();

        let mut moved_units = Vec::new();
        for (resource, unit, element) in items {
            self.checkpoint()?;
            let unit = unit.or_else(|| {
                ws.symbol_for_resource(resource)
                    .filter(|s| ws.symbol(*s).kind.is_unit())
            });
            let name = ws.resource(resource).name.to_string();
            let mut new_name = None;

            if let Some(existing) = ws.child_named(folder, &name) {
                if copy {
                    let target = if unit.is_some() {
                        NewNameTarget::SourceUnit
                    } else {
                        NewNameTarget::Resource
                    };
                    match self.copy_name(
                        confirmations,
                        element,
                        target,
                        &name,
                        |n| ws.child_named(folder, n).is_some(),
                        draft,
                    ) {
                        Some(n) => new_name = Some(n),
                        None => continue,
                    }
                } else if self.overwrite(confirmations, Element::Resource(existing)) {
                    draft.structural.push(Change::delete_resource(ws, existing));
                } else {
                    draft.skip(ws, element);
                    continue;
                }
            }

            let destination = FolderRef::existing(folder);
            if copy {
                let contents =
                    unit.and_then(|u| self.copied_unit_contents(u, namespace.as_deref(), new_name.as_deref()));
                draft
                    .structural
                    .push(Change::copy_resource(ws, resource, destination, new_name, contents));
                continue;
            }

            if let (Some(unit), Some(namespace)) = (unit, namespace.as_deref()) {
                if let (Some(text), Some(outline)) = (ws.unit_text(unit), ws.outline(unit)) {
                    if let Some(edit) = namespace_declaration_edit(text, outline, namespace) {
                        draft.edits.add(resource, edit);
                    }
                }
                moved_units.push(unit);
            }
            draft
                .structural
                .push(Change::move_resource(ws, resource, destination, None));
        }

        if let (false, Some(ns)) = (moved_units.is_empty(), destination_ns) {
            self.repair_moved_units(policy, &moved_units, ns, draft)?;
        }
        Ok(())
    }

    fn repair_moved_units(
        &self,
        policy: &ReorgPolicy,
        units: &[SymbolId],
        destination: SymbolId,
        draft: &mut Draft,
    ) -> Result<(), ReorgError> {
        let ws = self.ws;
        if policy.flags.update_references {
            let update = MoveReferenceUpdater::new(ws, self.search, self.cancel).update(units, destination)?;
            draft.edits.merge(update.edits);
            draft.status.merge(update.status);
            draft.binary_references.extend(update.binary_references);
        }

        if policy.flags.update_qualified_names {
            let namespace = ws.symbol(destination).name.to_string();
            let renames: Vec<QualifiedRename> = units
                .iter()
                .flat_map(|u| ws.top_level_types(*u))
                .map(|t| QualifiedRename {
                    old: ws.qualified_name(t),
                    new: source::qualify(&namespace, &ws.symbol(t).name),
                })
                .filter(|r| r.old != r.new)
                .collect();
            let project = units
                .first()
                .and_then(|u| ws.backing_resource(*u))
                .and_then(|r| ws.project_of_resource(r));
            if let Some(project) = project {
                let updater = QualifiedNameUpdater::new(self.config)?;
                let edits = updater.update(ws, project, &renames, &Default::default(), self.cancel)?;
                draft.edits.merge(edits);
            }
        }
        Ok(())
    }

    fn members(
        &self,
        policy: &ReorgPolicy,
        target: ResolvedDestination,
        confirmations: &mut ConfirmationContext<'_>,
        draft: &mut Draft,
    ) -> Result<(), ReorgError> {
        let ws = self.ws;
        let copy = policy.operation == ReorgOperation::Copy;
        let destination = match target {
            ResolvedDestination::Type(t) => ws.enclosing_unit(t).map(|u| (t, u)),
            ResolvedDestination::Unit(u) => Some((u, u)),
            _ => None,
        };
        let Some((container, dest_unit)) = destination else {
            draft.status.add_fatal("Members need a type or source unit as destination");
            return Ok(());
        };
        let (Some(dest_file), Some(dest_text), Some(dest_outline)) = (
            ws.symbol(dest_unit).resource,
            ws.unit_text(dest_unit),
            ws.outline(dest_unit),
        ) else {
            draft.status.add_fatal("The destination has no editable source");
            return Ok(());
        };
        let brace = match target {
            ResolvedDestination::Type(t) => {
                let Some(brace) = ws.symbol(t).range.and_then(|r| closing_brace(dest_text, dest_outline, r)) else {
                    draft.status.add(
                        Severity::Fatal,
                        "The destination type has no closing brace",
                        Some(Element::Symbol(t)),
                    );
                    return Ok(());
                };
                Some(brace)
            }
            _ => None,
        };

        let mut selected: Vec<SymbolId> = policy.selection.symbols.iter().copied().collect();
        selected.sort_by_key(|s| (ws.enclosing_unit(*s), ws.symbol(*s).range.map(|r| r.offset)));

        let mut block = String::new();
        let mut imports = ImportRewrite::default();
        for symbol in selected {
            self.checkpoint()?;
            let node = ws.symbol(symbol);
            let Some(unit) = ws.enclosing_unit(symbol) else {
                continue;
            };
            let (Some(file), Some(text)) = (ws.symbol(unit).resource, ws.unit_text(unit)) else {
                continue;
            };

            match &node.kind {
                SymbolKind::NamespaceDeclaration => {
                    draft.status.add(
                        Severity::Info,
                        "Namespace declarations are not transferred",
                        Some(Element::Symbol(symbol)),
                    );
                    continue;
                }
                SymbolKind::ImportContainer | SymbolKind::ImportDeclaration { .. } => {
                    let declarations: Vec<SymbolId> = if node.kind == SymbolKind::ImportContainer {
                        node.children.clone()
                    } else {
                        vec![symbol]
                    };
                    for declaration in declarations {
                        let import = ws.symbol(declaration);
                        match import.kind {
                            SymbolKind::ImportDeclaration { is_static: true, .. } => {
                                imports.add_import(format!("static {}", import.name))
                            }
                            _ => imports.add_import(import.name.to_string()),
                        }
                    }
                }
                _ => {
                    let Some(range) = node.range else {
                        continue;
                    };
                    if let Some(existing) = self.clashing_member(container, symbol) {
                        if !self.overwrite(confirmations, Element::Symbol(existing)) {
                            draft.skip(ws, Element::Symbol(symbol));
                            continue;
                        }
                        if let Some(existing_range) = ws.symbol(existing).range {
                            draft
                                .edits
                                .add(dest_file, TextEdit::delete(source::expand_to_lines(dest_text, existing_range)));
                        }
                    }
                    let cut = source::expand_to_lines(text, range);
                    let snippet = &text[cut.offset..cut.end()];
                    if cut == range {
                        block.push('\n');
                    }
                    block.push_str(snippet);
                    if !snippet.ends_with('\n') {
                        block.push('\n');
                    }
                    if unit != dest_unit {
                        for name in imports_for_moved_text(ws, unit, range, dest_unit) {
                            imports.add_import(name);
                        }
                    }
                }
            }

            if !copy {
                if let Some(range) = node.range {
                    draft
                        .edits
                        .add(file, TextEdit::delete(source::expand_to_lines(text, range)));
                }
            }
        }

        if !block.is_empty() {
            let insertion = match brace {
                Some(brace) => {
                    let start = source::line_start(dest_text, brace);
                    if dest_text[start..brace].trim().is_empty() {
                        TextEdit::insert(start, block)
                    } else {
                        TextEdit::insert(brace, format!("\n{block}"))
                    }
                }
                None => {
                    let mut appended = String::new();
                    if !dest_text.ends_with('\n') {
                        appended.push('\n');
                    }
                    appended.push('\n');
                    appended.push_str(block.trim_start_matches('\n'));
                    TextEdit::insert(dest_text.len(), appended)
                }
            };
            draft.edits.add(dest_file, insertion);
        }
        if !imports.is_empty() {
            draft
                .edits
                .extend(dest_file, imports.edits(dest_text, dest_outline));
        }
        Ok(())
    }

    /// Member of `container` that `member` would collide with.
    fn clashing_member(&self, container: SymbolId, member: SymbolId) -> Option<SymbolId> {
        let ws = self.ws;
        let node = ws.symbol(member);
        ws.symbol(container).children.iter().copied().find(|c| {
            let other = ws.symbol(*c);
            *c != member
                && other.name == node.name
                && match (&other.kind, &node.kind) {
                    (SymbolKind::Method { parameters: a, .. }, SymbolKind::Method { parameters: b, .. }) => a == b,
                    (a, b) => a.is_member() && std::mem::discriminant(a) == std::mem::discriminant(b),
                }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participants::{DeltaKind, ManifestGuard};
    use crate::policy::{ReorgFlags, classify};
    use crate::query::{AutoConfirm, ConfirmAnswer, NullQueries, ScriptedQueries, StaticNewName};
    use crate::search::TextSearchEngine;
    use crate::selection::Selection;

    fn workspace() -> Workspace {
        let mut ws = Workspace::new();
        ws.build(|ws| {
            let app = ws.add_project("app").unwrap();
            let src = ws.create_folder(app, "src").unwrap();
            ws.add_source_root(src, false, vec![]).unwrap();
            let p = ws.add_folders(src, "p").unwrap();
            let q = ws.add_folders(src, "q").unwrap();
            ws.add_file(
                p,
                "A.java",
                "package p;\n\npublic class A {\n    int f;\n    void run() {}\n}\n",
            )
            .unwrap();
            ws.add_file(q, "B.java", "package q;\n\nclass B {\n}\n").unwrap();
            ws.add_file(q, "A.java", "package q;\n\nclass A {\n}\n").unwrap();
            ws.add_file(app, "treeshift.toml", "").unwrap();
        });
        ws
    }

    fn plan(
        ws: &Workspace,
        elements: Vec<Element>,
        operation: ReorgOperation,
        destination: Element,
        confirmations: &mut ConfirmationContext<'_>,
    ) -> ReorgPlan {
        let config = ReorgConfig::default();
        let mut policy = classify(ws, &Selection::from_elements(elements), operation, ReorgFlags::from(&config)).unwrap();
        policy.set_destination(ws, destination);
        let registry = ParticipantRegistry::new();
        let consumers: Vec<Box<dyn DeltaConsumer>> = vec![Box::new(ManifestGuard::new("treeshift.toml"))];
        let cancel = CancellationToken::new();
        ChangeComposer::new(ws, &config, &TextSearchEngine, &registry, &consumers, &cancel)
            .compose_reorg(&policy, confirmations)
            .unwrap()
    }

    fn unit(ws: &Workspace, path: &str) -> SymbolId {
        ws.symbol_for_resource(ws.find_resource(path).unwrap()).unwrap()
    }

    #[test]
    fn test_declined_overwrite_skips_element() {
        let ws = workspace();
        let a = unit(&ws, "app/src/p/A.java");
        let q = ws.namespace_for_folder(ws.find_resource("app/src/q").unwrap()).unwrap();
        let mut queries = ScriptedQueries::new();
        let mut names = NullQueries;
        let mut ctx = ConfirmationContext::new(&mut queries, &mut names);

        let plan = plan(&ws, vec![Element::Symbol(a)], ReorgOperation::Move, Element::Symbol(q), &mut ctx);
        assert!(plan.change.is_none());
        assert_eq!(plan.status.severity(), Severity::Info);
    }

    #[test]
    fn test_accepted_overwrite_replaces_existing() {
        let ws = workspace();
        let a = unit(&ws, "app/src/p/A.java");
        let q = ws.namespace_for_folder(ws.find_resource("app/src/q").unwrap()).unwrap();
        let mut queries = ScriptedQueries::new().answer(QueryKind::Overwrite, ConfirmAnswer::Yes);
        let mut names = NullQueries;
        let mut ctx = ConfirmationContext::new(&mut queries, &mut names);

        let plan = plan(&ws, vec![Element::Symbol(a)], ReorgOperation::Move, Element::Symbol(q), &mut ctx);
        let change = plan.change.clone().unwrap();
        let mut ws = ws.clone();
        change.perform(&mut ws).unwrap();
        let moved = ws.find_resource("app/src/q/A.java").unwrap();
        assert!(ws.resource(moved).contents.as_deref().unwrap().starts_with("package q;"));
        assert!(ws.find_resource("app/src/p/A.java").is_none());
    }

    #[test]
    fn test_copy_asks_for_new_name() {
        let ws = workspace();
        let a = unit(&ws, "app/src/p/A.java");
        let q = ws.namespace_for_folder(ws.find_resource("app/src/q").unwrap()).unwrap();
        let mut queries = NullQueries;
        let mut names = StaticNewName(Some("C.java".into()));
        let mut ctx = ConfirmationContext::new(&mut queries, &mut names);

        let plan = plan(&ws, vec![Element::Symbol(a)], ReorgOperation::Copy, Element::Symbol(q), &mut ctx);
        assert_eq!(plan.delta.get("app/src/q/C.java"), Some(DeltaKind::Added));
        let mut ws = ws.clone();
        plan.change.unwrap().perform(&mut ws).unwrap();
        let copy = ws.find_resource("app/src/q/C.java").unwrap();
        assert_eq!(
            ws.resource(copy).contents.as_deref(),
            Some("package q;\n\npublic class C {\n    int f;\n    void run() {}\n}\n")
        );
    }

    #[test]
    fn test_member_move_between_types() {
        let ws = workspace();
        let a = unit(&ws, "app/src/p/A.java");
        let ty = ws.top_level_types(a)[0];
        let run = ws
            .symbol(ty)
            .children
            .iter()
            .copied()
            .find(|m| ws.symbol(*m).name == "run")
            .unwrap();
        let b = ws.top_level_types(unit(&ws, "app/src/q/B.java"))[0];
        let mut queries = AutoConfirm;
        let mut names = AutoConfirm;
        let mut ctx = ConfirmationContext::new(&mut queries, &mut names);

        let plan = plan(&ws, vec![Element::Symbol(run)], ReorgOperation::Move, Element::Symbol(b), &mut ctx);
        let mut ws = ws.clone();
        plan.change.unwrap().perform(&mut ws).unwrap();
        let b_file = ws.find_resource("app/src/q/B.java").unwrap();
        assert_eq!(
            ws.resource(b_file).contents.as_deref(),
            Some("package q;\n\nclass B {\n    void run() {}\n}\n")
        );
        let a_file = ws.find_resource("app/src/p/A.java").unwrap();
        assert!(!ws.resource(a_file).contents.as_deref().unwrap().contains("run"));
    }

    #[test]
    fn test_member_move_carries_imports() {
        let mut ws = Workspace::new();
        ws.build(|ws| {
            let app = ws.add_project("app").unwrap();
            let src = ws.create_folder(app, "src").unwrap();
            ws.add_source_root(src, false, vec![]).unwrap();
            let p = ws.add_folders(src, "p").unwrap();
            let q = ws.add_folders(src, "q").unwrap();
            ws.add_file(
                p,
                "A.java",
                "package p;\n\nimport java.util.List;\n\npublic class A {\n    List<Helper> items;\n    int count;\n}\n",
            )
            .unwrap();
            ws.add_file(p, "Helper.java", "package p;\n\nclass Helper {\n}\n").unwrap();
            ws.add_file(q, "B.java", "package q;\n\nclass B {\n}\n").unwrap();
        });
        let a = ws.top_level_types(unit(&ws, "app/src/p/A.java"))[0];
        let items = ws.symbol(a).children[0];
        let b = ws.top_level_types(unit(&ws, "app/src/q/B.java"))[0];
        let mut queries = AutoConfirm;
        let mut names = AutoConfirm;
        let mut ctx = ConfirmationContext::new(&mut queries, &mut names);

        let plan = plan(&ws, vec![Element::Symbol(items)], ReorgOperation::Move, Element::Symbol(b), &mut ctx);
        let mut ws = ws.clone();
        plan.change.unwrap().perform(&mut ws).unwrap();
        let b_file = ws.find_resource("app/src/q/B.java").unwrap();
        let text = ws.resource(b_file).contents.as_deref().unwrap();
        assert!(text.contains("import java.util.List;\n"));
        assert!(text.contains("import p.Helper;\n"));
        assert!(text.contains("class B {\n    List<Helper> items;\n}\n"));
        assert_eq!(text.matches("import").count(), 2);
    }

    #[test]
    fn test_member_move_into_unterminated_type_is_fatal() {
        let mut ws = workspace();
        let b_file = ws.find_resource("app/src/q/B.java").unwrap();
        ws.set_text(b_file, "package q;\n\nclass B {\n    int café").unwrap();
        let a = ws.top_level_types(unit(&ws, "app/src/p/A.java"))[0];
        let run = ws.symbol(a).children[1];
        let b = ws.top_level_types(unit(&ws, "app/src/q/B.java"))[0];
        let mut queries = AutoConfirm;
        let mut names = AutoConfirm;
        let mut ctx = ConfirmationContext::new(&mut queries, &mut names);

        let plan = plan(&ws, vec![Element::Symbol(run)], ReorgOperation::Move, Element::Symbol(b), &mut ctx);
        assert!(plan.status.has_fatal());
        assert!(!plan.is_executable());
    }

    #[test]
    fn test_manifest_move_is_reported() {
        let ws = workspace();
        let manifest = ws.find_resource("app/treeshift.toml").unwrap();
        let src = ws.find_resource("app/src").unwrap();
        let mut queries = AutoConfirm;
        let mut names = AutoConfirm;
        let mut ctx = ConfirmationContext::new(&mut queries, &mut names);

        let plan = plan(&ws, vec![Element::Resource(manifest)], ReorgOperation::Move, Element::Resource(src), &mut ctx);
        assert_eq!(plan.status.severity(), Severity::Warning);
        assert!(plan.is_executable());
    }

    #[test]
    fn test_dirty_and_unsynchronized_buffers() {
        let mut ws = workspace();
        let b = ws.find_resource("app/src/q/B.java").unwrap();
        ws.set_buffer(b, BufferState::Dirty);
        let change = Change::delete_resource(&ws, b);
        assert_eq!(check_buffers(&ws, &change).severity(), Severity::Warning);

        ws.set_buffer(b, BufferState::Unsynchronized);
        let q = ws.find_resource("app/src/q").unwrap();
        let change = Change::delete_resource(&ws, q);
        assert!(check_buffers(&ws, &change).has_fatal());
    }

    #[test]
    fn test_rename_primary_type() {
        let text = "class A extends A2 {\n    A() {}\n}\n";
        assert_eq!(rename_primary_type(text, "A", "B"), "class B extends A2 {\n    A() {}\n}\n");
    }
}
