//! Reference repair for source units moved to another namespace.

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use treeshift_core::source::{self, SourceOutline, TextEdit};
use treeshift_core::{
    Element, RefactoringStatus, ResourceId, Severity, SymbolId, TextRange, Workspace,
};

use crate::change::Change;
use crate::error::ReorgError;
use crate::search::{MatchAccuracy, ReferenceForm, SearchEngine, SearchMatch, Visibility};

/// Text edits grouped per file.
#[derive(Debug, Clone, Default)]
pub struct TextChangeSet {
    edits: IndexMap<ResourceId, Vec<TextEdit>>,
}

impl TextChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edit unless the file already has it or one replacing an
    /// overlapping range.
    pub fn add(&mut self, file: ResourceId, edit: TextEdit) {
        let edits = self.edits.entry(file).or_default();
        let clashes = edits.iter().any(|e| {
            *e == edit || (e.range.len > 0 && edit.range.len > 0 && e.range.overlaps(&edit.range))
        });
        if !clashes {
            edits.push(edit);
        }
    }

    pub fn extend(&mut self, file: ResourceId, edits: impl IntoIterator<Item = TextEdit>) {
        for edit in edits {
            self.add(file, edit);
        }
    }

    pub fn edits_for(&self, file: ResourceId) -> &[TextEdit] {
        self.edits.get(&file).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, file: ResourceId) -> bool {
        self.edits.get(&file).is_some_and(|e| !e.is_empty())
    }

    /// Drop the edits of a file that is deleted anyway.
    pub fn discard(&mut self, file: ResourceId) {
        self.edits.shift_remove(&file);
    }

    pub fn merge(&mut self, other: TextChangeSet) {
        for (file, edits) in other.edits {
            self.extend(file, edits);
        }
    }

    pub fn len(&self) -> usize {
        self.edits.values().filter(|e| !e.is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn files(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.edits
            .iter()
            .filter(|(_, e)| !e.is_empty())
            .map(|(f, _)| *f)
    }

    /// One edit change per file.
    pub fn into_changes(self, ws: &Workspace) -> Vec<Change> {
        self.edits
            .into_iter()
            .filter(|(_, edits)| !edits.is_empty())
            .map(|(file, edits)| Change::edit_text(ws, file, edits))
            .collect()
    }
}

/// Pending import changes of one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportRewrite {
    add: IndexSet<String>,
    remove: IndexSet<TextRange>,
}

impl ImportRewrite {
    /// Add `import <name>;` (`p.*` for a wildcard).
    pub fn add_import(&mut self, name: impl Into<String>) {
        self.add.insert(name.into());
    }

    /// Remove the import statement at `range`.
    pub fn remove_import(&mut self, range: TextRange) {
        self.remove.insert(range);
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// Render as non-overlapping edits. Imports that are already present are
    /// not added twice.
    pub fn edits(&self, text: &str, outline: &SourceOutline) -> Vec<TextEdit> {
        let mut edits = Vec::new();
        let mut present = HashSet::new();
        for import in &outline.imports {
            if self.remove.contains(&import.range) {
                edits.push(TextEdit::delete(source::expand_to_lines(text, import.range)));
            } else if !import.is_static {
                present.insert(import.display_name());
            }
        }

        let added: Vec<&String> = self.add.iter().filter(|n| !present.contains(*n)).collect();
        if added.is_empty() {
            return edits;
        }
        let (offset, blank) = outline.import_insertion_point(text);
        let mut block = String::new();
        if offset > 0 && !text[..offset].ends_with('\n') {
            block.push('\n');
        }
        if blank {
            block.push('\n');
        }
        for name in added {
            block.push_str(&format!("import {name};\n"));
        }
        if offset == 0 {
            block.push('\n');
        }
        edits.push(TextEdit::insert(offset, block));
        edits
    }
}

/// Import rewrites batched per unit, so every unit receives one edit set.
#[derive(Debug, Clone, Default)]
pub struct ImportRewrites {
    units: IndexMap<SymbolId, ImportRewrite>,
}

impl ImportRewrites {
    pub fn unit(&mut self, unit: SymbolId) -> &mut ImportRewrite {
        self.units.entry(unit).or_default()
    }

    pub fn get(&self, unit: SymbolId) -> Option<&ImportRewrite> {
        self.units.get(&unit)
    }

    pub fn is_empty(&self) -> bool {
        self.units.values().all(ImportRewrite::is_empty)
    }

    /// Render every unit's rewrite into `edits`.
    pub fn render(self, ws: &Workspace, edits: &mut TextChangeSet) {
        for (unit, rewrite) in self.units {
            if rewrite.is_empty() {
                continue;
            }
            let (Some(file), Some(text), Some(outline)) =
                (ws.backing_resource(unit), ws.unit_text(unit), ws.outline(unit))
            else {
                continue;
            };
            edits.extend(file, rewrite.edits(text, outline));
        }
    }
}

/// Edit turning the namespace declaration of `text` into `namespace`
/// (`""` removes it).
pub fn namespace_declaration_edit(text: &str, outline: &SourceOutline, namespace: &str) -> Option<TextEdit> {
    match (&outline.namespace, namespace.is_empty()) {
        (Some(decl), false) if decl.name == namespace => None,
        (Some(decl), false) => Some(TextEdit::replace(decl.name_range, namespace)),
        (Some(decl), true) => Some(TextEdit::delete(source::expand_to_lines(text, decl.range))),
        (None, false) => Some(TextEdit::insert(0, format!("package {namespace};\n\n"))),
        (None, true) => None,
    }
}

/// `text` with its namespace declaration set to `namespace`.
pub fn with_namespace_declaration(text: &str, namespace: &str) -> String {
    let outline = SourceOutline::parse(text);
    match namespace_declaration_edit(text, &outline, namespace) {
        Some(edit) => source::apply_edits(text, &[edit]),
        None => text.to_string(),
    }
}

/// Byte length of the first `segments` dotted segments of `text`.
fn prefix_len(text: &str, segments: usize) -> Option<usize> {
    if segments == 0 {
        return Some(0);
    }
    text.match_indices('.').nth(segments - 1).map(|(i, _)| i)
}

/// Edit replacing the namespace prefix of the dotted name at `range`.
fn prefix_edit(text: &str, range: TextRange, old_ns: &str, new_ns: &str) -> Option<TextEdit> {
    let matched = &text[range.offset..range.end()];
    if old_ns.is_empty() {
        return (!new_ns.is_empty()).then(|| TextEdit::insert(range.offset, format!("{new_ns}.")));
    }
    let len = prefix_len(matched, old_ns.split('.').count())?;
    if new_ns.is_empty() {
        Some(TextEdit::delete(TextRange::new(range.offset, len + 1)))
    } else {
        Some(TextEdit::replace(TextRange::new(range.offset, len), new_ns))
    }
}

/// Result of repairing references for a unit move.
#[derive(Debug, Clone, Default)]
pub struct ReferenceUpdate {
    pub edits: TextChangeSet,
    pub status: RefactoringStatus,
    /// References inside units without editable source.
    pub binary_references: Vec<SearchMatch>,
}

/// Keeps the source tree compilable when units change namespace.
pub struct MoveReferenceUpdater<'a> {
    ws: &'a Workspace,
    search: &'a dyn SearchEngine,
    cancel: &'a CancellationToken,
}

impl<'a> MoveReferenceUpdater<'a> {
    pub fn new(ws: &'a Workspace, search: &'a dyn SearchEngine, cancel: &'a CancellationToken) -> Self {
        Self { ws, search, cancel }
    }

    /// Repair imports and qualified names for moving `units` into the
    /// namespace `destination`. Namespace declarations are left to the
    /// caller.
    pub fn update(&self, units: &[SymbolId], destination: SymbolId) -> Result<ReferenceUpdate, ReorgError> {
        let ws = self.ws;
        let new_ns = ws.symbol(destination).name.to_string();
        let moved: HashSet<SymbolId> = units.iter().copied().collect();

        let mut update = ReferenceUpdate::default();
        let mut imports = ImportRewrites::default();
        for &unit in units {
            if self.cancel.is_cancelled() {
                return Err(ReorgError::Cancelled);
            }
            let old_ns = ws.namespace_name(unit);
            if old_ns == new_ns {
                debug!(unit = %ws.qualified_name(unit), "Namespace unchanged, no reference repair");
                continue;
            }
            self.repair_outgoing(unit, &old_ns, &moved, &mut imports);
            self.repair_incoming(unit, &new_ns, &mut imports);
            self.repair_references(unit, &old_ns, &new_ns, &moved, &mut imports, &mut update)?;
        }
        imports.render(ws, &mut update.edits);

        debug!(
            units = units.len(),
            files = update.edits.len(),
            binary = update.binary_references.len(),
            "Computed reference updates"
        );
        Ok(update)
    }

    /// Types of the old namespace were visible without import.
    fn repair_outgoing(
        &self,
        unit: SymbolId,
        old_ns: &str,
        moved: &HashSet<SymbolId>,
        imports: &mut ImportRewrites,
    ) {
        if old_ns.is_empty() {
            return;
        }
        let ws = self.ws;
        for reference in self.search.referenced_types(ws, unit) {
            if reference.via != Visibility::SameNamespace {
                continue;
            }
            let owner = ws.enclosing_unit(reference.ty);
            if owner.is_some_and(|u| moved.contains(&u)) {
                continue;
            }
            imports.unit(unit).add_import(ws.qualified_name(reference.ty));
        }
    }

    /// Imports of the destination namespace become redundant.
    fn repair_incoming(&self, unit: SymbolId, new_ns: &str, imports: &mut ImportRewrites) {
        let Some(outline) = self.ws.outline(unit) else {
            return;
        };
        for import in outline.imports.iter().filter(|i| !i.is_static) {
            let redundant = if import.on_demand {
                import.name == new_ns
            } else {
                import.qualifier() == new_ns
            };
            if redundant {
                imports.unit(unit).remove_import(import.range);
            }
        }
    }

    fn repair_references(
        &self,
        unit: SymbolId,
        old_ns: &str,
        new_ns: &str,
        moved: &HashSet<SymbolId>,
        imports: &mut ImportRewrites,
        update: &mut ReferenceUpdate,
    ) -> Result<(), ReorgError> {
        let ws = self.ws;
        for found in self.search.find_references(ws, unit, self.cancel)? {
            if moved.contains(&found.unit) {
                continue;
            }
            if found.accuracy == MatchAccuracy::Inaccurate {
                warn!(unit = %ws.qualified_name(found.unit), "Skipping inaccurate reference");
                update.status.add(
                    Severity::Info,
                    format!(
                        "Reference in '{}' may not refer to '{}' and was not updated",
                        ws.qualified_name(found.unit),
                        ws.qualified_name(found.referenced)
                    ),
                    Some(Element::Symbol(found.unit)),
                );
                continue;
            }
            if found.inside_binary {
                update.binary_references.push(found);
                continue;
            }
            let (Some(file), Some(text), Some(outline)) = (
                ws.backing_resource(found.unit),
                ws.unit_text(found.unit),
                ws.outline(found.unit),
            ) else {
                continue;
            };

            match found.form {
                ReferenceForm::Import { .. } if new_ns.is_empty() => {
                    if let Some(import) = outline.imports.iter().find(|i| i.name_range == found.range) {
                        imports.unit(found.unit).remove_import(import.range);
                    }
                }
                ReferenceForm::Import { .. } | ReferenceForm::Qualified => {
                    if let Some(edit) = prefix_edit(text, found.range, old_ns, new_ns) {
                        update.edits.add(file, edit);
                    }
                }
                ReferenceForm::Simple => {
                    let type_name = ws.symbol(found.referenced).name.to_string();
                    if self.needs_import(found.unit, outline, old_ns, new_ns, &type_name) {
                        imports
                            .unit(found.unit)
                            .add_import(source::qualify(new_ns, &type_name));
                    }
                }
            }
        }
        Ok(())
    }

    /// Whether a bare reference in `referencing` needs a new import.
    fn needs_import(
        &self,
        referencing: SymbolId,
        outline: &SourceOutline,
        old_ns: &str,
        new_ns: &str,
        type_name: &str,
    ) -> bool {
        if new_ns.is_empty() || self.ws.namespace_name(referencing) == new_ns {
            return false;
        }
        let old_qualified = source::qualify(old_ns, type_name);
        !outline.imports.iter().filter(|i| !i.is_static).any(|i| {
            if i.on_demand {
                i.name == new_ns || i.name == old_ns
            } else {
                // The explicit import is rewritten in place.
                i.name == old_qualified
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::TextSearchEngine;

    const A: &str = "package p;\n\nimport q.B;\n\npublic class A {\n    Helper h;\n    B b;\n}\n";

    fn workspace() -> Workspace {
        let mut ws = Workspace::new();
        ws.build(|ws| {
            let app = ws.add_project("app").unwrap();
            let src = ws.create_folder(app, "src").unwrap();
            ws.add_source_root(src, false, vec![]).unwrap();
            let p = ws.add_folders(src, "p").unwrap();
            let q = ws.add_folders(src, "q").unwrap();
            let r = ws.add_folders(src, "r").unwrap();
            ws.add_file(p, "A.java", A).unwrap();
            ws.add_file(p, "Helper.java", "package p;\n\nclass Helper {\n}\n")
                .unwrap();
            ws.add_file(p, "D.java", "package p;\n\nclass D {\n    A a;\n}\n")
                .unwrap();
            ws.add_file(q, "B.java", "package q;\n\nclass B {\n}\n").unwrap();
            ws.add_file(
                r,
                "C.java",
                "package r;\n\nimport p.A;\n\nclass C {\n    A a;\n    p.A b;\n}\n",
            )
            .unwrap();
        });
        ws
    }

    fn updated(ws: &Workspace, update: &ReferenceUpdate, path: &str) -> String {
        let file = ws.find_resource(path).unwrap();
        let text = ws.resource(file).contents.clone().unwrap();
        source::apply_edits(&text, update.edits.edits_for(file))
    }

    #[test]
    fn test_move_unit_repairs_references() {
        let ws = workspace();
        let unit = ws.symbol_for_resource(ws.find_resource("app/src/p/A.java").unwrap()).unwrap();
        let q = ws.namespace_for_folder(ws.find_resource("app/src/q").unwrap()).unwrap();
        let cancel = CancellationToken::new();

        let update = MoveReferenceUpdater::new(&ws, &TextSearchEngine, &cancel)
            .update(&[unit], q)
            .unwrap();

        assert_eq!(
            updated(&ws, &update, "app/src/p/A.java"),
            "package p;\n\nimport p.Helper;\n\npublic class A {\n    Helper h;\n    B b;\n}\n"
        );
        assert_eq!(
            updated(&ws, &update, "app/src/r/C.java"),
            "package r;\n\nimport q.A;\n\nclass C {\n    A a;\n    q.A b;\n}\n"
        );
        assert_eq!(
            updated(&ws, &update, "app/src/p/D.java"),
            "package p;\n\nimport q.A;\n\nclass D {\n    A a;\n}\n"
        );
        assert!(update.status.is_ok());
    }

    #[test]
    fn test_same_namespace_is_skipped() {
        let ws = workspace();
        let unit = ws.symbol_for_resource(ws.find_resource("app/src/p/A.java").unwrap()).unwrap();
        let p = ws.namespace_of(unit).unwrap();
        let cancel = CancellationToken::new();
        let update = MoveReferenceUpdater::new(&ws, &TextSearchEngine, &cancel)
            .update(&[unit], p)
            .unwrap();
        assert!(update.edits.is_empty());
    }

    #[test]
    fn test_namespace_declaration_edit() {
        let text = "package p;\n\nclass A {}\n";
        assert_eq!(with_namespace_declaration(text, "q.r"), "package q.r;\n\nclass A {}\n");
        assert_eq!(with_namespace_declaration(text, ""), "\nclass A {}\n");
        assert_eq!(
            with_namespace_declaration("class A {}\n", "q"),
            "package q;\n\nclass A {}\n"
        );
        assert_eq!(with_namespace_declaration(text, "p"), text);
    }

    #[test]
    fn test_import_rewrite_skips_present_imports() {
        let text = "package r;\n\nimport p.A;\nimport q.*;\n\nclass C {}\n";
        let outline = SourceOutline::parse(text);
        let mut rewrite = ImportRewrite::default();
        rewrite.add_import("p.A");
        rewrite.add_import("s.T");
        rewrite.remove_import(outline.imports[1].range);

        let result = source::apply_edits(text, &rewrite.edits(text, &outline));
        assert_eq!(result, "package r;\n\nimport p.A;\nimport s.T;\n\nclass C {}\n");
    }

    #[test]
    fn test_prefix_edit_handles_default_namespace() {
        let text = "x p.q.A y";
        let range = TextRange::new(2, 5);
        let to_r = prefix_edit(text, range, "p.q", "r").unwrap();
        assert_eq!(source::apply_edits(text, &[to_r]), "x r.A y");
        let to_default = prefix_edit(text, range, "p.q", "").unwrap();
        assert_eq!(source::apply_edits(text, &[to_default]), "x A y");
        let from_default = prefix_edit("x A y", TextRange::new(2, 1), "", "s").unwrap();
        assert_eq!(source::apply_edits("x A y", &[from_default]), "x s.A y");
    }
}
