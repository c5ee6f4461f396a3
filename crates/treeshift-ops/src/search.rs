//! Textual type-reference search.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::Display;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use treeshift_core::source::{self, SourceOutline};
use treeshift_core::{SymbolId, TextRange, Workspace};

use crate::error::ReorgError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum MatchAccuracy {
    Exact,
    /// The reference may resolve to another type.
    Inaccurate,
}

/// Syntactic form of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceForm {
    /// Name of an import declaration.
    Import { is_static: bool },
    /// Written with its namespace prefix (`p.A`).
    Qualified,
    /// Bare simple name.
    Simple,
}

/// A reference to a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMatch {
    /// Unit containing the reference.
    pub unit: SymbolId,
    /// Innermost element enclosing the reference.
    pub enclosing: SymbolId,
    /// The referenced type.
    pub referenced: SymbolId,
    pub range: TextRange,
    pub form: ReferenceForm,
    pub accuracy: MatchAccuracy,
    pub inside_binary: bool,
}

/// How a type is visible where it is referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    OwnUnit,
    SingleImport,
    SameNamespace,
    Wildcard,
    Qualified,
}

/// A type referenced from a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeReference {
    pub ty: SymbolId,
    pub via: Visibility,
}

/// Search service.
pub trait SearchEngine {
    /// References to the top-level types of `unit` in its project.
    fn find_references(
        &self,
        ws: &Workspace,
        unit: SymbolId,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchMatch>, ReorgError>;

    /// Distinct workspace types referenced by `unit`.
    fn referenced_types(&self, ws: &Workspace, unit: SymbolId) -> Vec<TypeReference>;
}

/// Resolves references lexically: qualified chains, single-type imports,
/// same-namespace visibility and wildcard imports. A simple name that more
/// than one wildcard import could provide is reported inaccurate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextSearchEngine;

/// Result of resolving a simple name in a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Resolution {
    Known(String, Visibility),
    Ambiguous(Vec<String>),
    Unknown,
}

/// Names visible in a unit.
struct UnitScope {
    namespace: String,
    own: Vec<String>,
    single: HashMap<String, String>,
    wildcards: Vec<String>,
}

impl UnitScope {
    fn new(namespace: String, outline: &SourceOutline) -> Self {
        let single = outline
            .imports
            .iter()
            .filter(|i| !i.is_static && !i.on_demand)
            .map(|i| (source::simple_name(&i.name).to_string(), i.name.clone()))
            .collect();
        let wildcards = outline
            .imports
            .iter()
            .filter(|i| !i.is_static && i.on_demand)
            .map(|i| i.name.clone())
            .collect();
        Self {
            namespace,
            own: outline.types.iter().map(|t| t.name.clone()).collect(),
            single,
            wildcards,
        }
    }

    fn resolve(&self, ws: &Workspace, simple: &str) -> Resolution {
        if self.own.iter().any(|t| t == simple) {
            return Resolution::Known(source::qualify(&self.namespace, simple), Visibility::OwnUnit);
        }
        if let Some(qualified) = self.single.get(simple) {
            return Resolution::Known(qualified.clone(), Visibility::SingleImport);
        }
        let local = source::qualify(&self.namespace, simple);
        if !ws.types_named(&local).is_empty() {
            return Resolution::Known(local, Visibility::SameNamespace);
        }
        let candidates: Vec<String> = self
            .wildcards
            .iter()
            .map(|w| source::qualify(w, simple))
            .filter(|qn| !ws.types_named(qn).is_empty())
            .collect();
        match candidates.len() {
            0 => Resolution::Unknown,
            1 => Resolution::Known(candidates[0].clone(), Visibility::Wildcard),
            _ => Resolution::Ambiguous(candidates),
        }
    }
}

/// Innermost child of `unit` whose range contains `offset`.
fn enclosing_element(ws: &Workspace, unit: SymbolId, offset: usize) -> SymbolId {
    let mut current = unit;
    loop {
        let inner = ws.symbol(current).children.iter().copied().find(|c| {
            ws.symbol(*c)
                .range
                .is_some_and(|r| r.contains(offset))
        });
        match inner {
            Some(child) => current = child,
            None => return current,
        }
    }
}

/// Identifier chains outside the unit header, skipping declared names.
fn body_chains(text: &str, outline: &SourceOutline) -> Vec<source::IdentChain> {
    let header: Vec<TextRange> = outline
        .namespace
        .iter()
        .map(|n| n.range)
        .chain(outline.imports.iter().map(|i| i.range))
        .collect();
    let tokens = source::tokenize(text);
    source::identifier_chains(text, &tokens)
        .into_iter()
        .filter(|c| !c.after_dot && !c.declaration)
        .filter(|c| !header.iter().any(|h| h.contains(c.segments[0].offset)))
        .collect()
}

/// Imports `destination` needs so that the simple names used inside `range`
/// of `unit` keep resolving to the same types once the text is moved there.
///
/// Single-type imports of the source unit are carried over by name even when
/// the imported type is not part of the workspace. Types that were visible
/// through the source's own unit, namespace or a wildcard import are imported
/// by their qualified name. Names the destination already resolves the same
/// way, or binds to a different single import, are left alone.
pub fn imports_for_moved_text(ws: &Workspace, unit: SymbolId, range: TextRange, destination: SymbolId) -> Vec<String> {
    let (Some(text), Some(outline)) = (ws.unit_text(unit), ws.outline(unit)) else {
        return Vec::new();
    };
    let Some(dest_outline) = ws.outline(destination) else {
        return Vec::new();
    };
    let from = UnitScope::new(ws.namespace_name(unit), outline);
    let to = UnitScope::new(ws.namespace_name(destination), dest_outline);

    let mut needed: Vec<String> = Vec::new();
    for chain in body_chains(text, outline) {
        let first = chain.segments[0];
        if !range.contains(first.offset) {
            continue;
        }
        let simple = &text[first.offset..first.end()];
        let qualified = match from.single.get(simple) {
            Some(imported) => imported.clone(),
            None => match from.resolve(ws, simple) {
                Resolution::Known(qn, Visibility::OwnUnit | Visibility::SameNamespace | Visibility::Wildcard) => qn,
                _ => continue,
            },
        };
        // Types of the default namespace cannot be imported.
        if !qualified.contains('.') {
            continue;
        }
        let visible = matches!(to.resolve(ws, simple), Resolution::Known(qn, _) if qn == qualified);
        if visible || to.single.contains_key(simple) || needed.contains(&qualified) {
            continue;
        }
        needed.push(qualified);
    }
    needed
}

impl SearchEngine for TextSearchEngine {
    fn find_references(
        &self,
        ws: &Workspace,
        unit: SymbolId,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchMatch>, ReorgError> {
        let namespace = ws.namespace_name(unit);
        let targets: HashMap<String, SymbolId> = ws
            .top_level_types(unit)
            .into_iter()
            .map(|t| (ws.symbol(t).name.to_string(), t))
            .collect();
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let qualified: HashMap<String, SymbolId> = targets
            .iter()
            .map(|(name, id)| (source::qualify(&namespace, name), *id))
            .collect();

        let Some(project) = ws.project_of(unit) else {
            return Ok(Vec::new());
        };

        let mut matches = Vec::new();
        for referencing in ws.project_units(project) {
            if cancel.is_cancelled() {
                return Err(ReorgError::Cancelled);
            }
            let (Some(text), Some(outline)) = (ws.unit_text(referencing), ws.outline(referencing)) else {
                continue;
            };
            let inside_binary = ws.symbol(referencing).binary;
            let mut push = |range: TextRange, referenced: SymbolId, form, accuracy| {
                matches.push(SearchMatch {
                    unit: referencing,
                    enclosing: enclosing_element(ws, referencing, range.offset),
                    referenced,
                    range,
                    form,
                    accuracy,
                    inside_binary,
                });
            };

            for import in &outline.imports {
                // `import p.A;`, `import static p.A.m;`, `import static p.A.*;`
                let type_name = if import.is_static && !import.on_demand {
                    import.qualifier()
                } else if !import.on_demand || import.is_static {
                    import.name.as_str()
                } else {
                    continue;
                };
                if let Some(ty) = qualified.get(type_name) {
                    push(
                        import.name_range,
                        *ty,
                        ReferenceForm::Import {
                            is_static: import.is_static,
                        },
                        MatchAccuracy::Exact,
                    );
                }
            }

            let scope = UnitScope::new(ws.namespace_name(referencing), outline);
            for chain in body_chains(text, outline) {
                let qualified_hit = (2..=chain.len()).find_map(|k| {
                    qualified
                        .get(&chain.prefix_text(text, k))
                        .map(|ty| (k, *ty))
                });
                if let Some((k, ty)) = qualified_hit {
                    push(chain.prefix_range(k), ty, ReferenceForm::Qualified, MatchAccuracy::Exact);
                    continue;
                }

                let first = chain.segments[0];
                let simple = &text[first.offset..first.end()];
                let Some(ty) = targets.get(simple) else {
                    continue;
                };
                let target = source::qualify(&namespace, simple);
                let accuracy = match scope.resolve(ws, simple) {
                    Resolution::Known(qn, _) if qn == target => MatchAccuracy::Exact,
                    Resolution::Ambiguous(candidates) if candidates.contains(&target) => {
                        MatchAccuracy::Inaccurate
                    }
                    _ => continue,
                };
                push(first, *ty, ReferenceForm::Simple, accuracy);
            }
        }

        trace!(
            unit = %ws.qualified_name(unit),
            matches = matches.len(),
            "Searched references"
        );
        Ok(matches)
    }

    fn referenced_types(&self, ws: &Workspace, unit: SymbolId) -> Vec<TypeReference> {
        let (Some(text), Some(outline)) = (ws.unit_text(unit), ws.outline(unit)) else {
            return Vec::new();
        };
        let scope = UnitScope::new(ws.namespace_name(unit), outline);

        let mut found: Vec<TypeReference> = Vec::new();
        let mut add = |qualified: &str, via: Visibility| {
            if let Some(ty) = ws.types_named(qualified).first().copied() {
                if !found.iter().any(|r| r.ty == ty) {
                    found.push(TypeReference { ty, via });
                }
            }
        };

        for chain in body_chains(text, outline) {
            let qualified_hit = (2..=chain.len())
                .map(|k| chain.prefix_text(text, k))
                .find(|prefix| !ws.types_named(prefix).is_empty());
            if let Some(prefix) = qualified_hit {
                add(&prefix, Visibility::Qualified);
                continue;
            }
            let first = chain.segments[0];
            if let Resolution::Known(qn, via) = scope.resolve(ws, &text[first.offset..first.end()]) {
                add(&qn, via);
            }
        }
        found
    }
}
