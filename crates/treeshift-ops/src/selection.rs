//! Heterogeneous selections of resources and symbols.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use treeshift_core::{Element, ResourceId, SymbolId, Workspace};

/// An unordered pair of resource and symbol sets. Duplicates collapse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub resources: IndexSet<ResourceId>,
    pub symbols: IndexSet<SymbolId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a selection from mixed elements.
    pub fn from_elements(elements: impl IntoIterator<Item = Element>) -> Self {
        let mut selection = Self::new();
        for element in elements {
            selection.insert(element);
        }
        selection
    }

    pub fn from_resources(resources: impl IntoIterator<Item = ResourceId>) -> Self {
        Self {
            resources: resources.into_iter().collect(),
            symbols: IndexSet::new(),
        }
    }

    pub fn from_symbols(symbols: impl IntoIterator<Item = SymbolId>) -> Self {
        Self {
            resources: IndexSet::new(),
            symbols: symbols.into_iter().collect(),
        }
    }

    /// Add an element; returns false when it was already selected.
    pub fn insert(&mut self, element: Element) -> bool {
        match element {
            Element::Resource(id) => self.resources.insert(id),
            Element::Symbol(id) => self.symbols.insert(id),
        }
    }

    pub fn contains(&self, element: Element) -> bool {
        match element {
            Element::Resource(id) => self.resources.contains(&id),
            Element::Symbol(id) => self.symbols.contains(&id),
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len() + self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.symbols.is_empty()
    }

    /// All elements, resources first.
    pub fn elements(&self) -> impl Iterator<Item = Element> + '_ {
        self.resources
            .iter()
            .copied()
            .map(Element::Resource)
            .chain(self.symbols.iter().copied().map(Element::Symbol))
    }

    /// Replace resources that back a source unit by the unit itself.
    pub fn prefer_symbols(mut self, ws: &Workspace) -> Self {
        let mut resources = IndexSet::new();
        for resource in self.resources {
            match ws.symbol_for_resource(resource) {
                Some(unit) if ws.symbol(unit).kind.is_unit() => {
                    self.symbols.insert(unit);
                }
                _ => {
                    resources.insert(resource);
                }
            }
        }
        self.resources = resources;
        self
    }

    /// True when any selected resource is linked.
    pub fn has_linked_resources(&self, ws: &Workspace) -> bool {
        self.resources.iter().any(|r| ws.resource(*r).linked)
            || self
                .symbols
                .iter()
                .filter_map(|s| ws.symbol(*s).resource)
                .any(|r| ws.resource(r).linked)
    }
}

/// Common direct parent of every selected element.
///
/// Resources and symbols are checked independently. When both are present,
/// the resource parent must correspond to the symbol parent, either through
/// its symbol-tree equivalent or as the symbol parent's backing resource.
pub fn common_parent(ws: &Workspace, selection: &Selection) -> Option<Element> {
    if selection.is_empty() {
        return None;
    }

    let resource_parent = match single(selection.resources.iter().map(|r| ws.resource(*r).parent)) {
        Shared::Empty => None,
        Shared::One(parent) => Some(parent?),
        Shared::Many => return None,
    };

    let symbol_parent = match single(selection.symbols.iter().map(|s| ws.symbol(*s).parent)) {
        Shared::Empty => None,
        Shared::One(parent) => Some(parent?),
        Shared::Many => return None,
    };

    match (resource_parent, symbol_parent) {
        (Some(r), None) => Some(Element::Resource(r)),
        (None, Some(s)) => Some(Element::Symbol(s)),
        (Some(r), Some(s)) => {
            let agrees = ws.symbol_for_resource(r) == Some(s) || ws.symbol(s).resource == Some(r);
            agrees.then_some(Element::Symbol(s))
        }
        (None, None) => None,
    }
}

enum Shared<T> {
    Empty,
    One(T),
    Many,
}

fn single<T: PartialEq>(mut values: impl Iterator<Item = T>) -> Shared<T> {
    let Some(first) = values.next() else {
        return Shared::Empty;
    };
    if values.all(|v| v == first) {
        Shared::One(first)
    } else {
        Shared::Many
    }
}

/// Drop elements whose ancestor is also selected.
///
/// Symbols are compared along the symbol tree. With `include_resources`,
/// resources are also dropped when a selected resource is their ancestor or
/// when an ancestor folder backs a selected symbol.
pub fn remove_descendants(ws: &Workspace, selection: &Selection, include_resources: bool) -> Selection {
    let symbols: IndexSet<SymbolId> = selection
        .symbols
        .iter()
        .copied()
        .filter(|s| {
            !ws.symbol_ancestors(*s)
                .any(|a| selection.symbols.contains(&a))
        })
        .collect();

    let resources: IndexSet<ResourceId> = if include_resources {
        selection
            .resources
            .iter()
            .copied()
            .filter(|r| {
                !ws.resource_ancestors(*r).any(|a| {
                    selection.resources.contains(&a)
                        || ws
                            .symbols_backed_by(a)
                            .iter()
                            .any(|s| selection.symbols.contains(s))
                })
            })
            .collect()
    } else {
        selection.resources.clone()
    };

    Selection { resources, symbols }
}
