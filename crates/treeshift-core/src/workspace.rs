//! Arena-backed workspace holding the resource tree and the derived symbol
//! tree.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use compact_str::CompactString;
use globset::GlobSet;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::config::build_glob_set;
use crate::error::ModelError;
use crate::node::{
    BufferState, Element, ResourceId, ResourceKind, ResourceNode, SymbolId, SymbolKind, SymbolNode,
    TextRange,
};
use crate::source::{self, MemberKind, SourceOutline};

/// Declaration of a source root on a folder (or archive file).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRootDecl {
    /// Backed by an archive; contents are binary.
    pub archive: bool,
    /// Paths (relative to the root folder) that are not part of the root.
    pub exclusions: Vec<String>,
}

/// Key identifying a symbol across reconciliations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SymbolKey {
    Backed {
        resource: ResourceId,
        tag: u8,
    },
    Member {
        parent: SymbolId,
        tag: u8,
        name: CompactString,
        ordinal: usize,
    },
}

/// The two parallel trees of a workspace.
///
/// Resources are owned by an arena; deleted nodes stay in place as tombstones
/// so that undo can restore them under the same id. The symbol tree is
/// rebuilt from the resources by [`Workspace::reconcile`] after every
/// mutation, reusing symbol ids for nodes that persist.
#[derive(Debug, Clone)]
pub struct Workspace {
    resources: Vec<ResourceNode>,
    symbols: Vec<SymbolNode>,
    root: ResourceId,
    source_extension: String,
    roots: IndexMap<ResourceId, SourceRootDecl>,
    archive_references: IndexMap<ResourceId, Vec<ResourceId>>,
    keys: HashMap<SymbolKey, SymbolId>,
    backed: HashMap<ResourceId, Vec<SymbolId>>,
    projects: Vec<SymbolId>,
    types: IndexMap<String, Vec<SymbolId>>,
    outlines: HashMap<ResourceId, (u64, SourceOutline)>,
    stamp: u64,
    deferred: bool,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    /// Create an empty workspace using `.java` source units.
    pub fn new() -> Self {
        Self::with_source_extension("java")
    }

    /// Create an empty workspace with a custom source-unit extension.
    pub fn with_source_extension(extension: impl Into<String>) -> Self {
        let root = ResourceId::new(0);
        Self {
            resources: vec![ResourceNode::new(root, "", ResourceKind::Root, None)],
            symbols: Vec::new(),
            root,
            source_extension: extension.into(),
            roots: IndexMap::new(),
            archive_references: IndexMap::new(),
            keys: HashMap::new(),
            backed: HashMap::new(),
            projects: Vec::new(),
            types: IndexMap::new(),
            outlines: HashMap::new(),
            stamp: 0,
            deferred: false,
        }
    }

    // ==================== Node access ====================

    /// The abstract workspace root.
    pub fn root(&self) -> ResourceId {
        self.root
    }

    pub fn source_extension(&self) -> &str {
        &self.source_extension
    }

    /// Get a resource node. Ids are only handed out by this arena.
    pub fn resource(&self, id: ResourceId) -> &ResourceNode {
        &self.resources[id.index()]
    }

    pub fn get_resource(&self, id: ResourceId) -> Option<&ResourceNode> {
        self.resources.get(id.index())
    }

    /// Get a symbol node. Ids are only handed out by this arena.
    pub fn symbol(&self, id: SymbolId) -> &SymbolNode {
        &self.symbols[id.index()]
    }

    pub fn get_symbol(&self, id: SymbolId) -> Option<&SymbolNode> {
        self.symbols.get(id.index())
    }

    pub fn resource_exists(&self, id: ResourceId) -> bool {
        self.get_resource(id).is_some_and(|r| r.exists)
    }

    pub fn symbol_exists(&self, id: SymbolId) -> bool {
        self.get_symbol(id).is_some_and(|s| s.exists)
    }

    pub fn element_exists(&self, element: Element) -> bool {
        match element {
            Element::Resource(id) => self.resource_exists(id),
            Element::Symbol(id) => self.symbol_exists(id),
        }
    }

    /// Modification stamp of a resource.
    pub fn stamp(&self, id: ResourceId) -> u64 {
        self.resource(id).stamp
    }

    /// Live project symbols.
    pub fn projects(&self) -> &[SymbolId] {
        &self.projects
    }

    /// Iterate over all live resources (excluding the root).
    pub fn live_resources(&self) -> impl Iterator<Item = &ResourceNode> {
        self.resources
            .iter()
            .filter(|r| r.exists && r.kind != ResourceKind::Root)
    }

    /// Iterate over all live symbols.
    pub fn live_symbols(&self) -> impl Iterator<Item = &SymbolNode> {
        self.symbols.iter().filter(|s| s.exists)
    }

    // ==================== Paths ====================

    /// Workspace-relative path (`project/folder/file`).
    pub fn resource_path(&self, id: ResourceId) -> PathBuf {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            let node = self.resource(cur);
            if node.kind == ResourceKind::Root {
                break;
            }
            names.push(node.name.as_str());
            current = node.parent;
        }
        names.iter().rev().collect()
    }

    /// Path of `id` relative to `base`, with `/` separators.
    pub fn relative_path(&self, base: ResourceId, id: ResourceId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            if cur == base {
                break;
            }
            let node = self.resource(cur);
            names.push(node.name.as_str());
            current = node.parent;
        }
        names.reverse();
        names.join("/")
    }

    /// Resolve a workspace-relative path to a live resource.
    pub fn find_resource(&self, path: impl AsRef<Path>) -> Option<ResourceId> {
        let mut current = self.root;
        for component in path.as_ref().components() {
            match component {
                Component::Normal(name) => current = self.child_named(current, name.to_str()?)?,
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(current)
    }

    /// Live child of `parent` with the given name.
    pub fn child_named(&self, parent: ResourceId, name: &str) -> Option<ResourceId> {
        self.resource(parent)
            .children
            .iter()
            .copied()
            .find(|c| self.resource(*c).name == name)
    }

    // ==================== Resource ancestry ====================

    /// Strict ancestors of a resource, innermost first (ending at the root).
    pub fn resource_ancestors(&self, id: ResourceId) -> impl Iterator<Item = ResourceId> + '_ {
        std::iter::successors(self.resource(id).parent, move |p| self.resource(*p).parent)
    }

    /// True when `ancestor` is a strict ancestor of `id`.
    pub fn is_resource_ancestor(&self, ancestor: ResourceId, id: ResourceId) -> bool {
        self.resource_ancestors(id).any(|a| a == ancestor)
    }

    /// Project containing (or equal to) a resource.
    pub fn project_of_resource(&self, id: ResourceId) -> Option<ResourceId> {
        std::iter::once(id)
            .chain(self.resource_ancestors(id))
            .find(|r| self.resource(*r).is_project())
    }

    /// A resource is accessible when it and all its ancestors are.
    pub fn is_accessible(&self, id: ResourceId) -> bool {
        std::iter::once(id)
            .chain(self.resource_ancestors(id))
            .all(|r| self.resource(r).accessible)
    }

    /// Live descendants in pre-order, excluding `id` itself.
    pub fn resource_descendants(&self, id: ResourceId) -> Vec<ResourceId> {
        let mut result = Vec::new();
        let mut stack: Vec<ResourceId> = self.resource(id).children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            result.push(current);
            stack.extend(self.resource(current).children.iter().rev().copied());
        }
        result
    }

    // ==================== Source roots and archives ====================

    /// Source-root declaration of a folder, if any.
    pub fn source_root_decl(&self, folder: ResourceId) -> Option<&SourceRootDecl> {
        self.roots.get(&folder)
    }

    /// True when the resource or one of its live descendants is a source
    /// root.
    pub fn contains_source_root(&self, id: ResourceId) -> bool {
        self.roots
            .keys()
            .any(|r| self.resource_exists(*r) && (*r == id || self.is_resource_ancestor(id, *r)))
    }

    /// Archives referenced by a project.
    pub fn archive_references(&self, project: ResourceId) -> &[ResourceId] {
        self.archive_references
            .get(&project)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Live projects referencing `archive`, other than the one holding it.
    pub fn projects_referencing(&self, archive: ResourceId) -> Vec<ResourceId> {
        let owner = self.project_of_resource(archive);
        self.archive_references
            .iter()
            .filter(|(project, archives)| {
                Some(**project) != owner && self.resource_exists(**project) && archives.contains(&archive)
            })
            .map(|(project, _)| *project)
            .collect()
    }

    // ==================== Symbol queries ====================

    /// Strict symbol ancestors, innermost first.
    pub fn symbol_ancestors(&self, id: SymbolId) -> impl Iterator<Item = SymbolId> + '_ {
        std::iter::successors(self.symbol(id).parent, move |p| self.symbol(*p).parent)
    }

    /// True when `ancestor` is a strict logical ancestor of `id`.
    pub fn is_symbol_ancestor(&self, ancestor: SymbolId, id: SymbolId) -> bool {
        self.symbol_ancestors(id).any(|a| a == ancestor)
    }

    /// Live symbols backed by a resource.
    pub fn symbols_backed_by(&self, id: ResourceId) -> &[SymbolId] {
        self.backed.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Symbol-tree equivalent of a resource. A source-root folder maps to its
    /// source root rather than to its default namespace.
    pub fn symbol_for_resource(&self, id: ResourceId) -> Option<SymbolId> {
        self.symbols_backed_by(id)
            .iter()
            .copied()
            .min_by_key(|s| match self.symbol(*s).kind {
                SymbolKind::Project => 0,
                SymbolKind::SourceRoot { .. } => 1,
                SymbolKind::Namespace => 2,
                _ => 3,
            })
    }

    /// Namespace backed by a folder.
    pub fn namespace_for_folder(&self, id: ResourceId) -> Option<SymbolId> {
        self.symbols_backed_by(id)
            .iter()
            .copied()
            .find(|s| self.symbol(*s).kind.is_namespace())
    }

    /// Resource of the symbol or of its nearest backed ancestor.
    pub fn backing_resource(&self, id: SymbolId) -> Option<ResourceId> {
        std::iter::once(id)
            .chain(self.symbol_ancestors(id))
            .find_map(|s| self.symbol(s).resource)
    }

    /// The source unit containing (or equal to) a symbol.
    pub fn enclosing_unit(&self, id: SymbolId) -> Option<SymbolId> {
        std::iter::once(id)
            .chain(self.symbol_ancestors(id))
            .find(|s| self.symbol(*s).kind.is_unit())
    }

    /// Top-level or nested type containing (or equal to) a symbol.
    pub fn enclosing_type(&self, id: SymbolId) -> Option<SymbolId> {
        std::iter::once(id)
            .chain(self.symbol_ancestors(id))
            .find(|s| self.symbol(*s).kind.is_type())
    }

    pub fn source_root_of(&self, id: SymbolId) -> Option<SymbolId> {
        std::iter::once(id)
            .chain(self.symbol_ancestors(id))
            .find(|s| self.symbol(*s).kind.is_source_root())
    }

    pub fn project_of(&self, id: SymbolId) -> Option<SymbolId> {
        std::iter::once(id)
            .chain(self.symbol_ancestors(id))
            .find(|s| self.symbol(*s).kind.is_project())
    }

    /// Namespace of a unit or of anything inside one.
    pub fn namespace_of(&self, id: SymbolId) -> Option<SymbolId> {
        std::iter::once(id)
            .chain(self.symbol_ancestors(id))
            .find(|s| self.symbol(*s).kind.is_namespace())
    }

    /// Read-only state derived from the backing resource.
    pub fn is_read_only_symbol(&self, id: SymbolId) -> bool {
        self.symbol(id).binary
            || self
                .backing_resource(id)
                .is_some_and(|r| self.resource(r).read_only)
    }

    /// Dotted qualified name of a symbol.
    pub fn qualified_name(&self, id: SymbolId) -> String {
        let node = self.symbol(id);
        match &node.kind {
            SymbolKind::Project | SymbolKind::SourceRoot { .. } | SymbolKind::Namespace => {
                node.name.to_string()
            }
            SymbolKind::SourceUnit => {
                let stem = node
                    .name
                    .rsplit_once('.')
                    .map(|(s, _)| s)
                    .unwrap_or(node.name.as_str());
                source::qualify(&self.namespace_name(id), stem)
            }
            SymbolKind::ImportDeclaration { .. }
            | SymbolKind::NamespaceDeclaration
            | SymbolKind::ImportContainer => node.name.to_string(),
            _ => match node.parent {
                Some(parent) if self.symbol(parent).kind.is_unit() => {
                    source::qualify(&self.namespace_name(id), &node.name)
                }
                Some(parent) => format!("{}.{}", self.qualified_name(parent), node.name),
                None => node.name.to_string(),
            },
        }
    }

    /// Name of the namespace containing a symbol (empty for the default
    /// namespace).
    pub fn namespace_name(&self, id: SymbolId) -> String {
        self.namespace_of(id)
            .map(|ns| self.symbol(ns).name.to_string())
            .unwrap_or_default()
    }

    /// Namespaces of a source root.
    pub fn namespaces_of_root(&self, root: SymbolId) -> Vec<SymbolId> {
        self.symbol(root)
            .children
            .iter()
            .copied()
            .filter(|s| self.symbol(*s).kind.is_namespace())
            .collect()
    }

    /// Namespace of a source root with the given name.
    pub fn find_namespace(&self, root: SymbolId, name: &str) -> Option<SymbolId> {
        self.namespaces_of_root(root)
            .into_iter()
            .find(|ns| self.symbol(*ns).name == name)
    }

    /// All namespaces of a project with the given name (one per source root
    /// declaring it).
    pub fn namespaces_named(&self, project: SymbolId, name: &str) -> Vec<SymbolId> {
        self.symbol(project)
            .children
            .iter()
            .flat_map(|root| self.find_namespace(*root, name))
            .collect()
    }

    /// Namespaces of the same source root nested below `ns` by name.
    pub fn sub_namespaces(&self, ns: SymbolId) -> Vec<SymbolId> {
        let name = &self.symbol(ns).name;
        if name.is_empty() {
            return Vec::new();
        }
        let prefix = format!("{name}.");
        self.symbol(ns)
            .parent
            .map(|root| {
                self.namespaces_of_root(root)
                    .into_iter()
                    .filter(|s| self.symbol(*s).name.starts_with(&prefix))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Source units of a namespace.
    pub fn units_of(&self, ns: SymbolId) -> Vec<SymbolId> {
        self.symbol(ns)
            .children
            .iter()
            .copied()
            .filter(|s| self.symbol(*s).kind.is_unit())
            .collect()
    }

    /// All live source units of a project.
    pub fn project_units(&self, project: SymbolId) -> Vec<SymbolId> {
        self.symbol(project)
            .children
            .iter()
            .flat_map(|root| self.namespaces_of_root(*root))
            .flat_map(|ns| self.units_of(ns))
            .collect()
    }

    /// All live source units of the workspace.
    pub fn all_units(&self) -> Vec<SymbolId> {
        self.projects
            .iter()
            .flat_map(|p| self.project_units(*p))
            .collect()
    }

    /// Top-level types declared by a unit.
    pub fn top_level_types(&self, unit: SymbolId) -> Vec<SymbolId> {
        self.symbol(unit)
            .children
            .iter()
            .copied()
            .filter(|s| self.symbol(*s).kind.is_type())
            .collect()
    }

    /// Top-level types with the given qualified name.
    pub fn types_named(&self, qualified: &str) -> &[SymbolId] {
        self.types.get(qualified).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Import declarations of a unit.
    pub fn imports_of(&self, unit: SymbolId) -> Vec<SymbolId> {
        self.symbol(unit)
            .children
            .iter()
            .filter(|s| matches!(self.symbol(**s).kind, SymbolKind::ImportContainer))
            .flat_map(|c| self.symbol(*c).children.iter().copied())
            .collect()
    }

    /// Text of a unit's backing file.
    pub fn unit_text(&self, unit: SymbolId) -> Option<&str> {
        let file = self.symbol(unit).resource?;
        self.resource(file).contents.as_deref()
    }

    /// Cached outline of a unit.
    pub fn outline(&self, unit: SymbolId) -> Option<&SourceOutline> {
        let file = self.symbol(unit).resource?;
        self.outlines.get(&file).map(|(_, outline)| outline)
    }

    // ==================== Reconciliation ====================

    /// Rebuild the symbol tree from the resource tree.
    pub fn reconcile(&mut self) {
        for symbol in &mut self.symbols {
            symbol.exists = false;
            symbol.children.clear();
        }
        self.backed.clear();
        self.projects.clear();
        self.types.clear();

        let projects: Vec<ResourceId> = self
            .resource(self.root)
            .children
            .iter()
            .copied()
            .filter(|r| self.resource(*r).is_project())
            .collect();

        for project in projects {
            let name = self.resource(project).name.clone();
            let symbol = self.intern(
                SymbolKey::Backed {
                    resource: project,
                    tag: SymbolKind::Project.tag(),
                },
                name,
                SymbolKind::Project,
                None,
                Some(project),
                None,
            );
            self.projects.push(symbol);

            if !self.resource(project).accessible {
                continue;
            }

            let roots: Vec<(ResourceId, SourceRootDecl)> = self
                .roots
                .iter()
                .filter(|(folder, _)| {
                    self.resource_exists(**folder) && self.project_of_resource(**folder) == Some(project)
                })
                .map(|(folder, decl)| (*folder, decl.clone()))
                .collect();

            for (folder, decl) in roots {
                self.reconcile_root(symbol, project, folder, &decl);
            }
        }

        let resources = &self.resources;
        self.outlines.retain(|id, _| resources[id.index()].exists);

        trace!(
            resources = self.resources.len(),
            symbols = self.symbols.len(),
            "Reconciled workspace"
        );
    }

    fn reconcile_root(
        &mut self,
        project_symbol: SymbolId,
        project: ResourceId,
        folder: ResourceId,
        decl: &SourceRootDecl,
    ) {
        let mut name = self.relative_path(project, folder);
        if name.is_empty() {
            name = ".".to_string();
        }
        let root = self.intern(
            SymbolKey::Backed {
                resource: folder,
                tag: SymbolKind::SourceRoot { archive: false }.tag(),
            },
            name.into(),
            SymbolKind::SourceRoot {
                archive: decl.archive,
            },
            Some(project_symbol),
            Some(folder),
            None,
        );
        self.symbols[root.index()].binary = decl.archive;

        if self.resource(folder).is_file() {
            return;
        }

        let exclusions = match build_glob_set(&decl.exclusions) {
            Ok(set) => Some(set),
            Err(e) => {
                warn!(error = %e, "Ignoring source-root exclusions");
                None
            }
        };

        self.reconcile_namespace(
            root,
            folder,
            folder,
            String::new(),
            decl.archive,
            exclusions.as_ref(),
        );
    }

    fn reconcile_namespace(
        &mut self,
        root: SymbolId,
        root_folder: ResourceId,
        folder: ResourceId,
        name: String,
        binary: bool,
        exclusions: Option<&GlobSet>,
    ) {
        let ns = self.intern(
            SymbolKey::Backed {
                resource: folder,
                tag: SymbolKind::Namespace.tag(),
            },
            name.as_str().into(),
            SymbolKind::Namespace,
            Some(root),
            Some(folder),
            None,
        );
        self.symbols[ns.index()].binary = binary;

        let mut nested = Vec::new();
        for child in self.resource(folder).children.clone() {
            let relative = self.relative_path(root_folder, child);
            if exclusions.is_some_and(|set| set.is_match(&relative)) {
                continue;
            }

            let node = self.resource(child);
            if node.is_folder() {
                if self.roots.contains_key(&child) || !source::is_identifier(&node.name) {
                    continue;
                }
                nested.push((child, source::qualify(&name, &node.name)));
            } else if node.is_file() && node.extension() == Some(self.source_extension.as_str()) {
                self.reconcile_unit(ns, child, &name, binary);
            }
        }

        for (child, child_name) in nested {
            self.reconcile_namespace(root, root_folder, child, child_name, binary, exclusions);
        }
    }

    fn reconcile_unit(&mut self, ns: SymbolId, file: ResourceId, ns_name: &str, binary: bool) {
        let name = self.resource(file).name.clone();
        let unit = self.intern(
            SymbolKey::Backed {
                resource: file,
                tag: SymbolKind::SourceUnit.tag(),
            },
            name,
            SymbolKind::SourceUnit,
            Some(ns),
            Some(file),
            None,
        );
        self.symbols[unit.index()].binary = binary;

        let Some(outline) = self.outline_for(file) else {
            return;
        };

        let mut ordinals = HashMap::new();
        if let Some(decl) = &outline.namespace {
            self.intern_member(
                unit,
                &decl.name,
                SymbolKind::NamespaceDeclaration,
                decl.range,
                binary,
                &mut ordinals,
            );
        }

        if let (Some(first), Some(last)) = (outline.imports.first(), outline.imports.last()) {
            let container = self.intern_member(
                unit,
                "imports",
                SymbolKind::ImportContainer,
                TextRange::between(first.range.offset, last.range.end()),
                binary,
                &mut ordinals,
            );
            let mut import_ordinals = HashMap::new();
            for import in &outline.imports {
                self.intern_member(
                    container,
                    &import.display_name(),
                    SymbolKind::ImportDeclaration {
                        is_static: import.is_static,
                        on_demand: import.on_demand,
                    },
                    import.range,
                    binary,
                    &mut import_ordinals,
                );
            }
        }

        for decl in &outline.types {
            let ty = self.intern_member(
                unit,
                &decl.name,
                SymbolKind::Type,
                decl.range,
                binary,
                &mut ordinals,
            );
            self.types
                .entry(source::qualify(ns_name, &decl.name))
                .or_default()
                .push(ty);

            let mut member_ordinals = HashMap::new();
            for member in &decl.members {
                let kind = match &member.kind {
                    MemberKind::Type => SymbolKind::Type,
                    MemberKind::Field { type_name } => SymbolKind::Field {
                        type_name: type_name.into(),
                    },
                    MemberKind::Method {
                        parameters,
                        return_type,
                    } => SymbolKind::Method {
                        parameters: *parameters,
                        return_type: return_type.into(),
                    },
                    MemberKind::Initializer => SymbolKind::Initializer,
                };
                self.intern_member(
                    ty,
                    &member.name,
                    kind,
                    member.range,
                    binary,
                    &mut member_ordinals,
                );
            }
        }
    }

    /// Parse (or reuse) the outline of a file.
    fn outline_for(&mut self, file: ResourceId) -> Option<SourceOutline> {
        let node = &self.resources[file.index()];
        let text = node.contents.as_ref()?;
        if let Some((stamp, outline)) = self.outlines.get(&file) {
            if *stamp == node.stamp {
                return Some(outline.clone());
            }
        }
        let outline = SourceOutline::parse(text);
        self.outlines.insert(file, (node.stamp, outline.clone()));
        Some(outline)
    }

    fn intern_member(
        &mut self,
        parent: SymbolId,
        name: &str,
        kind: SymbolKind,
        range: TextRange,
        binary: bool,
        ordinals: &mut HashMap<(u8, CompactString), usize>,
    ) -> SymbolId {
        let name = CompactString::from(name);
        let counter = ordinals.entry((kind.tag(), name.clone())).or_insert(0);
        let ordinal = *counter;
        *counter += 1;

        let id = self.intern(
            SymbolKey::Member {
                parent,
                tag: kind.tag(),
                name: name.clone(),
                ordinal,
            },
            name,
            kind,
            Some(parent),
            None,
            Some(range),
        );
        self.symbols[id.index()].binary = binary;
        id
    }

    fn intern(
        &mut self,
        key: SymbolKey,
        name: CompactString,
        kind: SymbolKind,
        parent: Option<SymbolId>,
        resource: Option<ResourceId>,
        range: Option<TextRange>,
    ) -> SymbolId {
        let reusable = self
            .keys
            .get(&key)
            .copied()
            .filter(|id| !self.symbols[id.index()].exists);
        let id = match reusable {
            Some(id) => id,
            None => {
                let id = SymbolId::new(self.symbols.len() as u32);
                self.symbols.push(SymbolNode::new(id, name.clone(), kind.clone()));
                self.keys.insert(key, id);
                id
            }
        };

        let node = &mut self.symbols[id.index()];
        node.name = name;
        node.kind = kind;
        node.parent = parent;
        node.resource = resource;
        node.range = range;
        node.exists = true;
        node.binary = false;

        if let Some(resource) = resource {
            self.backed.entry(resource).or_default().push(id);
        }
        if let Some(parent) = parent {
            self.symbols[parent.index()].children.push(id);
        }
        id
    }

    // ==================== Mutations ====================

    /// Run several mutations and reconcile once at the end.
    pub fn build<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = std::mem::replace(&mut self.deferred, true);
        let result = f(self);
        self.deferred = previous;
        self.finish();
        result
    }

    fn finish(&mut self) {
        if !self.deferred {
            self.reconcile();
        }
    }

    fn touch(&mut self, id: ResourceId) {
        self.stamp += 1;
        self.resources[id.index()].stamp = self.stamp;
    }

    fn check_name(name: &str) -> Result<(), ModelError> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(ModelError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn check_live(&self, id: ResourceId) -> Result<&ResourceNode, ModelError> {
        match self.get_resource(id) {
            Some(node) if node.exists => Ok(node),
            Some(_) => Err(ModelError::Missing {
                path: self.resource_path(id),
            }),
            None => Err(ModelError::UnknownResource(id)),
        }
    }

    fn check_container(&self, id: ResourceId) -> Result<(), ModelError> {
        if !self.check_live(id)?.kind.is_container() {
            return Err(ModelError::NotAContainer {
                path: self.resource_path(id),
            });
        }
        Ok(())
    }

    fn check_free(&self, parent: ResourceId, name: &str) -> Result<(), ModelError> {
        if self.child_named(parent, name).is_some() {
            return Err(ModelError::NameCollision {
                parent: self.resource_path(parent),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn insert(
        &mut self,
        parent: ResourceId,
        name: &str,
        kind: ResourceKind,
    ) -> Result<ResourceId, ModelError> {
        Self::check_name(name)?;
        self.check_container(parent)?;
        if (parent == self.root) != (kind == ResourceKind::Project) {
            return Err(ModelError::NotAContainer {
                path: self.resource_path(parent),
            });
        }
        self.check_free(parent, name)?;

        let id = ResourceId::new(self.resources.len() as u32);
        self.resources
            .push(ResourceNode::new(id, name, kind, Some(parent)));
        self.resources[parent.index()].children.push(id);
        self.touch(id);
        self.touch(parent);
        Ok(id)
    }

    /// Add a project under the workspace root.
    pub fn add_project(&mut self, name: &str) -> Result<ResourceId, ModelError> {
        let id = self.insert(self.root, name, ResourceKind::Project)?;
        self.finish();
        Ok(id)
    }

    /// Add a folder (also used to create namespace folders).
    pub fn create_folder(&mut self, parent: ResourceId, name: &str) -> Result<ResourceId, ModelError> {
        let id = self.insert(parent, name, ResourceKind::Folder)?;
        self.finish();
        Ok(id)
    }

    /// Create every missing folder of a `/`-separated path below `base`.
    /// Newly created folders are appended to `created`.
    pub fn ensure_folder_path(
        &mut self,
        base: ResourceId,
        path: &str,
        created: &mut Vec<ResourceId>,
    ) -> Result<ResourceId, ModelError> {
        let mut current = base;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = match self.child_named(current, segment) {
                Some(existing) => {
                    self.check_container(existing)?;
                    existing
                }
                None => {
                    let id = self.insert(current, segment, ResourceKind::Folder)?;
                    created.push(id);
                    id
                }
            };
        }
        self.finish();
        Ok(current)
    }

    /// Add a folder path, returning the innermost folder.
    pub fn add_folders(&mut self, base: ResourceId, path: &str) -> Result<ResourceId, ModelError> {
        self.ensure_folder_path(base, path, &mut Vec::new())
    }

    /// Add a text file.
    pub fn add_file(
        &mut self,
        parent: ResourceId,
        name: &str,
        contents: impl Into<String>,
    ) -> Result<ResourceId, ModelError> {
        let id = self.insert(parent, name, ResourceKind::File)?;
        self.resources[id.index()].contents = Some(contents.into());
        self.finish();
        Ok(id)
    }

    /// Add a file without text contents.
    pub fn add_binary_file(&mut self, parent: ResourceId, name: &str) -> Result<ResourceId, ModelError> {
        let id = self.insert(parent, name, ResourceKind::File)?;
        self.finish();
        Ok(id)
    }

    /// Declare a folder (or archive file) as a source root.
    pub fn add_source_root(
        &mut self,
        folder: ResourceId,
        archive: bool,
        exclusions: Vec<String>,
    ) -> Result<(), ModelError> {
        let node = self.check_live(folder)?;
        if node.kind == ResourceKind::Root || (node.is_file() && !archive) {
            return Err(ModelError::NotAContainer {
                path: self.resource_path(folder),
            });
        }
        self.roots.insert(folder, SourceRootDecl { archive, exclusions });
        self.finish();
        Ok(())
    }

    /// Record that `project` references the archive file `archive`.
    pub fn add_archive_reference(
        &mut self,
        project: ResourceId,
        archive: ResourceId,
    ) -> Result<(), ModelError> {
        if !self.check_live(project)?.is_project() {
            return Err(ModelError::NotAContainer {
                path: self.resource_path(project),
            });
        }
        if !self.check_live(archive)?.is_file() {
            return Err(ModelError::NotAFile {
                path: self.resource_path(archive),
            });
        }
        let archives = self.archive_references.entry(project).or_default();
        if !archives.contains(&archive) {
            archives.push(archive);
        }
        Ok(())
    }

    pub fn set_read_only(&mut self, id: ResourceId, read_only: bool) {
        self.resources[id.index()].read_only = read_only;
    }

    pub fn set_linked(&mut self, id: ResourceId, linked: bool) {
        self.resources[id.index()].linked = linked;
    }

    pub fn set_accessible(&mut self, id: ResourceId, accessible: bool) {
        self.resources[id.index()].accessible = accessible;
        self.finish();
    }

    pub fn set_buffer(&mut self, id: ResourceId, state: BufferState) {
        self.resources[id.index()].buffer = state;
    }

    /// Replace the text of a file.
    pub fn set_text(&mut self, file: ResourceId, text: impl Into<String>) -> Result<(), ModelError> {
        if !self.check_live(file)?.is_file() {
            return Err(ModelError::NotAFile {
                path: self.resource_path(file),
            });
        }
        self.resources[file.index()].contents = Some(text.into());
        self.touch(file);
        self.finish();
        Ok(())
    }

    fn check_transfer(
        &self,
        id: ResourceId,
        parent: ResourceId,
        name: &str,
    ) -> Result<(), ModelError> {
        let kind = self.check_live(id)?.kind;
        if matches!(kind, ResourceKind::Root | ResourceKind::Project) || parent == self.root {
            return Err(ModelError::Immovable {
                path: self.resource_path(id),
            });
        }
        self.check_container(parent)?;
        if parent == id || self.is_resource_ancestor(id, parent) {
            return Err(ModelError::IntoItself {
                path: self.resource_path(id),
            });
        }
        Self::check_name(name)?;
        match self.child_named(parent, name) {
            Some(existing) if existing != id => Err(ModelError::NameCollision {
                parent: self.resource_path(parent),
                name: name.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Move (and optionally rename) a resource into `parent`.
    pub fn move_resource(
        &mut self,
        id: ResourceId,
        parent: ResourceId,
        new_name: Option<&str>,
    ) -> Result<(), ModelError> {
        let name: CompactString = match new_name {
            Some(name) => name.into(),
            None => self.check_live(id)?.name.clone(),
        };
        self.check_transfer(id, parent, &name)?;

        let old_parent = self.resource(id).parent;
        if let Some(old) = old_parent {
            self.resources[old.index()].children.retain(|c| *c != id);
            self.touch(old);
        }
        self.resources[parent.index()].children.push(id);
        let node = &mut self.resources[id.index()];
        node.parent = Some(parent);
        node.name = name;
        self.touch(id);
        self.touch(parent);
        self.finish();
        Ok(())
    }

    /// Deep-copy a resource into `parent`. Source-root declarations of copied
    /// folders are copied along.
    pub fn copy_resource(
        &mut self,
        id: ResourceId,
        parent: ResourceId,
        new_name: Option<&str>,
    ) -> Result<ResourceId, ModelError> {
        let name: CompactString = match new_name {
            Some(name) => name.into(),
            None => self.check_live(id)?.name.clone(),
        };
        self.check_transfer(id, parent, &name)?;
        self.check_free(parent, &name)?;

        let copy = self.copy_subtree(id, parent, name);
        self.touch(parent);
        self.finish();
        Ok(copy)
    }

    fn copy_subtree(&mut self, source: ResourceId, parent: ResourceId, name: CompactString) -> ResourceId {
        let original = self.resource(source).clone();
        let id = ResourceId::new(self.resources.len() as u32);
        let mut node = ResourceNode::new(id, name, original.kind, Some(parent));
        node.contents = original.contents;
        node.read_only = original.read_only;
        node.linked = original.linked;
        self.resources.push(node);
        self.resources[parent.index()].children.push(id);
        self.touch(id);

        if let Some(decl) = self.roots.get(&source).cloned() {
            self.roots.insert(id, decl);
        }
        for child in original.children {
            let child_name = self.resource(child).name.clone();
            self.copy_subtree(child, id, child_name);
        }
        id
    }

    /// Delete a resource. The node stays in the arena and can be restored.
    pub fn delete_resource(&mut self, id: ResourceId) -> Result<(), ModelError> {
        if self.check_live(id)?.kind == ResourceKind::Root {
            return Err(ModelError::Immovable {
                path: self.resource_path(id),
            });
        }
        if let Some(parent) = self.resource(id).parent {
            self.resources[parent.index()].children.retain(|c| *c != id);
            self.touch(parent);
        }
        self.mark_subtree(id, false);
        self.touch(id);
        self.finish();
        Ok(())
    }

    /// Bring a deleted resource back under its previous parent.
    pub fn restore_resource(&mut self, id: ResourceId) -> Result<(), ModelError> {
        let node = self.get_resource(id).ok_or(ModelError::UnknownResource(id))?;
        if node.exists {
            return Ok(());
        }
        let name = node.name.clone();
        let parent = node.parent.ok_or(ModelError::UnknownResource(id))?;
        self.check_container(parent)?;
        self.check_free(parent, &name)?;

        self.resources[parent.index()].children.push(id);
        self.mark_subtree(id, true);
        self.touch(id);
        self.touch(parent);
        self.finish();
        Ok(())
    }

    fn mark_subtree(&mut self, id: ResourceId, exists: bool) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &mut self.resources[current.index()];
            node.exists = exists;
            stack.extend(node.children.iter().copied());
        }
    }

    /// Create a namespace (and its folders) in a source root.
    pub fn create_namespace(&mut self, root: SymbolId, name: &str) -> Result<SymbolId, ModelError> {
        if !source::is_namespace_name(name) || name.is_empty() {
            return Err(ModelError::InvalidName {
                name: name.to_string(),
            });
        }
        let folder = self
            .symbol(root)
            .resource
            .ok_or(ModelError::UnknownSymbol(root))?;
        let leaf = self.ensure_folder_path(folder, &name.replace('.', "/"), &mut Vec::new())?;
        self.namespace_for_folder(leaf)
            .ok_or_else(|| ModelError::InvalidName {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "package p;\n\nimport q.B;\n\npublic class A {\n    int f;\n    int getF() { return f; }\n}\n";

    fn sample() -> (Workspace, ResourceId, ResourceId) {
        let mut ws = Workspace::new();
        let project = ws.add_project("proj").unwrap();
        let src = ws.create_folder(project, "src").unwrap();
        ws.add_source_root(src, false, vec![]).unwrap();
        let p = ws.add_folders(src, "p").unwrap();
        let file = ws.add_file(p, "A.java", A).unwrap();
        ws.add_folders(src, "q/sub").unwrap();
        (ws, src, file)
    }

    #[test]
    fn test_reconcile_builds_symbol_tree() {
        let (ws, src, file) = sample();
        let root = ws.symbol_for_resource(src).unwrap();
        assert!(ws.symbol(root).kind.is_source_root());

        let names: Vec<_> = ws
            .namespaces_of_root(root)
            .into_iter()
            .map(|ns| ws.symbol(ns).name.to_string())
            .collect();
        assert_eq!(names, vec!["", "p", "q", "q.sub"]);

        let unit = ws.symbol_for_resource(file).unwrap();
        assert_eq!(ws.qualified_name(unit), "p.A");
        let types = ws.top_level_types(unit);
        assert_eq!(types.len(), 1);
        assert_eq!(ws.types_named("p.A"), &types[..]);
        assert_eq!(ws.symbol(types[0]).children.len(), 2);
        assert_eq!(ws.imports_of(unit).len(), 1);

        let q = ws.find_namespace(root, "q").unwrap();
        assert_eq!(ws.sub_namespaces(q).len(), 1);
    }

    #[test]
    fn test_symbol_ids_survive_moves() {
        let (mut ws, src, file) = sample();
        let unit = ws.symbol_for_resource(file).unwrap();
        let ty = ws.top_level_types(unit)[0];

        let q = ws.find_resource("proj/src/q").unwrap();
        ws.move_resource(file, q, None).unwrap();

        assert_eq!(ws.symbol_for_resource(file), Some(unit));
        assert_eq!(ws.top_level_types(unit), vec![ty]);
        assert_eq!(ws.namespace_name(unit), "q");
        assert_eq!(ws.resource_path(file), PathBuf::from("proj/src/q/A.java"));
        assert!(ws.is_resource_ancestor(src, file));
    }

    #[test]
    fn test_delete_and_restore() {
        let (mut ws, _, file) = sample();
        let unit = ws.symbol_for_resource(file).unwrap();
        let p = ws.resource(file).parent.unwrap();

        ws.delete_resource(p).unwrap();
        assert!(!ws.resource_exists(file));
        assert!(!ws.symbol_exists(unit));
        assert!(ws.find_resource("proj/src/p").is_none());

        ws.restore_resource(p).unwrap();
        assert!(ws.resource_exists(file));
        assert_eq!(ws.symbol_for_resource(file), Some(unit));
    }

    #[test]
    fn test_copy_is_deep_and_collisions_rejected() {
        let (mut ws, src, _) = sample();
        let p = ws.find_resource("proj/src/p").unwrap();
        let q = ws.find_resource("proj/src/q").unwrap();

        let copy = ws.copy_resource(p, q, None).unwrap();
        assert!(ws.find_resource("proj/src/q/p/A.java").is_some());
        assert_ne!(copy, p);

        let err = ws.copy_resource(p, src, None).unwrap_err();
        assert!(matches!(err, ModelError::NameCollision { .. }));
        let err = ws.move_resource(src, p, None).unwrap_err();
        assert!(matches!(err, ModelError::IntoItself { .. }));
    }

    #[test]
    fn test_stamps_and_text() {
        let (mut ws, _, file) = sample();
        let before = ws.stamp(file);
        ws.set_text(file, "package p;\nclass A {}\nclass B {}\n").unwrap();
        assert!(ws.stamp(file) > before);
        let unit = ws.symbol_for_resource(file).unwrap();
        assert_eq!(ws.top_level_types(unit).len(), 2);
    }

    #[test]
    fn test_archive_roots_are_binary() {
        let mut ws = Workspace::new();
        let project = ws.add_project("lib").unwrap();
        let classes = ws.create_folder(project, "classes").unwrap();
        ws.add_source_root(classes, true, vec![]).unwrap();
        let file = ws.add_file(classes, "L.java", "class L {}").unwrap();

        let unit = ws.symbol_for_resource(file).unwrap();
        assert!(ws.symbol(unit).binary);
        assert!(ws.is_read_only_symbol(ws.top_level_types(unit)[0]));
    }

    #[test]
    fn test_exclusions_and_nested_roots() {
        let mut ws = Workspace::new();
        let project = ws.add_project("proj").unwrap();
        ws.build(|ws| {
            let src = ws.create_folder(project, "src").unwrap();
            ws.add_source_root(src, false, vec!["gen".to_string(), "gen/**".to_string()])
                .unwrap();
            ws.add_folders(src, "gen/x").unwrap();
            let nested = ws.add_folders(src, "nested").unwrap();
            ws.add_source_root(nested, false, vec![]).unwrap();
        });

        let src = ws.find_resource("proj/src").unwrap();
        let root = ws.symbol_for_resource(src).unwrap();
        let names: Vec<_> = ws
            .namespaces_of_root(root)
            .into_iter()
            .map(|ns| ws.symbol(ns).name.to_string())
            .collect();
        assert_eq!(names, vec![""]);
        let project_symbol = ws.projects()[0];
        assert_eq!(ws.symbol(project_symbol).children.len(), 2);
    }

    #[test]
    fn test_create_namespace() {
        let (mut ws, src, _) = sample();
        let root = ws.symbol_for_resource(src).unwrap();
        let ns = ws.create_namespace(root, "r.s").unwrap();
        assert_eq!(ws.symbol(ns).name, "r.s");
        assert!(ws.find_namespace(root, "r").is_some());
    }
}
