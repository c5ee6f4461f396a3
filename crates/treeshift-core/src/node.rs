//! Resource and symbol node types.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Identifier of a node in the resource tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub u32);

impl ResourceId {
    /// Create a new ResourceId from a raw index.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Arena slot of this id.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of a node in the symbol tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

impl SymbolId {
    /// Create a new SymbolId from a raw index.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Arena slot of this id.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A node of either tree.
///
/// Used wherever a value may name a resource or a symbol, most notably as the
/// destination of a move or copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Element {
    Resource(ResourceId),
    Symbol(SymbolId),
}

impl Element {
    pub fn as_resource(self) -> Option<ResourceId> {
        match self {
            Self::Resource(id) => Some(id),
            Self::Symbol(_) => None,
        }
    }

    pub fn as_symbol(self) -> Option<SymbolId> {
        match self {
            Self::Symbol(id) => Some(id),
            Self::Resource(_) => None,
        }
    }
}

impl From<ResourceId> for Element {
    fn from(id: ResourceId) -> Self {
        Self::Resource(id)
    }
}

impl From<SymbolId> for Element {
    fn from(id: SymbolId) -> Self {
        Self::Symbol(id)
    }
}

/// Byte range inside a source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextRange {
    pub offset: usize,
    pub len: usize,
}

impl TextRange {
    pub fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// Range spanning `start..end`.
    pub fn between(start: usize, end: usize) -> Self {
        Self {
            offset: start,
            len: end.saturating_sub(start),
        }
    }

    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Check whether `other` lies completely inside this range.
    pub fn contains_range(&self, other: &TextRange) -> bool {
        other.offset >= self.offset && other.end() <= self.end()
    }

    /// Check whether an offset lies inside this range.
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.offset && offset < self.end()
    }

    /// Check whether the two ranges share at least one byte.
    pub fn overlaps(&self, other: &TextRange) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Type of resource-tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ResourceKind {
    /// The abstract workspace root.
    Root,
    /// A project (top-level container).
    Project,
    /// A folder.
    Folder,
    /// A regular file.
    File,
}

impl ResourceKind {
    /// Check if nodes of this kind can hold children.
    pub fn is_container(&self) -> bool {
        !matches!(self, Self::File)
    }
}

/// Editor buffer state of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferState {
    /// Buffer matches disk.
    #[default]
    Saved,
    /// Buffer has unsaved edits.
    Dirty,
    /// Buffer and disk diverged; edits cannot be applied safely.
    Unsynchronized,
}

/// A file, folder, project or the workspace root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Unique identifier for this node.
    pub id: ResourceId,

    /// File/folder name (not full path).
    pub name: CompactString,

    /// Node type.
    pub kind: ResourceKind,

    /// Containing folder or project. Kept after deletion so the node can be
    /// restored.
    pub parent: Option<ResourceId>,

    /// Live children, in insertion order.
    pub children: Vec<ResourceId>,

    /// Whether the resource currently exists.
    pub exists: bool,

    /// Read-only flag.
    pub read_only: bool,

    /// Physically located outside its nominal parent.
    pub linked: bool,

    /// Closed projects and their members are inaccessible.
    pub accessible: bool,

    /// Text contents (files only, `None` for binary content).
    pub contents: Option<String>,

    /// Editor buffer state.
    pub buffer: BufferState,

    /// Modification stamp, bumped on every mutation.
    pub stamp: u64,
}

impl ResourceNode {
    pub(crate) fn new(
        id: ResourceId,
        name: impl Into<CompactString>,
        kind: ResourceKind,
        parent: Option<ResourceId>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            parent,
            children: Vec::new(),
            exists: true,
            read_only: false,
            linked: false,
            accessible: true,
            contents: None,
            buffer: BufferState::Saved,
            stamp: 0,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == ResourceKind::File
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ResourceKind::Folder
    }

    pub fn is_project(&self) -> bool {
        self.kind == ResourceKind::Project
    }

    /// File extension, if any.
    pub fn extension(&self) -> Option<&str> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        (!stem.is_empty()).then_some(ext)
    }
}

/// Type of symbol-tree node and its kind-specific data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Project,
    SourceRoot {
        /// Backed by an archive; its contents are not editable.
        archive: bool,
    },
    Namespace,
    SourceUnit,
    Type,
    Field {
        type_name: CompactString,
    },
    Method {
        parameters: usize,
        return_type: CompactString,
    },
    Initializer,
    ImportContainer,
    ImportDeclaration {
        is_static: bool,
        on_demand: bool,
    },
    NamespaceDeclaration,
}

impl SymbolKind {
    pub fn is_project(&self) -> bool {
        matches!(self, Self::Project)
    }

    pub fn is_source_root(&self) -> bool {
        matches!(self, Self::SourceRoot { .. })
    }

    pub fn is_namespace(&self) -> bool {
        matches!(self, Self::Namespace)
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Self::SourceUnit)
    }

    pub fn is_type(&self) -> bool {
        matches!(self, Self::Type)
    }

    pub fn is_field(&self) -> bool {
        matches!(self, Self::Field { .. })
    }

    pub fn is_method(&self) -> bool {
        matches!(self, Self::Method { .. })
    }

    /// Types, fields, methods and initializers.
    pub fn is_member(&self) -> bool {
        matches!(
            self,
            Self::Type | Self::Field { .. } | Self::Method { .. } | Self::Initializer
        )
    }

    /// Import and namespace declarations (and the import container).
    pub fn is_declaration(&self) -> bool {
        matches!(
            self,
            Self::ImportContainer | Self::ImportDeclaration { .. } | Self::NamespaceDeclaration
        )
    }

    /// Every kind that only exists inside a source unit.
    pub fn is_inside_unit(&self) -> bool {
        self.is_member() || self.is_declaration()
    }

    /// Short human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::SourceRoot { .. } => "source root",
            Self::Namespace => "namespace",
            Self::SourceUnit => "source unit",
            Self::Type => "type",
            Self::Field { .. } => "field",
            Self::Method { .. } => "method",
            Self::Initializer => "initializer",
            Self::ImportContainer => "import container",
            Self::ImportDeclaration { .. } => "import declaration",
            Self::NamespaceDeclaration => "namespace declaration",
        }
    }

    /// Discriminant used to key symbols across reconciliations.
    pub(crate) fn tag(&self) -> u8 {
        match self {
            Self::Project => 0,
            Self::SourceRoot { .. } => 1,
            Self::Namespace => 2,
            Self::SourceUnit => 3,
            Self::Type => 4,
            Self::Field { .. } => 5,
            Self::Method { .. } => 6,
            Self::Initializer => 7,
            Self::ImportContainer => 8,
            Self::ImportDeclaration { .. } => 9,
            Self::NamespaceDeclaration => 10,
        }
    }
}

/// A node of the symbol tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolNode {
    /// Unique identifier for this node.
    pub id: SymbolId,

    /// Simple name. Namespaces carry their full dotted name, units their file
    /// name, source roots their path relative to the project.
    pub name: CompactString,

    /// Node type.
    pub kind: SymbolKind,

    /// Logical parent (none for projects).
    pub parent: Option<SymbolId>,

    /// Logical children, in source order.
    pub children: Vec<SymbolId>,

    /// Backing resource, for kinds that have one.
    pub resource: Option<ResourceId>,

    /// Whether the symbol currently exists.
    pub exists: bool,

    /// No editable source.
    pub binary: bool,

    /// Source range inside the owning unit (sub-unit kinds only).
    pub range: Option<TextRange>,
}

impl SymbolNode {
    pub(crate) fn new(id: SymbolId, name: impl Into<CompactString>, kind: SymbolKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            parent: None,
            children: Vec::new(),
            resource: None,
            exists: true,
            binary: false,
            range: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_range_relations() {
        let outer = TextRange::new(10, 20);
        let inner = TextRange::between(12, 18);
        assert!(outer.contains_range(&inner));
        assert!(outer.overlaps(&inner));
        assert!(!inner.contains_range(&outer));
        assert!(!outer.overlaps(&TextRange::new(30, 5)));
        assert!(outer.contains(29));
        assert!(!outer.contains(30));
    }

    #[test]
    fn test_symbol_kind_classes() {
        assert!(SymbolKind::Type.is_member());
        assert!(SymbolKind::Initializer.is_inside_unit());
        assert!(
            SymbolKind::ImportDeclaration {
                is_static: false,
                on_demand: false
            }
            .is_declaration()
        );
        assert!(!SymbolKind::SourceUnit.is_inside_unit());
        assert!(!SymbolKind::Namespace.is_member());
    }

    #[test]
    fn test_resource_extension() {
        let node = ResourceNode::new(ResourceId::new(1), "A.java", ResourceKind::File, None);
        assert_eq!(node.extension(), Some("java"));
        let dotfile = ResourceNode::new(ResourceId::new(2), ".classpath", ResourceKind::File, None);
        assert_eq!(dotfile.extension(), None);
    }
}
