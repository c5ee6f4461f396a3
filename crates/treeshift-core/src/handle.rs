//! Textual element handles.
//!
//! Handles name resources and symbols independently of arena ids so that
//! selections can be given on the command line and recorded operations can
//! be replayed against a freshly loaded workspace.
//!
//! | form | element |
//! |---|---|
//! | `proj/src/a.txt` | resource |
//! | `project:proj` | project |
//! | `root:proj/src` | source root |
//! | `ns:proj/src:p.q` | namespace |
//! | `unit:proj/src:p.q/A.java` | source unit |
//! | `member:proj/src:p.q/A.java#A/f` | type, member or declaration |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::node::{Element, SymbolId};
use crate::workspace::Workspace;

/// Id-independent name of an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ElementHandle {
    Resource(PathBuf),
    Project(String),
    SourceRoot(PathBuf),
    Namespace {
        root: PathBuf,
        name: String,
    },
    Unit {
        root: PathBuf,
        namespace: String,
        file: String,
    },
    Member {
        root: PathBuf,
        namespace: String,
        file: String,
        path: Vec<String>,
    },
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource(path) => write!(f, "{}", path.display()),
            Self::Project(name) => write!(f, "project:{name}"),
            Self::SourceRoot(root) => write!(f, "root:{}", root.display()),
            Self::Namespace { root, name } => write!(f, "ns:{}:{name}", root.display()),
            Self::Unit {
                root,
                namespace,
                file,
            } => write!(f, "unit:{}:{namespace}/{file}", root.display()),
            Self::Member {
                root,
                namespace,
                file,
                path,
            } => write!(
                f,
                "member:{}:{namespace}/{file}#{}",
                root.display(),
                path.join("/")
            ),
        }
    }
}

impl FromStr for ElementHandle {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ModelError::InvalidHandle {
            handle: s.to_string(),
        };

        let Some((prefix, rest)) = s.split_once(':') else {
            if s.is_empty() {
                return Err(invalid());
            }
            return Ok(Self::Resource(PathBuf::from(s)));
        };

        match prefix {
            "project" if !rest.is_empty() => Ok(Self::Project(rest.to_string())),
            "root" if !rest.is_empty() => Ok(Self::SourceRoot(PathBuf::from(rest))),
            "ns" => {
                let (root, name) = rest.rsplit_once(':').ok_or_else(invalid)?;
                Ok(Self::Namespace {
                    root: PathBuf::from(root),
                    name: name.to_string(),
                })
            }
            "unit" | "member" => {
                let (root, unit) = rest.rsplit_once(':').ok_or_else(invalid)?;
                let (unit, members) = match unit.split_once('#') {
                    Some((unit, members)) => (unit, Some(members)),
                    None => (unit, None),
                };
                let (namespace, file) = unit.rsplit_once('/').ok_or_else(invalid)?;
                if file.is_empty() {
                    return Err(invalid());
                }
                let root = PathBuf::from(root);
                let namespace = namespace.to_string();
                let file = file.to_string();

                match (prefix, members) {
                    ("unit", None) => Ok(Self::Unit {
                        root,
                        namespace,
                        file,
                    }),
                    ("member", Some(members)) if !members.is_empty() => Ok(Self::Member {
                        root,
                        namespace,
                        file,
                        path: members.split('/').map(str::to_string).collect(),
                    }),
                    _ => Err(invalid()),
                }
            }
            _ => Err(invalid()),
        }
    }
}

impl From<ElementHandle> for String {
    fn from(handle: ElementHandle) -> Self {
        handle.to_string()
    }
}

impl TryFrom<String> for ElementHandle {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Workspace {
    /// Resolve a handle to a live element.
    pub fn resolve_handle(&self, handle: &ElementHandle) -> Result<Element, ModelError> {
        let unresolved = || ModelError::Unresolved {
            handle: handle.to_string(),
        };

        match handle {
            ElementHandle::Resource(path) => self
                .find_resource(path)
                .filter(|r| *r != self.root())
                .map(Element::Resource)
                .ok_or_else(unresolved),
            ElementHandle::Project(name) => self
                .find_resource(name)
                .filter(|r| self.resource(*r).is_project())
                .and_then(|r| self.symbol_for_resource(r))
                .map(Element::Symbol)
                .ok_or_else(unresolved),
            ElementHandle::SourceRoot(root) => self
                .root_symbol(root)
                .map(Element::Symbol)
                .ok_or_else(unresolved),
            ElementHandle::Namespace { root, name } => self
                .root_symbol(root)
                .and_then(|r| self.find_namespace(r, name))
                .map(Element::Symbol)
                .ok_or_else(unresolved),
            ElementHandle::Unit {
                root,
                namespace,
                file,
            } => self
                .unit_symbol(root, namespace, file)
                .map(Element::Symbol)
                .ok_or_else(unresolved),
            ElementHandle::Member {
                root,
                namespace,
                file,
                path,
            } => {
                let mut current = self.unit_symbol(root, namespace, file).ok_or_else(unresolved)?;
                for segment in path {
                    current = self
                        .symbol(current)
                        .children
                        .iter()
                        .copied()
                        .find(|c| self.symbol(*c).name == segment.as_str())
                        .ok_or_else(unresolved)?;
                }
                Ok(Element::Symbol(current))
            }
        }
    }

    fn root_symbol(&self, root: &Path) -> Option<SymbolId> {
        let folder = self.find_resource(root)?;
        self.symbols_backed_by(folder)
            .iter()
            .copied()
            .find(|s| self.symbol(*s).kind.is_source_root())
    }

    fn unit_symbol(&self, root: &Path, namespace: &str, file: &str) -> Option<SymbolId> {
        let root = self.root_symbol(root)?;
        let ns = self.find_namespace(root, namespace)?;
        self.units_of(ns)
            .into_iter()
            .find(|u| self.symbol(*u).name == file)
    }

    /// Handle naming a live element.
    pub fn handle_for(&self, element: Element) -> Option<ElementHandle> {
        let id = match element {
            Element::Resource(id) => {
                return self
                    .resource_exists(id)
                    .then(|| ElementHandle::Resource(self.resource_path(id)));
            }
            Element::Symbol(id) => id,
        };
        if !self.symbol_exists(id) {
            return None;
        }

        let node = self.symbol(id);
        let root_path = |s: SymbolId| {
            self.source_root_of(s)
                .and_then(|r| self.symbol(r).resource)
                .map(|r| self.resource_path(r))
        };

        let handle = if node.kind.is_project() {
            ElementHandle::Project(node.name.to_string())
        } else if node.kind.is_source_root() {
            ElementHandle::SourceRoot(root_path(id)?)
        } else if node.kind.is_namespace() {
            ElementHandle::Namespace {
                root: root_path(id)?,
                name: node.name.to_string(),
            }
        } else {
            let unit = self.enclosing_unit(id)?;
            let root = root_path(unit)?;
            let namespace = self.namespace_name(unit);
            let file = self.symbol(unit).name.to_string();
            if unit == id {
                ElementHandle::Unit {
                    root,
                    namespace,
                    file,
                }
            } else {
                let mut path: Vec<String> = std::iter::once(id)
                    .chain(self.symbol_ancestors(id))
                    .take_while(|s| *s != unit)
                    .map(|s| self.symbol(s).name.to_string())
                    .collect();
                path.reverse();
                ElementHandle::Member {
                    root,
                    namespace,
                    file,
                    path,
                }
            }
        };
        Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        for text in [
            "proj/src/a.txt",
            "project:proj",
            "root:proj/src",
            "ns:proj/src:p.q",
            "ns:proj/src:",
            "unit:proj/src:p.q/A.java",
            "unit:proj/src:/A.java",
            "member:proj/src:p.q/A.java#A/f",
        ] {
            let handle: ElementHandle = text.parse().unwrap();
            assert_eq!(handle.to_string(), text);
        }

        assert!("unit:proj/src:p.q".parse::<ElementHandle>().is_err());
        assert!("member:proj/src:p/A.java".parse::<ElementHandle>().is_err());
        assert!("bogus:x".parse::<ElementHandle>().is_err());
    }

    #[test]
    fn test_resolve_and_handle_for() {
        let mut ws = Workspace::new();
        let project = ws.add_project("proj").unwrap();
        let src = ws.create_folder(project, "src").unwrap();
        ws.add_source_root(src, false, vec![]).unwrap();
        let p = ws.add_folders(src, "p").unwrap();
        ws.add_file(p, "A.java", "package p;\nclass A { int f; }\n")
            .unwrap();

        let handle: ElementHandle = "member:proj/src:p/A.java#A/f".parse().unwrap();
        let element = ws.resolve_handle(&handle).unwrap();
        let field = element.as_symbol().unwrap();
        assert!(ws.symbol(field).kind.is_field());
        assert_eq!(ws.handle_for(element), Some(handle));

        let ns = ws
            .resolve_handle(&"ns:proj/src:p".parse().unwrap())
            .unwrap();
        assert_eq!(ws.handle_for(ns).unwrap().to_string(), "ns:proj/src:p");

        let missing = ws.resolve_handle(&"unit:proj/src:p/B.java".parse().unwrap());
        assert!(matches!(missing, Err(ModelError::Unresolved { .. })));
    }

    #[test]
    fn test_handle_serde() {
        let handle: ElementHandle = "ns:proj/src:p".parse().unwrap();
        let json = serde_json::to_string(&handle).unwrap();
        assert_eq!(json, "\"ns:proj/src:p\"");
    }
}
