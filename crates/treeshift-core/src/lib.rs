//! Core types for treeshift.
//!
//! This crate provides the workspace model shared by the scanner and the
//! reorganization engine: the resource tree, the symbol tree derived from it,
//! the source outline parser, configuration and validation status.

mod config;
mod error;
mod handle;
mod node;
pub mod source;
mod status;
mod workspace;

pub use config::{ReorgConfig, ReorgConfigBuilder, ScanConfig, ScanConfigBuilder, build_glob_set};
pub use error::ModelError;
pub use handle::ElementHandle;
pub use node::{
    BufferState, Element, ResourceId, ResourceKind, ResourceNode, SymbolId, SymbolKind, SymbolNode,
    TextRange,
};
pub use status::{RefactoringStatus, Severity, StatusEntry};
pub use workspace::{SourceRootDecl, Workspace};
