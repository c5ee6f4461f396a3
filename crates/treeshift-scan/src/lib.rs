//! Disk loading and write-back for treeshift workspaces.
//!
//! Every sub-directory of the workspace root is loaded as a project. File
//! contents are read in parallel with jwalk and rayon; files that are not
//! valid UTF-8 are kept as binary resources without contents. A project may
//! carry a `treeshift.toml` manifest declaring its source roots, archive
//! references and flags (see [`ProjectManifest`]).
//!
//! # Example
//!
//! ```rust,no_run
//! use treeshift_scan::{ProjectScanner, ScanConfig, WorkspaceWriter};
//!
//! let config = ScanConfig::new("/path/to/workspace");
//! let mut loaded = ProjectScanner::new(config.clone()).scan().unwrap();
//! println!("Loaded {} projects", loaded.workspace.projects().len());
//!
//! // ... plan and perform changes on `loaded.workspace` ...
//!
//! let summary = WorkspaceWriter::new(config).write(&mut loaded).unwrap();
//! println!("Wrote {} files", summary.written);
//! ```

mod error;
mod manifest;
mod scanner;
mod writer;

pub use error::{ScanError, ScanWarning, WarningKind};
pub use manifest::{ProjectManifest, SourceRootEntry};
pub use scanner::{LoadedWorkspace, ProjectScanner};
pub use writer::{WorkspaceWriter, WriteSummary};

// Re-export core types for convenience
pub use treeshift_core::ScanConfig;
