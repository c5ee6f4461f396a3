//! Writes a loaded workspace back to disk.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use jwalk::WalkDir;
use serde::Serialize;
use tracing::{debug, info, warn};
use treeshift_core::{ResourceId, ResourceKind, ScanConfig};

use crate::error::{ScanError, ScanWarning, WarningKind};
use crate::scanner::LoadedWorkspace;

/// Outcome of a write.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WriteSummary {
    /// Files created or rewritten.
    pub written: usize,
    /// Files and directories removed from disk.
    pub removed: usize,
    /// Files already matching the workspace.
    pub unchanged: usize,
    /// Files that could not be produced.
    pub skipped: Vec<ScanWarning>,
}

/// Desired on-disk content of a file.
enum Content<'a> {
    Text(&'a str),
    Binary(ResourceId),
}

/// Synchronizes the disk below the workspace root with the resource tree.
///
/// Entries skipped while loading (hidden or ignored) are never touched,
/// unless they live inside a directory that no longer exists in the model.
#[derive(Debug, Clone)]
pub struct WorkspaceWriter {
    config: ScanConfig,
}

impl WorkspaceWriter {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Write `loaded` to its root. Origins of moved binary files are updated
    /// to their new location.
    pub fn write(&self, loaded: &mut LoadedWorkspace) -> Result<WriteSummary, ScanError> {
        let mut summary = WriteSummary::default();
        let ws = &loaded.workspace;
        let root = loaded.root.clone();

        let mut dirs = BTreeSet::new();
        let mut files: BTreeMap<PathBuf, Content<'_>> = BTreeMap::new();
        for node in ws.live_resources() {
            let path = root.join(ws.resource_path(node.id));
            match (node.kind, &node.contents) {
                (ResourceKind::File, Some(text)) => {
                    files.insert(path, Content::Text(text));
                }
                (ResourceKind::File, None) => {
                    files.insert(path, Content::Binary(node.id));
                }
                _ => {
                    dirs.insert(path);
                }
            }
        }

        // Read relocated binaries before anything is removed.
        let mut binaries = HashMap::new();
        for (path, content) in &files {
            let Content::Binary(id) = content else { continue };
            match loaded.origins.get(id) {
                Some(origin) if origin == path => {}
                Some(origin) => {
                    let bytes = fs::read(origin).map_err(|e| ScanError::io(origin, e))?;
                    binaries.insert(*id, bytes);
                }
                None => {
                    warn!(path = %path.display(), "No origin for binary file");
                    summary.skipped.push(ScanWarning::new(
                        path,
                        "Binary file has no content on disk to copy from",
                        WarningKind::Skipped,
                    ));
                }
            }
        }

        summary.removed = self.remove_stale(&root, &dirs, &files)?;

        for dir in &dirs {
            fs::create_dir_all(dir).map_err(|e| ScanError::io(dir, e))?;
        }
        let mut relocated = Vec::new();
        for (path, content) in &files {
            match content {
                Content::Text(text) => {
                    if fs::read(path).is_ok_and(|existing| existing == text.as_bytes()) {
                        summary.unchanged += 1;
                        continue;
                    }
                    fs::write(path, text).map_err(|e| ScanError::io(path, e))?;
                    summary.written += 1;
                }
                Content::Binary(id) => match binaries.remove(id) {
                    Some(bytes) => {
                        fs::write(path, bytes).map_err(|e| ScanError::io(path, e))?;
                        relocated.push((*id, path.clone()));
                        summary.written += 1;
                    }
                    None if loaded.origins.contains_key(id) => summary.unchanged += 1,
                    None => {}
                },
            }
        }
        for (id, path) in relocated {
            loaded.origins.insert(id, path);
        }

        info!(
            root = %root.display(),
            written = summary.written,
            removed = summary.removed,
            unchanged = summary.unchanged,
            skipped = summary.skipped.len(),
            "Wrote workspace"
        );
        Ok(summary)
    }

    /// Remove visible disk entries that are not part of the workspace.
    fn remove_stale(
        &self,
        root: &Path,
        dirs: &BTreeSet<PathBuf>,
        files: &BTreeMap<PathBuf, Content<'_>>,
    ) -> Result<usize, ScanError> {
        let filter = self.config.ignore_matcher()?;
        let walker = WalkDir::new(root)
            .skip_hidden(!self.config.include_hidden)
            .follow_links(false)
            .sort(true)
            .min_depth(1)
            .process_read_dir(move |_depth, _path, _state, children| {
                children.retain(|child| {
                    child
                        .as_ref()
                        .map(|e| !filter.is_match(e.file_name()))
                        .unwrap_or(true)
                });
            });

        let mut stale: Vec<(PathBuf, bool)> = Vec::new();
        for entry in walker.into_iter().flatten() {
            if entry.file_type().is_symlink() {
                continue;
            }
            let is_dir = entry.file_type().is_dir();
            // Loose files at the top level are not part of any project.
            if entry.depth() == 1 && !is_dir {
                continue;
            }
            let path = entry.path();
            let wanted = if is_dir {
                dirs.contains(&path)
            } else {
                files.contains_key(&path)
            };
            if !wanted && !stale.iter().any(|(removed, _)| path.starts_with(removed)) {
                stale.push((path, is_dir));
            }
        }

        for (path, is_dir) in &stale {
            debug!(path = %path.display(), "Removing");
            let result = if *is_dir {
                fs::remove_dir_all(path)
            } else {
                fs::remove_file(path)
            };
            result.map_err(|e| ScanError::io(path, e))?;
        }
        Ok(stale.len())
    }
}
