//! Parallel workspace loader built on jwalk and rayon.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use globset::GlobSet;
use jwalk::{Parallelism, WalkDir};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use treeshift_core::{ResourceId, ScanConfig, Workspace};

use crate::error::{ScanError, ScanWarning, WarningKind};
use crate::manifest::ProjectManifest;

/// A workspace loaded from disk.
#[derive(Debug, Clone)]
pub struct LoadedWorkspace {
    pub workspace: Workspace,
    /// Canonical workspace root.
    pub root: PathBuf,
    /// Disk location of every loaded file.
    pub origins: HashMap<ResourceId, PathBuf>,
    pub warnings: Vec<ScanWarning>,
    pub elapsed: Duration,
}

/// One directory entry of a project, relative to the project directory.
struct EntryInfo {
    relative: String,
    path: PathBuf,
    is_dir: bool,
}

/// A file read from disk. `contents` is `None` for non-UTF-8 data.
struct FileData {
    relative: String,
    path: PathBuf,
    contents: Option<String>,
}

/// Everything collected for one project before the workspace is built.
struct ProjectData {
    name: String,
    folders: Vec<String>,
    files: Vec<FileData>,
    warnings: Vec<ScanWarning>,
}

/// Loads every sub-directory of the configured root as a project.
#[derive(Debug, Clone)]
pub struct ProjectScanner {
    config: ScanConfig,
}

impl ProjectScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Load the workspace.
    pub fn scan(&self) -> Result<LoadedWorkspace, ScanError> {
        let start = Instant::now();
        let config = &self.config;
        let root = config.root.canonicalize().map_err(|e| ScanError::io(&config.root, e))?;
        if !root.is_dir() {
            return Err(ScanError::NotADirectory { path: root });
        }
        let ignore = config.ignore_matcher()?;

        let mut project_dirs = Vec::new();
        for entry in fs::read_dir(&root).map_err(|e| ScanError::io(&root, e))? {
            let entry = entry.map_err(|e| ScanError::io(&root, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir && !config.should_skip_hidden(&name) && !ignore.is_match(&name) {
                project_dirs.push((name, entry.path()));
            }
        }
        project_dirs.sort();

        let projects = project_dirs
            .par_iter()
            .map(|(name, dir)| self.collect_project(name, dir, &ignore))
            .collect::<Result<Vec<_>, _>>()?;

        let mut workspace = Workspace::with_source_extension(config.source_extension.as_str());
        let mut loaded = LoadedWorkspace {
            workspace: Workspace::default(),
            root,
            origins: HashMap::new(),
            warnings: Vec::new(),
            elapsed: Duration::ZERO,
        };
        workspace.build(|ws| self.populate(ws, projects, &mut loaded))?;
        loaded.workspace = workspace;
        loaded.elapsed = start.elapsed();

        info!(
            root = %loaded.root.display(),
            projects = loaded.workspace.projects().len(),
            files = loaded.origins.len(),
            warnings = loaded.warnings.len(),
            elapsed = ?loaded.elapsed,
            "Loaded workspace"
        );
        Ok(loaded)
    }

    /// Walk one project directory and read its files.
    fn collect_project(&self, name: &str, dir: &Path, ignore: &GlobSet) -> Result<ProjectData, ScanError> {
        let parallelism = match self.config.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            },
            n => Parallelism::RayonNewPool(n),
        };
        let filter = ignore.clone();
        let walker = WalkDir::new(dir)
            .parallelism(parallelism)
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

        let mut warnings = Vec::new();
        let mut entries = Vec::new();
        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
                    warnings.push(ScanWarning::new(path, err.to_string(), WarningKind::ReadError));
                    continue;
                }
            };
            let file_type = entry.file_type();
            if !file_type.is_dir() && !file_type.is_file() {
                continue;
            }
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(dir) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            entries.push(EntryInfo {
                relative,
                path,
                is_dir: file_type.is_dir(),
            });
        }

        let (dirs, files): (Vec<EntryInfo>, Vec<EntryInfo>) = entries.into_iter().partition(|e| e.is_dir);
        let read: Vec<Result<FileData, ScanWarning>> = files
            .into_par_iter()
            .map(|entry| match fs::read(&entry.path) {
                Ok(bytes) => Ok(FileData {
                    relative: entry.relative,
                    path: entry.path,
                    contents: String::from_utf8(bytes).ok(),
                }),
                Err(e) => Err(ScanWarning::new(entry.path, e.to_string(), WarningKind::ReadError)),
            })
            .collect();

        let mut data = ProjectData {
            name: name.to_string(),
            folders: dirs.into_iter().map(|d| d.relative).collect(),
            files: Vec::new(),
            warnings,
        };
        for file in read {
            match file {
                Ok(file) => {
                    if file.contents.is_none() && file.relative.ends_with(&format!(".{}", self.config.source_extension)) {
                        data.warnings.push(ScanWarning::new(
                            &file.path,
                            "Source file is not valid UTF-8; loaded as binary",
                            WarningKind::Binary,
                        ));
                    }
                    data.files.push(file);
                }
                Err(warning) => data.warnings.push(warning),
            }
        }
        debug!(project = name, folders = data.folders.len(), files = data.files.len(), "Collected project");
        Ok(data)
    }

    /// Add the collected projects to `ws` and apply their manifests.
    fn populate(
        &self,
        ws: &mut Workspace,
        projects: Vec<ProjectData>,
        loaded: &mut LoadedWorkspace,
    ) -> Result<(), ScanError> {
        let mut manifests = Vec::new();
        for project in projects {
            let id = ws.add_project(&project.name)?;
            for folder in &project.folders {
                ws.add_folders(id, folder)?;
            }

            let mut manifest_text = None;
            for file in project.files {
                let (parent, name) = match file.relative.rsplit_once('/') {
                    Some((dir, name)) => (ws.add_folders(id, dir)?, name.to_string()),
                    None => (id, file.relative.clone()),
                };
                if file.relative == self.config.manifest_name {
                    manifest_text = file.contents.clone();
                }
                let resource = match file.contents {
                    Some(text) => ws.add_file(parent, &name, text)?,
                    None => ws.add_binary_file(parent, &name)?,
                };
                loaded.origins.insert(resource, file.path);
            }
            loaded.warnings.extend(project.warnings);

            let manifest_path = loaded.root.join(&project.name).join(&self.config.manifest_name);
            let manifest = match manifest_text {
                Some(text) => ProjectManifest::parse(&text, &manifest_path)?,
                None => ProjectManifest::implicit(ws.child_named(id, "src").is_some()),
            };
            apply_manifest(ws, id, &manifest, &manifest_path)?;
            manifests.push((id, manifest, manifest_path));
        }

        // Archives may live in projects loaded after the referencing one.
        for (project, manifest, manifest_path) in manifests {
            for archive in &manifest.archives {
                let file = ws.find_resource(archive).ok_or_else(|| bad_entry(&manifest_path, archive, "file"))?;
                ws.add_archive_reference(project, file)?;
            }
            if manifest.closed {
                warn!(project = %ws.resource_path(project).display(), "Project is closed");
                ws.set_accessible(project, false);
            }
        }
        Ok(())
    }
}

fn bad_entry(manifest: &Path, entry: &str, expected: &'static str) -> ScanError {
    ScanError::BadEntry {
        manifest: manifest.to_path_buf(),
        entry: entry.to_string(),
        expected,
    }
}

/// Apply the project-relative parts of a manifest.
fn apply_manifest(
    ws: &mut Workspace,
    project: ResourceId,
    manifest: &ProjectManifest,
    manifest_path: &Path,
) -> Result<(), ScanError> {
    let base = ws.resource_path(project);
    let lookup = |ws: &Workspace, entry: &str| ws.find_resource(base.join(entry));

    for root in &manifest.source_roots {
        let id = lookup(ws, &root.path).ok_or_else(|| bad_entry(manifest_path, &root.path, "source root"))?;
        ws.add_source_root(id, root.archive, root.exclude.clone())?;
        if root.archive {
            mark_read_only(ws, id);
        }
    }
    for entry in &manifest.linked {
        let id = lookup(ws, entry).ok_or_else(|| bad_entry(manifest_path, entry, "resource"))?;
        ws.set_linked(id, true);
    }
    for entry in &manifest.read_only {
        let id = lookup(ws, entry).ok_or_else(|| bad_entry(manifest_path, entry, "resource"))?;
        mark_read_only(ws, id);
    }
    Ok(())
}

fn mark_read_only(ws: &mut Workspace, id: ResourceId) {
    ws.set_read_only(id, true);
    for descendant in ws.resource_descendants(id) {
        ws.set_read_only(descendant, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir_all(root.join("app/src/p")).unwrap();
        fs::create_dir_all(root.join("app/target/classes")).unwrap();
        fs::create_dir_all(root.join("app/.git")).unwrap();
        fs::write(root.join("app/src/p/A.java"), "package p;\nclass A {}\n").unwrap();
        fs::write(root.join("app/src/p/data.bin"), [0xff, 0xfe, 0x00]).unwrap();
        fs::write(root.join("app/target/classes/A.class"), "x").unwrap();
        fs::write(root.join("app/.git/HEAD"), "ref").unwrap();

        fs::create_dir_all(root.join("lib/gen")).unwrap();
        fs::write(root.join("lib/gen/G.java"), "class G {}\n").unwrap();
        fs::write(root.join("lib/util.jar"), [0x50, 0x4b, 0xff]).unwrap();
        fs::write(
            root.join("lib/treeshift.toml"),
            "read_only = [\"gen\"]\n\n[[source_roots]]\npath = \"gen\"\n",
        )
        .unwrap();
        fs::write(root.join("app/treeshift.toml"), "archives = [\"lib/util.jar\"]\n\n[[source_roots]]\npath = \"src\"\n").unwrap();
        temp
    }

    #[test]
    fn test_scan_builds_projects_and_units() {
        let temp = create_test_tree();
        let loaded = ProjectScanner::new(ScanConfig::new(temp.path())).scan().unwrap();
        let ws = &loaded.workspace;

        assert_eq!(ws.projects().len(), 2);
        let a = ws.find_resource("app/src/p/A.java").unwrap();
        let unit = ws.symbol_for_resource(a).unwrap();
        assert_eq!(ws.qualified_name(unit), "p.A");
        assert_eq!(loaded.origins[&a], loaded.root.join("app/src/p/A.java"));

        let data = ws.find_resource("app/src/p/data.bin").unwrap();
        assert!(ws.resource(data).contents.is_none());
    }

    #[test]
    fn test_ignored_and_hidden_entries_are_skipped() {
        let temp = create_test_tree();
        let loaded = ProjectScanner::new(ScanConfig::new(temp.path())).scan().unwrap();
        let ws = &loaded.workspace;

        assert!(ws.find_resource("app/target").is_none());
        assert!(ws.find_resource("app/.git").is_none());
    }

    #[test]
    fn test_manifest_is_applied() {
        let temp = create_test_tree();
        let loaded = ProjectScanner::new(ScanConfig::new(temp.path())).scan().unwrap();
        let ws = &loaded.workspace;

        let gen_dir = ws.find_resource("lib/gen").unwrap();
        assert!(ws.source_root_decl(gen_dir).is_some());
        let g = ws.find_resource("lib/gen/G.java").unwrap();
        assert!(ws.resource(g).read_only);

        let app = ws.find_resource("app").unwrap();
        let jar = ws.find_resource("lib/util.jar").unwrap();
        assert_eq!(ws.archive_references(app), &[jar]);
    }

    #[test]
    fn test_bad_manifest_entry() {
        let temp = create_test_tree();
        fs::write(temp.path().join("app/treeshift.toml"), "linked = [\"missing\"]\n").unwrap();
        let err = ProjectScanner::new(ScanConfig::new(temp.path())).scan().unwrap_err();
        assert!(matches!(err, ScanError::BadEntry { expected: "resource", .. }));
    }

    #[test]
    fn test_scan_rejects_file_root() {
        let temp = create_test_tree();
        let err = ProjectScanner::new(ScanConfig::new(temp.path().join("lib/util.jar")))
            .scan()
            .unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory { .. }));
    }
}
