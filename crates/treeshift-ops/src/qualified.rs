//! Qualified-name updates outside of code: matching non-source files and
//! string literals of source units.

use std::collections::HashSet;

use globset::GlobSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use treeshift_core::source::{self, TextEdit, TokenKind};
use treeshift_core::{ReorgConfig, ResourceId, TextRange, Workspace};

use crate::error::ReorgError;
use crate::references::TextChangeSet;

/// An old and a new fully qualified name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedRename {
    pub old: String,
    pub new: String,
}

/// Ranges of `name` in `text[range]` delimited by non-identifier characters.
fn occurrences(text: &str, range: TextRange, name: &str) -> Vec<TextRange> {
    let bytes = text.as_bytes();
    let window = &text[range.offset..range.end()];
    window
        .match_indices(name)
        .map(|(i, _)| range.offset + i)
        .filter(|&start| {
            let end = start + name.len();
            let before_ok = start == 0 || {
                let b = bytes[start - 1];
                !source::is_ident_part(b) && b != b'.'
            };
            let after_ok = end >= bytes.len() || !source::is_ident_part(bytes[end]);
            before_ok && after_ok
        })
        .map(|start| TextRange::new(start, name.len()))
        .collect()
}

/// Rewrites qualified type names in files matched by the configured
/// patterns.
#[derive(Debug, Clone)]
pub struct QualifiedNameUpdater {
    matcher: GlobSet,
    source_extension: String,
}

impl QualifiedNameUpdater {
    pub fn new(config: &ReorgConfig) -> Result<Self, ReorgError> {
        Ok(Self {
            matcher: config.qualified_name_matcher()?,
            source_extension: config.source_extension.clone(),
        })
    }

    /// Edits for `renames` in every text file of `project`, skipping
    /// `excluded` files.
    pub fn update(
        &self,
        ws: &Workspace,
        project: ResourceId,
        renames: &[QualifiedRename],
        excluded: &HashSet<ResourceId>,
        cancel: &CancellationToken,
    ) -> Result<TextChangeSet, ReorgError> {
        let mut edits = TextChangeSet::new();
        if renames.is_empty() {
            return Ok(edits);
        }

        for id in ws.resource_descendants(project) {
            if cancel.is_cancelled() {
                return Err(ReorgError::Cancelled);
            }
            let node = ws.resource(id);
            if !node.is_file() || excluded.contains(&id) || node.read_only {
                continue;
            }
            let Some(text) = node.contents.as_deref() else {
                continue;
            };

            let ranges: Vec<TextRange> = if node.extension() == Some(self.source_extension.as_str()) {
                source::tokenize(text)
                    .into_iter()
                    .filter(|t| t.kind == TokenKind::StringLit)
                    .map(|t| t.range)
                    .collect()
            } else if self.matcher.is_match(node.name.as_str()) {
                vec![TextRange::new(0, text.len())]
            } else {
                continue;
            };

            for range in ranges {
                for rename in renames {
                    for found in occurrences(text, range, &rename.old) {
                        edits.add(id, TextEdit::replace(found, rename.new.clone()));
                    }
                }
            }
        }

        debug!(files = edits.len(), "Computed qualified name updates");
        Ok(edits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occurrences_respect_boundaries() {
        let text = "p.A p.AB xp.A p.A.m (p.A)";
        let found = occurrences(text, TextRange::new(0, text.len()), "p.A");
        let starts: Vec<usize> = found.iter().map(|r| r.offset).collect();
        assert_eq!(starts, vec![0, 14, 21]);
    }

    #[test]
    fn test_update_files_and_literals() {
        let mut ws = Workspace::new();
        let app = ws.add_project("app").unwrap();
        let src = ws.create_folder(app, "src").unwrap();
        ws.add_source_root(src, false, vec![]).unwrap();
        let r = ws.add_folders(src, "r").unwrap();
        let props = ws.add_file(app, "app.properties", "main=p.A\nother=p.AB\n").unwrap();
        let notes = ws.add_file(app, "notes.txt", "p.A").unwrap();
        let unit = ws
            .add_file(r, "C.java", "package r;\nclass C { String s = \"p.A\"; p.A a; }\n")
            .unwrap();

        let updater = QualifiedNameUpdater::new(&ReorgConfig::default()).unwrap();
        let renames = [QualifiedRename {
            old: "p.A".into(),
            new: "q.A".into(),
        }];
        let edits = updater
            .update(&ws, app, &renames, &HashSet::new(), &CancellationToken::new())
            .unwrap();

        let text = ws.resource(props).contents.clone().unwrap();
        assert_eq!(
            source::apply_edits(&text, edits.edits_for(props)),
            "main=q.A\nother=p.AB\n"
        );
        assert!(!edits.contains(notes));

        let text = ws.resource(unit).contents.clone().unwrap();
        assert_eq!(
            source::apply_edits(&text, edits.edits_for(unit)),
            "package r;\nclass C { String s = \"q.A\"; p.A a; }\n"
        );
    }
}
