use std::fs;

use tempfile::TempDir;
use treeshift_core::{Element, ReorgConfig};
use treeshift_ops::{AutoConfirm, ConfirmationContext, ReorgProcessor, Selection, perform_change};
use treeshift_scan::{ProjectManifest, ProjectScanner, ScanConfig, SourceRootEntry, WorkspaceWriter};

fn create_workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("app/src/p")).unwrap();
    fs::create_dir_all(root.join("app/src/q")).unwrap();
    fs::create_dir_all(root.join("app/src/r")).unwrap();
    fs::write(root.join("app/src/p/A.java"), "package p;\n\npublic class A {}\n").unwrap();
    fs::write(root.join("app/src/r/B.java"), "package r;\n\nimport p.A;\n\nclass B { A a; }\n").unwrap();

    let manifest = ProjectManifest {
        source_roots: vec![SourceRootEntry::folder("src")],
        ..ProjectManifest::default()
    };
    fs::write(root.join("app/treeshift.toml"), manifest.to_toml().unwrap()).unwrap();
    temp
}

#[test]
fn test_move_is_written_back_to_disk() {
    let temp = create_workspace();
    let config = ScanConfig::new(temp.path());
    let mut loaded = ProjectScanner::new(config.clone()).scan().unwrap();
    assert!(loaded.warnings.is_empty());

    let ws = &mut loaded.workspace;
    let a = ws.symbol_for_resource(ws.find_resource("app/src/p/A.java").unwrap()).unwrap();
    let q = ws.namespace_for_folder(ws.find_resource("app/src/q").unwrap()).unwrap();
    let (mut queries, mut names) = (AutoConfirm, AutoConfirm);
    let mut ctx = ConfirmationContext::new(&mut queries, &mut names);
    let plan = ReorgProcessor::new(ReorgConfig::default())
        .plan_move(ws, &Selection::from_symbols([a]), Element::Symbol(q), &mut ctx)
        .unwrap();
    perform_change(ws, plan.change.as_ref().unwrap()).unwrap();

    let summary = WorkspaceWriter::new(config).write(&mut loaded).unwrap();
    assert_eq!(summary.written, 2);
    assert_eq!(summary.removed, 1);

    let root = temp.path();
    assert!(!root.join("app/src/p/A.java").exists());
    assert!(root.join("app/src/p").is_dir());
    assert_eq!(
        fs::read_to_string(root.join("app/src/q/A.java")).unwrap(),
        "package q;\n\npublic class A {}\n"
    );
    assert_eq!(
        fs::read_to_string(root.join("app/src/r/B.java")).unwrap(),
        "package r;\n\nimport q.A;\n\nclass B { A a; }\n"
    );
}

#[test]
fn test_reloading_after_write_sees_the_new_layout() {
    let temp = create_workspace();
    let config = ScanConfig::new(temp.path());
    let mut loaded = ProjectScanner::new(config.clone()).scan().unwrap();

    let ws = &mut loaded.workspace;
    let r = ws.find_resource("app/src/r").unwrap();
    let b = ws.find_resource("app/src/r/B.java").unwrap();
    ws.delete_resource(b).unwrap();
    ws.delete_resource(r).unwrap();
    WorkspaceWriter::new(config.clone()).write(&mut loaded).unwrap();

    let reloaded = ProjectScanner::new(config).scan().unwrap();
    assert!(reloaded.workspace.find_resource("app/src/r").is_none());
    assert_eq!(reloaded.workspace.types_named("p.A").len(), 1);
}

#[test]
fn test_closed_project_is_inaccessible() {
    let temp = create_workspace();
    fs::write(temp.path().join("app/treeshift.toml"), "closed = true\n").unwrap();

    let loaded = ProjectScanner::new(ScanConfig::new(temp.path())).scan().unwrap();
    let app = loaded.workspace.find_resource("app").unwrap();
    assert!(!loaded.workspace.is_accessible(app));
}
