use std::path::PathBuf;

use treeshift_core::{
    BufferState, Element, ElementHandle, ModelError, RefactoringStatus, ReorgConfig, ResourceKind,
    Severity, SymbolKind, Workspace, source,
};

fn workspace() -> Workspace {
    let mut ws = Workspace::new();
    ws.build(|ws| {
        let app = ws.add_project("app").unwrap();
        let src = ws.create_folder(app, "src").unwrap();
        ws.add_source_root(src, false, vec![]).unwrap();
        let p = ws.add_folders(src, "p").unwrap();
        ws.add_file(
            p,
            "A.java",
            "package p;\n\npublic class A {\n    private int f;\n    public int getF() { return f; }\n}\n",
        )
        .unwrap();
        ws.add_file(p, "notes.txt", "p.A").unwrap();
        let q = ws.add_folders(src, "q").unwrap();
        ws.add_file(q, "B.java", "package q;\n\nimport p.A;\n\nclass B { A a; }\n")
            .unwrap();
        ws.create_folder(app, "docs").unwrap();
    });
    ws
}

#[test]
fn test_resource_tree_paths() {
    let ws = workspace();
    let file = ws.find_resource("app/src/p/A.java").unwrap();
    assert_eq!(ws.resource(file).kind, ResourceKind::File);
    assert_eq!(ws.resource_path(file), PathBuf::from("app/src/p/A.java"));

    let app = ws.find_resource("app").unwrap();
    assert_eq!(ws.project_of_resource(file), Some(app));
    assert!(ws.is_resource_ancestor(app, file));
    assert!(ws.find_resource("app/src/missing").is_none());
}

#[test]
fn test_non_source_files_are_resources_only() {
    let ws = workspace();
    let notes = ws.find_resource("app/src/p/notes.txt").unwrap();
    assert!(ws.symbol_for_resource(notes).is_none());

    let docs = ws.find_resource("app/docs").unwrap();
    assert!(ws.symbol_for_resource(docs).is_none());
}

#[test]
fn test_symbol_tree_shape() {
    let ws = workspace();
    let project = ws.projects()[0];
    assert_eq!(ws.symbol(project).kind, SymbolKind::Project);

    let units = ws.project_units(project);
    assert_eq!(units.len(), 2);

    let a = units
        .iter()
        .copied()
        .find(|u| ws.symbol(*u).name == "A.java")
        .unwrap();
    let ty = ws.top_level_types(a)[0];
    let names: Vec<_> = ws
        .symbol(ty)
        .children
        .iter()
        .map(|c| ws.symbol(*c).name.to_string())
        .collect();
    assert_eq!(names, vec!["f", "getF"]);
    assert_eq!(ws.qualified_name(ty), "p.A");
    assert_eq!(ws.enclosing_unit(ty), Some(a));
    assert!(!ws.is_read_only_symbol(ty));
}

#[test]
fn test_read_only_derived_from_resource() {
    let mut ws = workspace();
    let file = ws.find_resource("app/src/p/A.java").unwrap();
    ws.set_read_only(file, true);
    let unit = ws.symbol_for_resource(file).unwrap();
    let field = ws.symbol(ws.top_level_types(unit)[0]).children[0];
    assert!(ws.is_read_only_symbol(field));
}

#[test]
fn test_handles_round_trip_through_workspace() {
    let ws = workspace();
    for text in ["app/src/p/notes.txt", "project:app", "root:app/src", "ns:app/src:q"] {
        let handle: ElementHandle = text.parse().unwrap();
        let element = ws.resolve_handle(&handle).unwrap();
        assert_eq!(ws.handle_for(element).unwrap().to_string(), text);
    }
}

#[test]
fn test_move_error_reporting() {
    let mut ws = workspace();
    let a = ws.find_resource("app/src/p/A.java").unwrap();
    let q = ws.find_resource("app/src/q").unwrap();
    ws.add_file(q, "A.java", "package q;\nclass A {}\n").unwrap();

    let err = ws.move_resource(a, q, None).unwrap_err();
    assert!(matches!(err, ModelError::NameCollision { .. }));

    ws.move_resource(a, q, Some("A2.java")).unwrap();
    assert!(ws.find_resource("app/src/q/A2.java").is_some());
}

#[test]
fn test_buffer_state_is_tracked() {
    let mut ws = workspace();
    let a = ws.find_resource("app/src/p/A.java").unwrap();
    assert_eq!(ws.resource(a).buffer, BufferState::Saved);
    ws.set_buffer(a, BufferState::Dirty);
    assert_eq!(ws.resource(a).buffer, BufferState::Dirty);
}

#[test]
fn test_status_and_config_together() {
    let config = ReorgConfig::default();
    assert!(config.update_references);

    let mut status = RefactoringStatus::new();
    status.add(Severity::Warning, "dirty", Some(Element::Resource(treeshift_core::ResourceId::new(1))));
    assert_eq!(status.severity(), Severity::Warning);
}

#[test]
fn test_outline_through_workspace() {
    let ws = workspace();
    let b = ws.find_resource("app/src/q/B.java").unwrap();
    let unit = ws.symbol_for_resource(b).unwrap();
    let outline = ws.outline(unit).unwrap();
    assert_eq!(outline.imports[0].name, "p.A");
    assert_eq!(source::simple_name(&outline.imports[0].name), "A");
}
