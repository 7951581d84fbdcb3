//! Integration tests for incremental compiles and node identity

use super::test_utils::{chain, entities, patch};
use serde_json::json;
use tessera::node::snapshot_tree;
use tessera::{same_node, CompileOptions, Compiler, Entity};

#[test]
fn test_empty_dirty_set_returns_identical_references() {
    let store = chain(5);
    let mut compiler = Compiler::new();
    let first = compiler.compile(&store, &CompileOptions::default()).unwrap();
    let second = compiler
        .compile(&store, &CompileOptions::default().with_dirty(Vec::<String>::new()))
        .unwrap();

    assert_eq!(first.len(), second.len());
    assert!(same_node(&first[0], &second[0]));
    for i in 0..5 {
        let id = format!("n{i}");
        assert!(compiler.node(&id).is_some());
    }
    assert_eq!(snapshot_tree(&first), snapshot_tree(&second));
}

#[test]
fn test_only_dirty_node_is_refreshed() {
    let mut store = entities(json!({
        "root": {"type": "Page"},
        "a": {"type": "Text", "parent": "root", "props": {"text": "A"}},
        "b": {"type": "Text", "parent": "root", "props": {"text": "B"}}
    }));
    let mut compiler = Compiler::new();
    compiler.compile(&store, &CompileOptions::default()).unwrap();
    let root = compiler.node("root").unwrap();
    let a = compiler.node("a").unwrap();
    let b = compiler.node("b").unwrap();

    store
        .merge_patch(&patch("b", json!({"props": {"text": "B2"}})))
        .unwrap();
    let roots = compiler
        .compile(&store, &CompileOptions::default().with_dirty(["b"]))
        .unwrap();

    assert!(same_node(&roots[0], &root));
    assert!(same_node(&compiler.node("a").unwrap(), &a));
    assert!(same_node(&compiler.node("b").unwrap(), &b));
    assert_eq!(b.read().props["text"], json!("B2"));
    assert_eq!(a.read().props["text"], json!("A"));
}

#[test]
fn test_dirty_base_recomputes_inheritors() {
    let mut store = entities(json!({
        "base": {"type": "Button", "props": {"size": "s"}},
        "derived": {"type": "Button", "inherit": "base"}
    }));
    let mut compiler = Compiler::new();
    compiler.compile(&store, &CompileOptions::default()).unwrap();
    assert_eq!(
        compiler.node("derived").unwrap().read().props["size"],
        json!("s")
    );

    store
        .merge_patch(&patch("base", json!({"props": {"size": "l"}})))
        .unwrap();
    compiler
        .compile(&store, &CompileOptions::default().with_dirty(["base"]))
        .unwrap();

    assert_eq!(
        compiler.node("derived").unwrap().read().props["size"],
        json!("l")
    );
}

#[test]
fn test_new_node_joins_existing_parent() {
    let mut store = entities(json!({
        "list": {"type": "List"},
        "one": {"type": "Item", "parent": "list"}
    }));
    let mut compiler = Compiler::new();
    compiler.compile(&store, &CompileOptions::default()).unwrap();
    let one = compiler.node("one").unwrap();

    store.insert(Entity::new("two", "Item").with_parent("list"));
    let roots = compiler
        .compile(&store, &CompileOptions::default().with_dirty(["two"]))
        .unwrap();

    let list = roots[0].read();
    let ids: Vec<String> = list.children.iter().map(|c| c.read().id.clone()).collect();
    assert_eq!(ids, vec!["one", "two"]);
    assert!(same_node(&list.children[0], &one));
    assert_eq!(compiler.path_of("two"), Some("list.two"));
}

#[test]
fn test_incremental_matches_full_compile() {
    let mut store = entities(json!([
        {"id": "app", "type": "Page"},
        {"id": "side", "type": "Box", "parent": "app"},
        {"id": "main", "type": "Box", "parent": "app"},
        {"id": "card", "type": "Card", "parent": "main"}
    ]));
    let mut incremental = Compiler::new();
    incremental.compile(&store, &CompileOptions::default()).unwrap();

    store
        .merge_patch(&patch("card", json!({"parent": "side", "props": {"n": 1}})))
        .unwrap();
    let updated = incremental
        .compile(&store, &CompileOptions::default().with_dirty(["card"]))
        .unwrap();
    let full = Compiler::new()
        .compile(&store, &CompileOptions::default())
        .unwrap();

    assert_eq!(snapshot_tree(&updated), snapshot_tree(&full));
}
