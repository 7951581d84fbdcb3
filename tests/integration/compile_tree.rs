//! Integration tests for full compiles: hierarchy, inheritance, slots and paths

use super::test_utils::entities;
use serde_json::json;
use tessera::node::{snapshot_tree, SlotContent};
use tessera::{CompileError, CompileOptions, Compiler};

#[test]
fn test_parent_chain_builds_nested_tree_with_full_paths() {
    let store = entities(json!({
        "c": {"type": "Text", "parent": "b"},
        "b": {"type": "Box", "parent": "a"},
        "a": {"type": "Page"}
    }));
    let mut compiler = Compiler::new();
    let roots = compiler.compile(&store, &CompileOptions::default()).unwrap();

    assert_eq!(roots.len(), 1);
    let a = roots[0].read();
    assert_eq!(a.id, "a");
    let b = a.children[0].read();
    let c = b.children[0].read();
    assert_eq!(c.id, "c");
    assert_eq!(c.full_path, "a.b.c");
    assert_eq!(compiler.resolve_path("a.b.c"), Some("c"));
}

#[test]
fn test_inherited_props_merge_with_child_winning() {
    let store = entities(json!({
        "base": {"type": "Button", "props": {"theme": "dark", "color": "blue"}},
        "child": {"type": "Button", "inherit": "base", "props": {"color": "red"}}
    }));
    let mut compiler = Compiler::new();
    compiler.compile(&store, &CompileOptions::default()).unwrap();

    let child = compiler.node("child").unwrap();
    let child = child.read();
    assert_eq!(child.props["theme"], json!("dark"));
    assert_eq!(child.props["color"], json!("red"));
    assert_eq!(child.props.len(), 2);
}

#[test]
fn test_missing_inherit_base_only_warns() {
    let store = entities(json!({"x": {"type": "Box", "inherit": "ghost"}}));
    let mut compiler = Compiler::new();
    let roots = compiler.compile(&store, &CompileOptions::default()).unwrap();

    assert_eq!(roots.len(), 1);
    assert_eq!(compiler.warnings().len(), 1);
    assert_eq!(compiler.warnings()[0].node_id, "x");
}

#[test]
fn test_circular_inheritance_is_fatal() {
    let store = entities(json!({
        "a": {"type": "Box", "inherit": "b"},
        "b": {"type": "Box", "inherit": "a"}
    }));
    let err = Compiler::new()
        .compile(&store, &CompileOptions::default())
        .unwrap_err();
    assert!(matches!(err, CompileError::CircularInheritance { .. }));
}

#[test]
fn test_self_and_transitive_parent_cycles_are_fatal() {
    let own = entities(json!({"a": {"type": "Box", "parent": "a"}}));
    let err = Compiler::new()
        .compile(&own, &CompileOptions::default())
        .unwrap_err();
    assert!(matches!(err, CompileError::CircularParent { .. }));

    let loop3 = entities(json!({
        "a": {"type": "Box", "parent": "c"},
        "b": {"type": "Box", "parent": "a"},
        "c": {"type": "Box", "parent": "b"}
    }));
    let err = Compiler::new()
        .compile(&loop3, &CompileOptions::default())
        .unwrap_err();
    assert!(matches!(err, CompileError::CircularParent { .. }));
    assert!(err.node_id().is_some());
}

#[test]
fn test_modern_and_legacy_slot_addressing_agree() {
    let modern = entities(json!({
        "card": {"type": "Card"},
        "title": {"type": "Text", "parent": "card", "slot": "header"}
    }));
    let legacy = entities(json!({
        "card": {"type": "Card"},
        "title": {"type": "Text", "parent": "[slot]card.header"}
    }));

    let mut first = Compiler::new();
    let mut second = Compiler::new();
    let modern_roots = first.compile(&modern, &CompileOptions::default()).unwrap();
    let legacy_roots = second.compile(&legacy, &CompileOptions::default()).unwrap();

    assert_eq!(snapshot_tree(&modern_roots), snapshot_tree(&legacy_roots));
    let card = modern_roots[0].read();
    assert!(card.children.is_empty());
    assert!(matches!(card.slots.get("header"), Some(SlotContent::Single(_))));
}

#[test]
fn test_compiling_twice_yields_equal_trees() {
    let store = entities(json!([
        {"id": "app", "type": "Page"},
        {"id": "nav", "type": "Nav", "parent": "app"},
        {"id": "body", "type": "Box", "parent": "app", "props": {"gap": 4}},
        {"id": "cta", "type": "Button", "parent": "body", "slot": "footer"}
    ]));

    let first = Compiler::new()
        .compile(&store, &CompileOptions::default())
        .unwrap();
    let second = Compiler::new()
        .compile(&store, &CompileOptions::default())
        .unwrap();
    assert_eq!(snapshot_tree(&first), snapshot_tree(&second));
}

#[test]
fn test_state_entities_seed_bindings_in_one_pass() {
    use tessera::{AtomRegistry, AtomStore};

    let atoms = AtomRegistry::new();
    let store = entities(json!({
        "user": {"type": "State", "props": {"value": {"name": "Ada"}}},
        "greeting": {"type": "Text", "props": {"text": "Hello {{user.name}}"}}
    }));
    let mut compiler = Compiler::new();
    compiler
        .compile(&store, &CompileOptions::default().with_atoms(atoms.clone()))
        .unwrap();

    assert_eq!(atoms.get("user"), Some(json!({"name": "Ada"})));
    let greeting = compiler.node("greeting").unwrap();
    assert_eq!(greeting.read().resolved_props["text"], json!("Hello Ada"));
}
