//! Integration tests for decompiling trees back into entities

use super::test_utils::entities;
use serde_json::json;
use tessera::node::snapshot_tree;
use tessera::{flatten, unflatten, CompileOptions, Compiler};

#[test]
fn test_flatten_encodes_slot_children_with_legacy_parent() {
    let store = entities(json!({
        "card": {"type": "Card"},
        "title": {"type": "Text", "parent": "card", "slot": "header"},
        "body": {"type": "Text", "parent": "card"}
    }));
    let roots = Compiler::new()
        .compile(&store, &CompileOptions::default())
        .unwrap();
    let flat = flatten(&roots);

    assert_eq!(flat.len(), 3);
    assert_eq!(flat.get("title").unwrap().parent.as_deref(), Some("[slot]card.header"));
    assert_eq!(flat.get("body").unwrap().parent.as_deref(), Some("card"));
    assert!(flat.get("card").unwrap().parent.is_none());
}

#[test]
fn test_flatten_folds_inheritance_and_drops_markers() {
    let store = entities(json!({
        "base": {"type": "Chip", "props": {"tone": "info"}},
        "chip": {"type": "Chip", "inherit": "base", "parent": "base"}
    }));
    let roots = Compiler::new()
        .compile(&store, &CompileOptions::default().with_max_depth(1))
        .unwrap();
    let flat = flatten(&roots);

    let base = flat.get("base").unwrap();
    assert!(!base.props.contains_key("_error"));
    assert_eq!(flat.len(), 1);

    let full = Compiler::new()
        .compile(&store, &CompileOptions::default())
        .unwrap();
    let flat = flatten(&full);
    let chip = flat.get("chip").unwrap();
    assert!(chip.inherit.is_none());
    assert_eq!(chip.props["tone"], json!("info"));
}

#[test]
fn test_flatten_unflatten_is_idempotent() {
    let store = entities(json!([
        {"id": "app", "type": "Page"},
        {"id": "nav", "type": "Nav", "parent": "app", "style_tw": "flex gap-2"},
        {"id": "logo", "type": "Image", "parent": "nav", "slot": "start"},
        {"id": "main", "type": "Box", "parent": "app", "props": {"pad": 2}},
        {"id": "modal", "type": "Dialog"}
    ]));
    let roots = Compiler::new()
        .compile(&store, &CompileOptions::default())
        .unwrap();

    let once = flatten(&roots);
    let rebuilt = unflatten(&once).unwrap();
    let twice = flatten(&rebuilt);

    assert_eq!(once.len(), twice.len());
    for entity in once.iter() {
        let other = twice.get(&entity.id).unwrap();
        assert_eq!(entity.node_type, other.node_type, "type of {}", entity.id);
        assert_eq!(entity.parent, other.parent, "parent of {}", entity.id);
    }
    assert_eq!(snapshot_tree(&roots), snapshot_tree(&rebuilt));
}
