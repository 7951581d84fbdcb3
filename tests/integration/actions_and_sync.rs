//! Integration tests for action tags and two-way bound props through the runtime

use super::test_utils::patch;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tessera::{ActionDefinition, ActionRegistry, AtomStore, Runtime, TesseraConfig};

fn counter_actions(calls: Arc<AtomicUsize>) -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register(
        ActionDefinition::new("increment", move |call| {
            calls.fetch_add(1, Ordering::SeqCst);
            if let Some(atoms) = call.atoms {
                let current = atoms.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
                atoms.set("count", json!(current + 1));
            }
        })
        .requires_atom("count"),
    );
    registry
}

#[test]
fn test_action_writes_atom_and_label_recompiles() {
    let runtime = Runtime::new(&TesseraConfig::default());
    let calls = Arc::new(AtomicUsize::new(0));
    runtime.set_actions(counter_actions(calls.clone()));
    runtime
        .feed_all(&[
            patch("count", json!({"type": "State", "props": {"value": 0}})),
            patch("btn", json!({"type": "Button", "actions": {"increment": ["click"]}})),
            patch("label", json!({"type": "Text", "props": {"text": "{{count}}"}})),
        ])
        .unwrap();

    assert!(runtime.warnings().is_empty(), "{:?}", runtime.warnings());
    assert_eq!(
        runtime.node("label").unwrap().read().resolved_props["text"],
        json!(0)
    );

    assert!(runtime.emit("btn", "click", &json!({})));
    assert!(runtime.emit("btn", "click", &json!({})));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(runtime.atoms().get("count"), Some(json!(2)));
    assert_eq!(
        runtime.node("label").unwrap().read().resolved_props["text"],
        json!(2)
    );
    assert!(!runtime.emit("btn", "hover", &json!({})));
}

#[test]
fn test_unknown_tag_is_a_warning_not_an_error() {
    let runtime = Runtime::new(&TesseraConfig::default());
    runtime.set_actions(ActionRegistry::new());
    runtime
        .feed(&patch("btn", json!({"type": "Button", "actions": {"launch": ["click"]}})))
        .unwrap();

    assert!(runtime.last_error().is_none());
    let warnings = runtime.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].node_id, "btn");
    assert!(warnings[0].message.contains("launch"));
}

#[test]
fn test_bound_input_change_updates_atom_and_readers() {
    let runtime = Runtime::new(&TesseraConfig::default());
    runtime.atoms().set("email", json!(""));
    runtime
        .feed_all(&[
            patch("field", json!({"type": "Input", "props": {"value": "{{email}}"}})),
            patch("echo", json!({"type": "Text", "props": {"text": "You typed {{email}}"}})),
        ])
        .unwrap();

    assert!(runtime.emit("field", "change", &json!({"value": "ada@example.com"})));
    assert_eq!(runtime.atoms().get("email"), Some(json!("ada@example.com")));
    assert_eq!(
        runtime.node("echo").unwrap().read().resolved_props["text"],
        json!("You typed ada@example.com")
    );
    assert_eq!(
        runtime.node("field").unwrap().read().resolved_props["value"],
        json!("ada@example.com")
    );
}
