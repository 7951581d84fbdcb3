//! Decompile: hydrated tree back to a flat entity map.

use super::paths::encode_slot_parent;
use super::{CompileOptions, Compiler};
use crate::entity::{Entity, EntityStore};
use crate::error::CompileError;
use crate::node::{Node, NodeRef, ERROR_PROP};

/// Flatten a tree into entities, in pre-order.
///
/// Positional children reference their parent by id; slot children use the
/// `[slot]parent.slotName` form. Error markers are dropped and inheritance is
/// already folded in, so `inherit` is never emitted.
pub fn flatten(roots: &[NodeRef]) -> EntityStore {
    let mut store = EntityStore::new();
    for root in roots {
        walk(root, None, &mut store);
    }
    store
}

fn walk(node: &NodeRef, parent: Option<String>, store: &mut EntityStore) {
    let node = node.read();
    store.insert(to_entity(&node, parent));
    for child in &node.children {
        walk(child, Some(node.id.clone()), store);
    }
    for (slot, content) in &node.slots {
        for child in content.nodes() {
            walk(&child, Some(encode_slot_parent(&node.id, slot)), store);
        }
    }
}

fn to_entity(node: &Node, parent: Option<String>) -> Entity {
    let mut props = node.props.clone();
    props.remove(ERROR_PROP);
    Entity {
        id: node.id.clone(),
        node_type: node.node_type.clone(),
        props,
        style_presets: node.style_presets.clone(),
        style_tw: node.style_tw.clone(),
        style_css: node.style_css.clone(),
        parent,
        slot: None,
        inherit: None,
        actions: node.actions.clone(),
    }
}

/// Compile a flat entity map with a throwaway compiler
pub fn unflatten(entities: &EntityStore) -> Result<Vec<NodeRef>, CompileError> {
    Compiler::new().compile(entities, &CompileOptions::default())
}
