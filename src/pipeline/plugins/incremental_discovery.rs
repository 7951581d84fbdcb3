use crate::error::CompileError;
use crate::node::Node;
use crate::pipeline::{PipelineContext, Plugin, PluginScope, Stage};
use crate::types::NodeId;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace};

/// Maintains the node arena.
///
/// Full compiles rebuild every node. Incremental compiles refresh dirty nodes
/// in place, create new ones, prune removed ids, and relink any node whose
/// resolved parent or slot changed. Clean nodes keep their handles.
pub struct IncrementalDiscovery;

impl Plugin for IncrementalDiscovery {
    fn name(&self) -> &'static str {
        "incremental_discovery"
    }

    fn stage(&self) -> Stage {
        Stage::ReStructure
    }

    fn scope(&self) -> PluginScope {
        PluginScope::WholeContext
    }

    fn run(&self, ctx: &mut PipelineContext<'_>) -> Result<(), CompileError> {
        match ctx.dirty.clone() {
            None => rebuild_all(ctx),
            Some(dirty) => {
                for id in &dirty {
                    update_one(ctx, id);
                }
            }
        }
        sync_topology(ctx);
        sync_paths(ctx);
        Ok(())
    }
}

fn rebuild_all(ctx: &mut PipelineContext<'_>) {
    let entities = ctx.entities;
    ctx.state.nodes.clear();
    for id in entities.ids() {
        if let Some(entity) = ctx.entity(id) {
            let node = Node::from_entity(entity);
            ctx.state.nodes.insert(id.clone(), Arc::new(RwLock::new(node)));
        }
    }
}

fn update_one(ctx: &mut PipelineContext<'_>, id: &str) {
    // The resolved copy outlives a removed entity, so presence is checked on the store.
    let entity = if ctx.entities.contains(id) {
        ctx.entity(id).cloned()
    } else {
        None
    };
    let Some(entity) = entity else {
        if let Some(node) = ctx.state.nodes.get(id).cloned() {
            let parent = node.read().parent.clone();
            if let Some(parent) = parent.and_then(|p| ctx.state.nodes.get(&p).cloned()) {
                parent.write().child_ids.retain(|child| child != id);
            }
            debug!(id, "Pruning removed node");
        }
        ctx.state.prune(id);
        return;
    };

    match ctx.state.nodes.get(id).cloned() {
        Some(node) => {
            let mut node = node.write();
            if node.props != entity.props {
                ctx.state.attributes.remove(id);
            }
            node.refresh_from(&entity);
            trace!(id, "Refreshed node in place");
        }
        None => {
            let node = Node::from_entity(&entity);
            ctx.state
                .nodes
                .insert(id.to_string(), Arc::new(RwLock::new(node)));
            trace!(id, "Created node");
        }
    }
}

/// Bring each node's parent link in line with the path table.
fn sync_topology(ctx: &mut PipelineContext<'_>) {
    let ids: Vec<NodeId> = ctx.entities.ids().cloned().collect();
    for id in &ids {
        let Some(node) = ctx.state.nodes.get(id).cloned() else {
            continue;
        };
        let (wanted_parent, wanted_slot) = match ctx.state.paths.parent_of(id) {
            Some(parent) if ctx.state.nodes.contains_key(&parent.id) => {
                (Some(parent.id.clone()), parent.slot.clone())
            }
            _ => (None, None),
        };

        let (current_parent, current_slot) = {
            let node = node.read();
            (node.parent.clone(), node.slot.clone())
        };
        if current_parent == wanted_parent {
            if current_slot != wanted_slot {
                node.write().slot = wanted_slot;
            }
            continue;
        }

        if let Some(old) = current_parent.and_then(|p| ctx.state.nodes.get(&p).cloned()) {
            old.write().child_ids.retain(|child| child != id);
        }
        if let Some(new) = wanted_parent.as_ref().and_then(|p| ctx.state.nodes.get(p).cloned()) {
            new.write().child_ids.push(id.clone());
        }

        let mut node = node.write();
        node.parent = wanted_parent;
        node.slot = wanted_slot;
    }
}

fn sync_paths(ctx: &mut PipelineContext<'_>) {
    for (id, node) in &ctx.state.nodes {
        let Some(path) = ctx.state.paths.path_of(id) else {
            continue;
        };
        if node.read().full_path != path {
            node.write().full_path = path.to_string();
        }
    }
}
