use crate::error::CompileError;
use crate::node::{NodeRef, ERROR_PROP, RECURSION_DEPTH_EXCEEDED};
use crate::pipeline::{PipelineContext, Plugin, PluginScope, Stage};
use crate::types::NodeId;
use serde_json::Value;
use tracing::warn;

/// Rejects traversal cycles and truncates the tree at the depth ceiling.
///
/// Roots sit at depth 1. A node at `max_depth` loses its children and slots
/// and carries `_error: RECURSION_DEPTH_EXCEEDED`; nodes below it are not
/// reachable from the roots.
pub struct RecursionGuard;

const NAME: &str = "recursion_guard";

impl Plugin for RecursionGuard {
    fn name(&self) -> &'static str {
        NAME
    }

    fn stage(&self) -> Stage {
        Stage::PostAssemble
    }

    fn scope(&self) -> PluginScope {
        PluginScope::WholeContext
    }

    fn run(&self, ctx: &mut PipelineContext<'_>) -> Result<(), CompileError> {
        let roots = ctx.roots.clone().unwrap_or_default();
        let max_depth = ctx.options.max_depth.max(1);
        let mut active: Vec<NodeId> = Vec::new();
        for root in &roots {
            visit(root, 1, max_depth, &mut active)?;
        }
        Ok(())
    }
}

fn visit(
    node: &NodeRef,
    depth: usize,
    max_depth: usize,
    active: &mut Vec<NodeId>,
) -> Result<(), CompileError> {
    let id = node.read().id.clone();
    if active.contains(&id) {
        let mut path = active.join(".");
        path.push('.');
        path.push_str(&id);
        return Err(CompileError::RecursionCycle { id, path });
    }

    if depth >= max_depth {
        let mut node = node.write();
        let truncated = !node.children.is_empty() || !node.slots.is_empty();
        node.children.clear();
        node.slots.clear();
        let marker = Value::String(RECURSION_DEPTH_EXCEEDED.to_string());
        node.props.insert(ERROR_PROP.to_string(), marker.clone());
        node.resolved_props.insert(ERROR_PROP.to_string(), marker);
        if truncated {
            warn!(plugin = NAME, node_id = %id, path = %node.full_path, depth, "Depth ceiling reached, children truncated");
        }
        return Ok(());
    }

    let next: Vec<NodeRef> = {
        let mut guard = node.write();
        if guard.error_marker() == Some(RECURSION_DEPTH_EXCEEDED) {
            guard.props.remove(ERROR_PROP);
            guard.resolved_props.remove(ERROR_PROP);
        }
        let mut next = guard.children.clone();
        for content in guard.slots.values() {
            next.extend(content.nodes());
        }
        next
    };

    active.push(id);
    for child in &next {
        visit(child, depth + 1, max_depth, active)?;
    }
    active.pop();
    Ok(())
}
