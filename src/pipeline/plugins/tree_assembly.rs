use crate::error::CompileError;
use crate::node::{NodeRef, SlotContent};
use crate::pipeline::{PipelineContext, Plugin, PluginScope, Stage};
use std::collections::BTreeMap;

/// Materializes `children` and `slots` from the arena topology and picks the roots
pub struct TreeAssembly;

const NAME: &str = "tree_assembly";

impl Plugin for TreeAssembly {
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
        let mut plan: Vec<(NodeRef, Vec<NodeRef>, BTreeMap<String, SlotContent>)> =
            Vec::with_capacity(ctx.state.nodes.len());

        for node in ctx.state.nodes.values() {
            let child_ids = node.read().child_ids.clone();
            let mut children = Vec::new();
            let mut slots: BTreeMap<String, SlotContent> = BTreeMap::new();
            for child_id in &child_ids {
                let Some(child) = ctx.state.nodes.get(child_id) else {
                    continue;
                };
                let slot = child.read().slot.clone();
                match slot {
                    None => children.push(child.clone()),
                    Some(name) => {
                        let content = match slots.remove(&name) {
                            Some(existing) => existing.push(child.clone()),
                            None => SlotContent::Single(child.clone()),
                        };
                        slots.insert(name, content);
                    }
                }
            }
            plan.push((node.clone(), children, slots));
        }

        for (node, children, slots) in plan {
            let mut node = node.write();
            node.children = children;
            node.slots = slots;
        }

        let explicit = ctx
            .options
            .root_id
            .as_deref()
            .and_then(|root| ctx.state.nodes.get(root).cloned());
        let roots = match explicit {
            Some(root) => vec![root],
            None => {
                if let Some(root) = ctx.options.root_id.clone() {
                    ctx.warn(NAME, &root, "Configured root does not exist; using parent-less nodes");
                }
                ctx.entities
                    .ids()
                    .filter_map(|id| ctx.state.nodes.get(id))
                    .filter(|node| node.read().parent.is_none())
                    .cloned()
                    .collect()
            }
        };
        ctx.roots = Some(roots);
        Ok(())
    }
}
