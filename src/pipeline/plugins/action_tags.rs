use crate::actions::ActionInvocation;
use crate::error::CompileError;
use crate::node::EventHandler;
use crate::pipeline::{PipelineContext, Plugin, PluginScope, Stage};
use serde_json::Value;
use std::sync::Arc;

/// Binds registered action-tag handlers to the events an entity lists
pub struct ActionTags;

const NAME: &str = "action_tags";

impl Plugin for ActionTags {
    fn name(&self) -> &'static str {
        NAME
    }

    fn stage(&self) -> Stage {
        Stage::Hydrate
    }

    fn scope(&self) -> PluginScope {
        PluginScope::PerEntity
    }

    fn visit(&self, id: &str, ctx: &mut PipelineContext<'_>) -> Result<(), CompileError> {
        let Some(node) = ctx.node(id) else {
            return Ok(());
        };
        let (actions, props) = {
            let node = node.read();
            (node.actions.clone(), node.resolved_props.clone())
        };
        if actions.is_empty() {
            return Ok(());
        }

        let Some(registry) = ctx.options.actions.clone() else {
            ctx.warn(NAME, id, "Action tags declared but no action registry configured");
            return Ok(());
        };
        let atoms = ctx.options.atoms.clone();
        let props = Arc::new(props);

        for (tag, events) in &actions {
            let Some(definition) = registry.get(tag) else {
                ctx.warn(NAME, id, format!("Unknown action tag '{}'", tag));
                continue;
            };

            for key in &definition.required_atoms {
                if !atoms.as_ref().is_some_and(|store| store.contains(key)) {
                    ctx.warn(
                        NAME,
                        id,
                        format!("Action '{}' expects atom '{}' which is not defined", tag, key),
                    );
                }
            }
            for prop in &definition.required_props {
                if !props.contains_key(prop) {
                    ctx.warn(
                        NAME,
                        id,
                        format!("Action '{}' expects prop '{}' which is not set", tag, prop),
                    );
                }
            }

            let mut node = node.write();
            for event in events {
                let handler = definition.handler();
                let node_id = id.to_string();
                let tag = tag.clone();
                let event_name = event.clone();
                let props = props.clone();
                let atoms = atoms.clone();
                node.bind(
                    event,
                    EventHandler::new(move |payload: &Value| {
                        handler(&ActionInvocation {
                            node_id: &node_id,
                            tag: &tag,
                            event: &event_name,
                            payload,
                            props: &props,
                            atoms: atoms.as_deref(),
                        })
                    }),
                );
            }
        }
        Ok(())
    }
}
