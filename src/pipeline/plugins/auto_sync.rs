use crate::binding::binding_key;
use crate::error::CompileError;
use crate::node::EventHandler;
use crate::pipeline::{PipelineContext, Plugin, PluginScope, Stage};
use serde_json::Value;

/// Event bound for two-way synchronization
pub const CHANGE_EVENT: &str = "change";

/// Binds a `change` handler that writes back to the atom a sync prop is bound
/// to (`"value": "{{form.email}}"`).
pub struct AutoSync;

const NAME: &str = "auto_sync";

impl Plugin for AutoSync {
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
        let keys: Vec<String> = {
            let node = node.read();
            ctx.options
                .sync_props
                .iter()
                .filter_map(|prop| node.props.get(prop))
                .filter_map(binding_key)
                .map(str::to_string)
                .collect()
        };
        if keys.is_empty() {
            return Ok(());
        }

        let Some(store) = ctx.options.atoms.clone() else {
            ctx.warn(NAME, id, "Two-way binding skipped: no atom store configured");
            return Ok(());
        };

        let mut node = node.write();
        for key in keys {
            let store = store.clone();
            node.bind(
                CHANGE_EVENT,
                EventHandler::new(move |payload: &Value| {
                    let value = payload.get("value").cloned().unwrap_or_else(|| payload.clone());
                    store.set(&key, value);
                }),
            );
        }
        Ok(())
    }
}
