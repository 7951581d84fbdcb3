use crate::atoms::Atom;
use crate::error::CompileError;
use crate::pipeline::{PipelineContext, Plugin, PluginScope, Stage};
use serde_json::Value;
use tracing::debug;

/// Entity type that declares an atom instead of rendering
pub const STATE_TYPE: &str = "State";

/// Seeds atoms declared by `State` entities and schema defaults.
///
/// Existing atoms are never overwritten, so user writes survive recompiles.
pub struct StateHydration;

const NAME: &str = "state_hydration";

impl Plugin for StateHydration {
    fn name(&self) -> &'static str {
        NAME
    }

    fn stage(&self) -> Stage {
        Stage::PreProcess
    }

    fn scope(&self) -> PluginScope {
        PluginScope::PerEntity
    }

    fn visit(&self, id: &str, ctx: &mut PipelineContext<'_>) -> Result<(), CompileError> {
        let Some(entity) = ctx.entity(id) else {
            return Ok(());
        };

        let is_state = entity.node_type.as_deref() == Some(STATE_TYPE);
        let schema = entity.props.get("schema").cloned();
        let default = schema.as_ref().and_then(|s| s.get("default")).cloned();
        if !is_state && default.is_none() {
            return Ok(());
        }

        let (key, value) = if is_state {
            let key = entity
                .props
                .get("key")
                .and_then(Value::as_str)
                .unwrap_or(id)
                .to_string();
            let value = entity
                .props
                .get("value")
                .cloned()
                .or(default)
                .unwrap_or(Value::Null);
            (key, value)
        } else {
            (id.to_string(), default.unwrap_or(Value::Null))
        };

        let Some(atoms) = ctx.options.atoms.clone() else {
            ctx.warn(NAME, id, "State declaration ignored: no atom store configured");
            return Ok(());
        };
        if atoms.contains(&key) {
            return Ok(());
        }

        debug!(id, key = %key, "Seeding atom");
        atoms.insert_atom(&key, Atom::with_schema(value, schema));
        Ok(())
    }
}
