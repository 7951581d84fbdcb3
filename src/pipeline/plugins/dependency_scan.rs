use crate::binding::extract_keys;
use crate::error::CompileError;
use crate::pipeline::{PipelineContext, Plugin, PluginScope, Stage};
use serde_json::Value;

/// Records which binding keys each node's props read
pub struct DependencyScan;

impl Plugin for DependencyScan {
    fn name(&self) -> &'static str {
        "dependency_scan"
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
        let keys = extract_keys(&Value::Object(node.read().props.clone()));
        ctx.state.dependencies.update(id, keys);
        Ok(())
    }
}
