use crate::error::CompileError;
use crate::pipeline::{PipelineContext, Plugin, PluginScope, Stage};

/// Resolves parent references and recomputes every full path
pub struct PathResolution;

impl Plugin for PathResolution {
    fn name(&self) -> &'static str {
        "path_resolution"
    }

    fn stage(&self) -> Stage {
        Stage::ReStructure
    }

    fn scope(&self) -> PluginScope {
        PluginScope::WholeContext
    }

    fn run(&self, ctx: &mut PipelineContext<'_>) -> Result<(), CompileError> {
        ctx.state.paths.rebuild(ctx.entities)
    }
}
