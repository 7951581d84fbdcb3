//! Compiler Pipeline
//!
//! Staged, plugin-based compilation of a flat entity map into a hydrated node
//! tree. Stages run in a fixed order; within a stage, plugins run in the order
//! they were registered.

pub mod compiler;
pub mod context;
pub mod descriptor;
pub mod flatten;
pub mod paths;
pub mod plugins;

pub use compiler::Compiler;
pub use context::{
    CompileOptions, CompileWarning, CompilerState, DependencyIndex, PipelineContext,
    DEFAULT_MAX_DEPTH,
};
pub use descriptor::{Descriptor, DescriptorBuilder, Styles, PASSTHROUGH_TYPE};
pub use flatten::{flatten, unflatten};
pub use paths::{ParentAddress, PathTable};

use crate::error::CompileError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Compilation stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    PreProcess,
    ReStructure,
    Hydrate,
    PostAssemble,
}

impl Stage {
    pub const ORDER: [Stage; 4] = [
        Stage::PreProcess,
        Stage::ReStructure,
        Stage::Hydrate,
        Stage::PostAssemble,
    ];
}

/// How the compiler drives a plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginScope {
    /// `visit` once per relevant id; non-dirty ids are skipped on incremental calls
    PerEntity,
    /// `run` once per compile, always
    WholeContext,
}

/// A compiler pipeline transform
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn stage(&self) -> Stage;

    fn scope(&self) -> PluginScope;

    fn visit(&self, _id: &str, _ctx: &mut PipelineContext<'_>) -> Result<(), CompileError> {
        Ok(())
    }

    fn run(&self, _ctx: &mut PipelineContext<'_>) -> Result<(), CompileError> {
        Ok(())
    }
}

/// Ordered plugin collection. Cloning gives an independent instance that can be
/// overridden without affecting the original.
#[derive(Clone, Default)]
pub struct PipelineRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PipelineRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in plugin in its canonical order
    pub fn with_defaults() -> Self {
        use plugins::*;

        let mut registry = Self::new();
        registry
            .register(Inherit)
            .register(StateHydration)
            .register(PathResolution)
            .register(IncrementalDiscovery)
            .register(DependencyScan)
            .register(AttributeCache)
            .register(AutoSync)
            .register(ActionTags)
            .register(TreeAssembly)
            .register(RecursionGuard);
        registry
    }

    pub fn register(&mut self, plugin: impl Plugin + 'static) -> &mut Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Swap the plugin registered under `name`, keeping its position.
    pub fn replace(&mut self, name: &str, plugin: impl Plugin + 'static) -> bool {
        match self.plugins.iter().position(|p| p.name() == name) {
            Some(index) => {
                self.plugins[index] = Arc::new(plugin);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.plugins.len();
        self.plugins.retain(|p| p.name() != name);
        self.plugins.len() != before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p.name() == name)
    }

    /// Plugin names in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Plugins of one stage, in registration order
    pub fn for_stage(&self, stage: Stage) -> Vec<Arc<dyn Plugin>> {
        self.plugins
            .iter()
            .filter(|p| p.stage() == stage)
            .cloned()
            .collect()
    }
}

impl fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
