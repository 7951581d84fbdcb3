use super::context::{CompileOptions, CompileWarning, CompilerState, DependencyIndex, PipelineContext};
use super::{PipelineRegistry, PluginScope, Stage};
use crate::entity::EntityStore;
use crate::error::CompileError;
use crate::node::NodeRef;
use crate::types::NodeId;
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;
use tracing::{debug, error, info, instrument};

/// Staged compiler with persistent incremental state
#[derive(Debug)]
pub struct Compiler {
    registry: PipelineRegistry,
    state: CompilerState,
    warnings: Vec<CompileWarning>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_registry(PipelineRegistry::with_defaults())
    }

    pub fn with_registry(registry: PipelineRegistry) -> Self {
        Self {
            registry,
            state: CompilerState::default(),
            warnings: Vec::new(),
        }
    }

    pub fn registry(&self) -> &PipelineRegistry {
        &self.registry
    }

    /// Mutable access to the plugin set; changes apply from the next compile.
    pub fn registry_mut(&mut self) -> &mut PipelineRegistry {
        &mut self.registry
    }

    /// Compile `entities` into a list of root nodes.
    ///
    /// With `options.dirty_ids` set and a populated arena, only dirty ids (and
    /// entities inheriting from them) are reprocessed and every clean node keeps
    /// its handle. Any fatal error resets the incremental state, so the next
    /// call is a full compile.
    #[instrument(skip_all, fields(entities = entities.len()))]
    pub fn compile(
        &mut self,
        entities: &EntityStore,
        options: &CompileOptions,
    ) -> Result<Vec<NodeRef>, CompileError> {
        let started = Instant::now();
        let dirty = match &options.dirty_ids {
            Some(ids) if !self.state.nodes.is_empty() => Some(widen_to_inheritors(entities, ids)),
            _ => {
                self.state.clear();
                None
            }
        };
        let incremental = dirty.is_some();
        let dirty_count = dirty.as_ref().map(BTreeSet::len);

        let (outcome, roots) = {
            let mut ctx = PipelineContext::new(entities, options, dirty, &mut self.state);
            let outcome = run_stages(&self.registry, &mut ctx);
            self.warnings = std::mem::take(&mut ctx.warnings);
            (outcome, ctx.roots.take())
        };

        match outcome {
            Ok(()) => {
                let roots = roots.unwrap_or_default();
                self.state.roots = roots.clone();
                info!(
                    incremental,
                    dirty = ?dirty_count,
                    roots = roots.len(),
                    warnings = self.warnings.len(),
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "Compile finished"
                );
                Ok(roots)
            }
            Err(err) => {
                error!(error = %err, node_id = ?err.node_id(), "Compile failed");
                self.state.clear();
                Err(err)
            }
        }
    }

    /// Warnings from the most recent compile
    pub fn warnings(&self) -> &[CompileWarning] {
        &self.warnings
    }

    /// Roots from the most recent successful compile
    pub fn roots(&self) -> &[NodeRef] {
        &self.state.roots
    }

    pub fn node(&self, id: &str) -> Option<NodeRef> {
        self.state.nodes.get(id).cloned()
    }

    pub fn node_count(&self) -> usize {
        self.state.nodes.len()
    }

    pub fn path_of(&self, id: &str) -> Option<&str> {
        self.state.paths.path_of(id)
    }

    /// Dereference a full dotted path
    pub fn resolve_path(&self, path: &str) -> Option<&str> {
        self.state.paths.id_for_path(path)
    }

    pub fn dependencies(&self) -> &DependencyIndex {
        &self.state.dependencies
    }

    /// Nodes to recompile after `key` changed
    pub fn dependents_of(&self, key: &str) -> BTreeSet<NodeId> {
        self.state.dependencies.dependents_of(key)
    }

    /// Forget all incremental state
    pub fn reset(&mut self) {
        self.state.clear();
        self.warnings.clear();
    }
}

fn run_stages(registry: &PipelineRegistry, ctx: &mut PipelineContext<'_>) -> Result<(), CompileError> {
    for stage in Stage::ORDER {
        let stage_started = Instant::now();
        for plugin in registry.for_stage(stage) {
            match plugin.scope() {
                PluginScope::WholeContext => plugin.run(ctx)?,
                PluginScope::PerEntity => {
                    let ids: Vec<NodeId> = ctx
                        .entities
                        .ids()
                        .filter(|id| ctx.is_dirty(id))
                        .cloned()
                        .collect();
                    for id in &ids {
                        plugin.visit(id, ctx)?;
                    }
                }
            }
            debug!(stage = ?stage, plugin = plugin.name(), "Plugin finished");
        }
        debug!(
            stage = ?stage,
            elapsed_us = stage_started.elapsed().as_micros() as u64,
            "Stage finished"
        );
    }
    Ok(())
}

/// Dirty ids plus every entity whose inheritance chain reaches one of them
fn widen_to_inheritors(entities: &EntityStore, dirty: &BTreeSet<NodeId>) -> BTreeSet<NodeId> {
    let mut inheritors: HashMap<&str, Vec<&str>> = HashMap::new();
    for entity in entities.iter() {
        if let Some(base) = entity.inherit.as_deref() {
            inheritors.entry(base).or_default().push(entity.id.as_str());
        }
    }

    let mut widened = dirty.clone();
    let mut queue: Vec<&str> = dirty.iter().map(String::as_str).collect();
    while let Some(id) = queue.pop() {
        for child in inheritors.get(id).into_iter().flatten() {
            if widened.insert(child.to_string()) {
                queue.push(child);
            }
        }
    }
    widened
}
