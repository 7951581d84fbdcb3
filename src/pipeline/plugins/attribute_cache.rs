use crate::atoms::AtomStore;
use crate::binding::resolve_map;
use crate::error::CompileError;
use crate::pipeline::context::CachedAttributes;
use crate::pipeline::{PipelineContext, Plugin, PluginScope, Stage};
use tracing::trace;

/// Resolves prop bindings into `resolved_props`, memoized per node against the
/// versions of the keys it depends on.
pub struct AttributeCache;

/// Version of the atom a binding expression reads from
fn key_version(store: &dyn AtomStore, key: &str) -> u64 {
    if store.contains(key) {
        return store.version(key);
    }
    match key.split_once('.') {
        Some((head, _)) => store.version(head),
        None => 0,
    }
}

impl Plugin for AttributeCache {
    fn name(&self) -> &'static str {
        "attribute_cache"
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
        let props = node.read().props.clone();

        let Some(store) = ctx.options.atoms.clone() else {
            node.write().resolved_props = props;
            return Ok(());
        };

        let versions: Vec<u64> = ctx
            .state
            .dependencies
            .keys_of(id)
            .iter()
            .map(|key| key_version(store.as_ref(), key))
            .collect();

        let resolved = match ctx.state.attributes.get(id) {
            Some(cached) if cached.versions == versions => {
                trace!(id, "Attribute cache hit");
                cached.resolved.clone()
            }
            _ => {
                let resolved = resolve_map(&props, store.as_ref());
                ctx.state.attributes.insert(
                    id.to_string(),
                    CachedAttributes {
                        versions,
                        resolved: resolved.clone(),
                    },
                );
                resolved
            }
        };
        node.write().resolved_props = resolved;
        Ok(())
    }
}
