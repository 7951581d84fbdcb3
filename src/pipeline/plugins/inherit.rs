use crate::entity::Entity;
use crate::error::CompileError;
use crate::pipeline::{PipelineContext, Plugin, PluginScope, Stage};
use crate::types::NodeId;

/// Resolves `inherit` chains into merged entities
pub struct Inherit;

const NAME: &str = "inherit";

impl Plugin for Inherit {
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
        let mut chain = Vec::new();
        resolve(id, ctx, &mut chain)?;
        Ok(())
    }
}

fn resolve(
    id: &str,
    ctx: &mut PipelineContext<'_>,
    chain: &mut Vec<NodeId>,
) -> Result<Entity, CompileError> {
    if chain.iter().any(|c| c == id) {
        let mut cycle = chain.clone();
        cycle.push(id.to_string());
        return Err(CompileError::CircularInheritance {
            id: id.to_string(),
            chain: cycle,
        });
    }

    let memoized = ctx.fresh.contains(id) || !ctx.is_dirty(id);
    if memoized {
        if let Some(resolved) = ctx.state.resolved.get(id) {
            return Ok(resolved.clone());
        }
    }

    let Some(entity) = ctx.entities.get(id).cloned() else {
        // Callers only pass ids present in the store.
        return Ok(Entity {
            id: id.to_string(),
            ..Default::default()
        });
    };

    let resolved = match entity.inherit.as_deref() {
        None => entity,
        Some(base_id) if !ctx.entities.contains(base_id) => {
            ctx.warn(NAME, id, format!("Inherited base '{}' does not exist", base_id));
            entity
        }
        Some(base_id) => {
            let base_id = base_id.to_string();
            chain.push(id.to_string());
            let base = resolve(&base_id, ctx, chain)?;
            chain.pop();
            merge_inherited(&base, &entity)
        }
    };

    ctx.state.resolved.insert(id.to_string(), resolved.clone());
    ctx.fresh.insert(id.to_string());
    Ok(resolved)
}

fn union(base: &[String], own: &[String]) -> Vec<String> {
    let mut merged = base.to_vec();
    for item in own {
        if !merged.contains(item) {
            merged.push(item.clone());
        }
    }
    merged
}

/// Merge a resolved base into a declaring entity; the declaring side wins.
///
/// Props and inline CSS merge shallowly, preset and utility class lists are
/// unioned in order, and action tags union their event lists per tag.
pub fn merge_inherited(base: &Entity, own: &Entity) -> Entity {
    let mut props = base.props.clone();
    props.extend(own.props.clone());

    let mut style_css = base.style_css.clone();
    style_css.extend(own.style_css.clone());

    let mut actions = base.actions.clone();
    for (tag, events) in &own.actions {
        let merged = union(actions.get(tag).map(Vec::as_slice).unwrap_or(&[]), events);
        actions.insert(tag.clone(), merged);
    }

    Entity {
        id: own.id.clone(),
        node_type: own.node_type.clone().or_else(|| base.node_type.clone()),
        props,
        style_presets: union(&base.style_presets, &own.style_presets),
        style_tw: union(&base.style_tw, &own.style_tw),
        style_css,
        parent: own.parent.clone(),
        slot: own.slot.clone(),
        inherit: own.inherit.clone(),
        actions,
    }
}
