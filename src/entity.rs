//! Entity Store
//!
//! The raw, flat input of the compiler: an insertion-ordered map from id to
//! declaration record. Patches from the stream decoder are merged here before
//! each compile.

use crate::error::PatchError;
use crate::types::{NodeId, Patch};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Flat declaration of one UI node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: NodeId,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub props: Map<String, Value>,

    #[serde(
        default,
        deserialize_with = "string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub style_presets: Vec<String>,

    #[serde(
        default,
        deserialize_with = "string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub style_tw: Vec<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub style_css: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherit: Option<NodeId>,

    /// tag -> event names the tag is bound to
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub actions: BTreeMap<String, Vec<String>>,
}

impl Entity {
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: Some(node_type.into()),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = Some(slot.into());
        self
    }

    pub fn with_inherit(mut self, base: impl Into<NodeId>) -> Self {
        self.inherit = Some(base.into());
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: Value) -> Self {
        self.props.insert(key.into(), value);
        self
    }

    pub fn with_action(mut self, tag: impl Into<String>, events: &[&str]) -> Self {
        self.actions
            .insert(tag.into(), events.iter().map(|e| e.to_string()).collect());
        self
    }
}

/// Accepts either `"a b c"` or `["a", "b", "c"]`
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        One(String),
        Many(Vec<String>),
        Null(()),
    }

    Ok(match StringOrList::deserialize(deserializer)? {
        StringOrList::One(s) => s.split_whitespace().map(str::to_string).collect(),
        StringOrList::Many(list) => list,
        StringOrList::Null(()) => Vec::new(),
    })
}

/// Insertion-ordered id -> Entity map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityStore {
    order: Vec<NodeId>,
    entities: HashMap<NodeId, Entity>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from an id-keyed object or an array of entity records.
    pub fn from_value(value: Value) -> Result<Self, PatchError> {
        let mut store = Self::new();
        match value {
            Value::Object(map) => {
                for (id, record) in map {
                    let mut data = match record {
                        Value::Object(data) => data,
                        _ => return Err(PatchError::NotAnObject(id)),
                    };
                    data.remove("id");
                    store.merge_patch(&Patch::new(id, data))?;
                }
            }
            Value::Array(records) => {
                for record in records {
                    let data = match record {
                        Value::Object(data) => data,
                        _ => return Err(PatchError::MissingId),
                    };
                    let id = data
                        .get("id")
                        .and_then(Value::as_str)
                        .ok_or(PatchError::MissingId)?
                        .to_string();
                    store.merge_patch(&Patch::new(id, data))?;
                }
            }
            _ => return Err(PatchError::NotAnObject(String::new())),
        }
        Ok(store)
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Insert or replace an entity; replacing keeps its original position.
    pub fn insert(&mut self, entity: Entity) -> Option<Entity> {
        let id = entity.id.clone();
        let previous = self.entities.insert(id.clone(), entity);
        if previous.is_none() {
            self.order.push(id);
        }
        previous
    }

    pub fn remove(&mut self, id: &str) -> Option<Entity> {
        let removed = self.entities.remove(id);
        if removed.is_some() {
            self.order.retain(|existing| existing != id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in insertion order
    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.order.iter()
    }

    /// Entities in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    /// Merge a patch into the store, creating the entity if needed.
    ///
    /// Known fields overwrite; `props` merges key by key. Keys that are not
    /// entity fields land in `props`. Returns whether anything changed.
    pub fn merge_patch(&mut self, patch: &Patch) -> Result<bool, PatchError> {
        if patch.id.is_empty() {
            return Err(PatchError::MissingId);
        }

        let mut entity = self
            .entities
            .get(&patch.id)
            .cloned()
            .unwrap_or_else(|| Entity {
                id: patch.id.clone(),
                ..Default::default()
            });

        for (field, value) in &patch.data {
            apply_field(&mut entity, field, value)?;
        }

        let changed = self.get(&patch.id) != Some(&entity);
        if changed {
            self.insert(entity);
        }
        Ok(changed)
    }
}

fn apply_field(entity: &mut Entity, field: &str, value: &Value) -> Result<(), PatchError> {
    let id = entity.id.clone();
    let invalid = |message: &str| PatchError::InvalidField {
        id: id.clone(),
        field: field.to_string(),
        message: message.to_string(),
    };

    match field {
        "id" => {}
        "type" => entity.node_type = optional_string(value).map_err(invalid)?,
        "parent" => entity.parent = optional_string(value).map_err(invalid)?,
        "slot" => entity.slot = optional_string(value).map_err(invalid)?,
        "inherit" => entity.inherit = optional_string(value).map_err(invalid)?,
        "props" => match value {
            Value::Object(props) => {
                for (key, prop) in props {
                    entity.props.insert(key.clone(), prop.clone());
                }
            }
            Value::Null => entity.props.clear(),
            _ => return Err(invalid("expected an object")),
        },
        "style_css" => match value {
            Value::Object(css) => entity.style_css = css.clone(),
            Value::Null => entity.style_css.clear(),
            _ => return Err(invalid("expected an object")),
        },
        "style_presets" | "style_tw" => {
            let list = string_list(value).map_err(invalid)?;
            if field == "style_presets" {
                entity.style_presets = list;
            } else {
                entity.style_tw = list;
            }
        }
        "actions" => match value {
            Value::Object(actions) => {
                let mut parsed = BTreeMap::new();
                for (tag, events) in actions {
                    parsed.insert(tag.clone(), string_list(events).map_err(invalid)?);
                }
                entity.actions = parsed;
            }
            Value::Null => entity.actions.clear(),
            _ => return Err(invalid("expected an object of event lists")),
        },
        other => {
            entity.props.insert(other.to_string(), value.clone());
        }
    }
    Ok(())
}

fn optional_string(value: &Value) -> Result<Option<String>, &'static str> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err("expected a string"),
    }
}

fn string_list(value: &Value) -> Result<Vec<String>, &'static str> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(s.split_whitespace().map(str::to_string).collect()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or("expected a list of strings")
            })
            .collect(),
        _ => Err("expected a string or a list of strings"),
    }
}
