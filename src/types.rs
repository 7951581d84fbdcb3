//! Shared primitive types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Node identifier as declared by the entity producer
pub type NodeId = String;

/// A single id-keyed update emitted by the stream decoder (or built by hand).
///
/// Repeated patches for the same id are overwrites, never appends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub id: NodeId,
    pub data: Map<String, Value>,
    /// `false` for speculative previews produced from a repaired tail
    pub is_final: bool,
}

impl Patch {
    pub fn new(id: impl Into<NodeId>, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            data,
            is_final: true,
        }
    }

    pub fn preview(id: impl Into<NodeId>, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            data,
            is_final: false,
        }
    }

    /// Patch payload as a JSON object, including the id field
    pub fn to_value(&self) -> Value {
        let mut object = self.data.clone();
        object
            .entry("id".to_string())
            .or_insert_with(|| Value::String(self.id.clone()));
        Value::Object(object)
    }
}
