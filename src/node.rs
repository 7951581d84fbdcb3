//! Hydrated node model
//!
//! Nodes live in the compiler's arena as shared handles. Identity is the handle
//! itself: two compiles that leave a node clean hand back the same `NodeRef`,
//! which consumers can compare with [`same_node`].

use crate::entity::Entity;
use crate::types::NodeId;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Shared, identity-bearing handle to a node in the arena
pub type NodeRef = Arc<RwLock<Node>>;

/// Marker written into `props._error` when the depth ceiling truncates a node
pub const RECURSION_DEPTH_EXCEEDED: &str = "RECURSION_DEPTH_EXCEEDED";

/// Prop key used for non-fatal error markers
pub const ERROR_PROP: &str = "_error";

/// Whether two handles point at the same arena node
pub fn same_node(a: &NodeRef, b: &NodeRef) -> bool {
    Arc::ptr_eq(a, b)
}

/// Runtime event handler composed from action tags and auto-sync bindings
#[derive(Clone)]
pub struct EventHandler(Arc<dyn Fn(&Value) + Send + Sync>);

impl EventHandler {
    pub fn new(f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, payload: &Value) {
        (self.0)(payload)
    }

    /// Compose `self` then `next`; the already-bound handler runs first.
    pub fn then(self, next: EventHandler) -> EventHandler {
        EventHandler::new(move |payload| {
            self.call(payload);
            next.call(payload);
        })
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventHandler")
    }
}

/// Children delivered through a named slot prop
#[derive(Debug, Clone)]
pub enum SlotContent {
    Single(NodeRef),
    Many(Vec<NodeRef>),
}

impl SlotContent {
    pub fn nodes(&self) -> Vec<NodeRef> {
        match self {
            SlotContent::Single(node) => vec![node.clone()],
            SlotContent::Many(nodes) => nodes.clone(),
        }
    }

    /// Add another occurrence; a second occurrence promotes to a list.
    pub fn push(self, node: NodeRef) -> SlotContent {
        match self {
            SlotContent::Single(first) => SlotContent::Many(vec![first, node]),
            SlotContent::Many(mut nodes) => {
                nodes.push(node);
                SlotContent::Many(nodes)
            }
        }
    }
}

/// Hydrated, tree-linked runtime form of an entity
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub id: NodeId,
    pub node_type: Option<String>,
    /// Declared props after inheritance, bindings still unresolved
    pub props: Map<String, Value>,
    /// Props with every `{{expr}}` resolved against the atom store
    pub resolved_props: Map<String, Value>,
    pub style_presets: Vec<String>,
    pub style_tw: Vec<String>,
    pub style_css: Map<String, Value>,
    pub actions: BTreeMap<String, Vec<String>>,
    /// Resolved parent id (None for roots and unresolved parents)
    pub parent: Option<NodeId>,
    pub slot: Option<String>,
    /// Canonical dotted id path from the root
    pub full_path: String,
    /// Topology as maintained by incremental discovery, slot children included
    pub child_ids: Vec<NodeId>,
    /// Positional children, materialized by tree assembly
    pub children: Vec<NodeRef>,
    /// Slot children, materialized by tree assembly
    pub slots: BTreeMap<String, SlotContent>,
    pub on_event: BTreeMap<String, EventHandler>,
}

impl Node {
    /// Create a node from a (post-inheritance) entity
    pub fn from_entity(entity: &Entity) -> Self {
        let mut node = Node {
            id: entity.id.clone(),
            ..Default::default()
        };
        node.refresh_from(entity);
        node
    }

    /// Copy declared attributes from an entity; topology and children are untouched.
    pub fn refresh_from(&mut self, entity: &Entity) {
        self.node_type = entity.node_type.clone();
        self.props = entity.props.clone();
        self.style_presets = entity.style_presets.clone();
        self.style_tw = entity.style_tw.clone();
        self.style_css = entity.style_css.clone();
        self.actions = entity.actions.clone();
        self.on_event.clear();
    }

    /// Bind a handler for `event`, chaining after any existing one.
    pub fn bind(&mut self, event: &str, handler: EventHandler) {
        let composed = match self.on_event.remove(event) {
            Some(existing) => existing.then(handler),
            None => handler,
        };
        self.on_event.insert(event.to_string(), composed);
    }

    /// Fire an event on this node; returns whether a handler was bound.
    pub fn emit(&self, event: &str, payload: &Value) -> bool {
        match self.on_event.get(event) {
            Some(handler) => {
                handler.call(payload);
                true
            }
            None => false,
        }
    }

    /// Non-fatal error marker, if one was set
    pub fn error_marker(&self) -> Option<&str> {
        self.props.get(ERROR_PROP).and_then(Value::as_str)
    }

    /// JSON view of the subtree rooted here, used for equality checks and output.
    pub fn snapshot(&self) -> Value {
        let mut object = Map::new();
        object.insert("id".into(), Value::String(self.id.clone()));
        if let Some(node_type) = &self.node_type {
            object.insert("type".into(), Value::String(node_type.clone()));
        }
        object.insert("_fullPath".into(), Value::String(self.full_path.clone()));
        if !self.resolved_props.is_empty() {
            object.insert("props".into(), Value::Object(self.resolved_props.clone()));
        }
        if !self.slots.is_empty() {
            let mut slots = Map::new();
            for (name, content) in &self.slots {
                let value = match content {
                    SlotContent::Single(node) => node.read().snapshot(),
                    SlotContent::Many(nodes) => {
                        Value::Array(nodes.iter().map(|n| n.read().snapshot()).collect())
                    }
                };
                slots.insert(name.clone(), value);
            }
            object.insert("slots".into(), Value::Object(slots));
        }
        if !self.on_event.is_empty() {
            object.insert(
                "onEvent".into(),
                Value::Array(
                    self.on_event
                        .keys()
                        .map(|e| Value::String(e.clone()))
                        .collect(),
                ),
            );
        }
        object.insert(
            "children".into(),
            Value::Array(self.children.iter().map(|c| c.read().snapshot()).collect()),
        );
        Value::Object(object)
    }
}

/// Snapshot a list of roots
pub fn snapshot_tree(roots: &[NodeRef]) -> Value {
    Value::Array(roots.iter().map(|root| root.read().snapshot()).collect())
}
