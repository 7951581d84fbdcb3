//! Render descriptors: a renderer-neutral, serializable view of a compiled tree.

use crate::node::NodeRef;
use crate::types::NodeId;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Component type used when a node's type is missing or unknown
pub const PASSTHROUGH_TYPE: &str = "Fragment";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Styles {
    pub presets: Vec<String>,
    pub tw: Vec<String>,
    pub css: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Descriptor {
    pub id: NodeId,
    pub component_type: String,
    pub props: Map<String, Value>,
    pub styles: Styles,
    pub children: Vec<NodeId>,
    pub slots: BTreeMap<String, Vec<NodeId>>,
    pub parent_id: Option<NodeId>,
    pub events: Vec<String>,
}

/// Builds descriptors, mapping node types onto a known component catalog
#[derive(Debug, Clone, Default)]
pub struct DescriptorBuilder {
    known_types: BTreeSet<String>,
}

impl DescriptorBuilder {
    /// An empty catalog accepts every declared type
    pub fn new<I, S>(known_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_types: known_types.into_iter().map(Into::into).collect(),
        }
    }

    fn component_type(&self, id: &str, declared: Option<&str>) -> String {
        match declared {
            Some(ty) if self.known_types.is_empty() || self.known_types.contains(ty) => {
                ty.to_string()
            }
            Some(ty) => {
                warn!(node_id = id, component_type = ty, "Unknown component type, rendering as {}", PASSTHROUGH_TYPE);
                PASSTHROUGH_TYPE.to_string()
            }
            None => PASSTHROUGH_TYPE.to_string(),
        }
    }

    /// Descriptors for every reachable node, in pre-order
    pub fn build(&self, roots: &[NodeRef]) -> Vec<Descriptor> {
        let mut out = Vec::new();
        for root in roots {
            self.walk(root, None, &mut out);
        }
        out
    }

    fn walk(&self, node: &NodeRef, parent_id: Option<&str>, out: &mut Vec<Descriptor>) {
        let node = node.read();
        out.push(Descriptor {
            id: node.id.clone(),
            component_type: self.component_type(&node.id, node.node_type.as_deref()),
            props: node.resolved_props.clone(),
            styles: Styles {
                presets: node.style_presets.clone(),
                tw: node.style_tw.clone(),
                css: node.style_css.clone(),
            },
            children: node.children.iter().map(|c| c.read().id.clone()).collect(),
            slots: node
                .slots
                .iter()
                .map(|(name, content)| {
                    let ids = content.nodes().iter().map(|c| c.read().id.clone()).collect();
                    (name.clone(), ids)
                })
                .collect(),
            parent_id: parent_id.map(str::to_string),
            events: node.on_event.keys().cloned().collect(),
        });

        for child in &node.children {
            self.walk(child, Some(node.id.as_str()), out);
        }
        for content in node.slots.values() {
            for child in content.nodes() {
                self.walk(&child, Some(node.id.as_str()), out);
            }
        }
    }
}
