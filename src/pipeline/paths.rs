//! Parent addressing and full-path bookkeeping.
//!
//! A parent reference may be a literal id, a dotted path whose last segment is
//! the id, or the legacy slot form `[slot]a.b.parent.slotName`.

use crate::entity::EntityStore;
use crate::error::CompileError;
use crate::types::NodeId;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Prefix of the legacy slot-encoded parent reference
pub const SLOT_PREFIX: &str = "[slot]";

/// Encode a slot child's parent reference the way decompile emits it
pub fn encode_slot_parent(parent_id: &str, slot: &str) -> String {
    format!("{}{}.{}", SLOT_PREFIX, parent_id, slot)
}

/// Parsed, not yet resolved, parent reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentAddress {
    pub target: String,
    pub slot: Option<String>,
    /// Target is an id and must not be interpreted as a path
    pub literal: bool,
}

impl ParentAddress {
    /// Parse a raw `parent` value together with the entity's `slot` attribute.
    ///
    /// In the legacy form the parent id is the second-to-last segment and the
    /// slot name the last; an explicit `slot` attribute still names the slot.
    pub fn parse(raw: &str, slot_attr: Option<&str>) -> Self {
        if let Some(encoded) = raw.strip_prefix(SLOT_PREFIX) {
            let segments: Vec<&str> = encoded.split('.').collect();
            let (target, legacy_slot) = match segments.as_slice() {
                [.., parent, slot] => (parent.to_string(), Some(slot.to_string())),
                _ => (encoded.to_string(), None),
            };
            return Self {
                target,
                slot: slot_attr.map(str::to_string).or(legacy_slot),
                literal: true,
            };
        }

        Self {
            target: raw.to_string(),
            slot: slot_attr.map(str::to_string),
            literal: slot_attr.is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParent {
    pub id: NodeId,
    pub slot: Option<String>,
}

/// id -> full path, the reverse index, and resolved parents
#[derive(Debug, Clone, Default)]
pub struct PathTable {
    by_id: HashMap<NodeId, String>,
    by_path: HashMap<String, NodeId>,
    parents: HashMap<NodeId, ResolvedParent>,
}

impl PathTable {
    pub fn path_of(&self, id: &str) -> Option<&str> {
        self.by_id.get(id).map(String::as_str)
    }

    /// Dereference a full dotted path to the id it names
    pub fn id_for_path(&self, path: &str) -> Option<&str> {
        self.by_path.get(path).map(String::as_str)
    }

    pub fn parent_of(&self, id: &str) -> Option<&ResolvedParent> {
        self.parents.get(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_path.clear();
        self.parents.clear();
    }

    fn resolve(&self, address: &ParentAddress, entities: &EntityStore) -> Option<NodeId> {
        let target = address.target.as_str();
        if entities.contains(target) {
            return Some(target.to_string());
        }
        if address.literal {
            return None;
        }
        if let Some(id) = self.by_path.get(target).filter(|id| entities.contains(id)) {
            return Some(id.clone());
        }
        target
            .rsplit_once('.')
            .map(|(_, last)| last)
            .filter(|last| entities.contains(last))
            .map(str::to_string)
    }

    /// Recompute parents and full paths for every entity.
    ///
    /// Unresolvable parents make a node a root. Self-parenting and parent
    /// cycles are fatal.
    pub fn rebuild(&mut self, entities: &EntityStore) -> Result<(), CompileError> {
        let mut parents = HashMap::new();
        for entity in entities.iter() {
            let Some(raw) = entity.parent.as_deref() else {
                continue;
            };
            let address = ParentAddress::parse(raw, entity.slot.as_deref());
            match self.resolve(&address, entities) {
                Some(parent) if parent == entity.id => {
                    return Err(CompileError::CircularParent {
                        id: entity.id.clone(),
                        chain: vec![entity.id.clone(), entity.id.clone()],
                    });
                }
                Some(parent) => {
                    parents.insert(
                        entity.id.clone(),
                        ResolvedParent {
                            id: parent,
                            slot: address.slot,
                        },
                    );
                }
                None => debug!(id = %entity.id, parent = raw, "Unresolved parent, treating as root"),
            }
        }

        let mut by_id: HashMap<NodeId, String> = HashMap::with_capacity(entities.len());
        for id in entities.ids() {
            if by_id.contains_key(id) {
                continue;
            }

            // Walk up until a root or an already-known path, then assign downwards.
            let mut chain: Vec<NodeId> = Vec::new();
            let mut seen: HashSet<NodeId> = HashSet::new();
            let mut cursor = id.clone();
            loop {
                if by_id.contains_key(&cursor) {
                    break;
                }
                if !seen.insert(cursor.clone()) {
                    let start = chain.iter().position(|c| *c == cursor).unwrap_or(0);
                    let mut cycle = chain[start..].to_vec();
                    cycle.push(cursor.clone());
                    return Err(CompileError::CircularParent { id: cursor, chain: cycle });
                }
                chain.push(cursor.clone());
                match parents.get(&cursor) {
                    Some(parent) => cursor = parent.id.clone(),
                    None => break,
                }
            }

            for node in chain.iter().rev() {
                let path = match parents.get(node).and_then(|p| by_id.get(&p.id)) {
                    Some(base) => format!("{}.{}", base, node),
                    None => node.clone(),
                };
                by_id.insert(node.clone(), path);
            }
        }

        self.by_path = by_id
            .iter()
            .map(|(id, path)| (path.clone(), id.clone()))
            .collect();
        self.by_id = by_id;
        self.parents = parents;
        Ok(())
    }
}
