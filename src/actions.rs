//! Action Tags
//!
//! Named behaviors that entities attach to events (`"actions": {"submit":
//! ["click"]}`). A definition lists the atoms and props it expects; unmet
//! preconditions are reported as warnings but the handler is still bound.

use crate::atoms::AtomStore;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Everything a tag handler sees when its event fires
pub struct ActionInvocation<'a> {
    pub node_id: &'a str,
    pub tag: &'a str,
    pub event: &'a str,
    pub payload: &'a Value,
    /// Node props as resolved at compile time
    pub props: &'a Map<String, Value>,
    pub atoms: Option<&'a dyn AtomStore>,
}

pub type ActionHandler = Arc<dyn Fn(&ActionInvocation<'_>) + Send + Sync>;

#[derive(Clone)]
pub struct ActionDefinition {
    pub tag: String,
    pub required_atoms: Vec<String>,
    pub required_props: Vec<String>,
    handler: ActionHandler,
}

impl ActionDefinition {
    pub fn new(
        tag: impl Into<String>,
        handler: impl Fn(&ActionInvocation<'_>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            tag: tag.into(),
            required_atoms: Vec::new(),
            required_props: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn requires_atom(mut self, key: impl Into<String>) -> Self {
        self.required_atoms.push(key.into());
        self
    }

    pub fn requires_prop(mut self, key: impl Into<String>) -> Self {
        self.required_props.push(key.into());
        self
    }

    pub fn handler(&self) -> ActionHandler {
        self.handler.clone()
    }
}

impl fmt::Debug for ActionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDefinition")
            .field("tag", &self.tag)
            .field("required_atoms", &self.required_atoms)
            .field("required_props", &self.required_props)
            .finish()
    }
}

/// Tag name -> definition
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    definitions: HashMap<String, ActionDefinition>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, replacing any previous one for the same tag.
    pub fn register(&mut self, definition: ActionDefinition) -> &mut Self {
        self.definitions.insert(definition.tag.clone(), definition);
        self
    }

    pub fn get(&self, tag: &str) -> Option<&ActionDefinition> {
        self.definitions.get(tag)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
