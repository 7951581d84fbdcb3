//! Atom Registry
//!
//! Hierarchical key -> slot store. Lookups fall through to a parent registry on
//! a local miss, and key subscriptions are mirrored into the parent so ancestor
//! writes reach descendant listeners.

use super::{AnyCallback, Atom, AtomStore, KeyCallback, Listeners, Subscription};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

enum Slot {
    /// Atom plus the link that forwards its changes to registry listeners
    Atom {
        atom: Arc<Atom>,
        link: Subscription,
    },
    Plain(Value),
}

impl Slot {
    fn value(&self) -> Value {
        match self {
            Slot::Atom { atom, .. } => atom.get(),
            Slot::Plain(value) => value.clone(),
        }
    }
}

enum Written {
    Unchanged,
    Plain,
    /// Atom mutated in place; its own listeners (and our link) still need a notify
    Atom(Arc<Atom>),
}

type KeyListeners = Listeners<dyn Fn(&Value) + Send + Sync>;

/// Reactive key-value store with parent delegation
pub struct AtomRegistry {
    me: Weak<AtomRegistry>,
    parent: Option<Arc<AtomRegistry>>,
    slots: RwLock<HashMap<String, Slot>>,
    key_listeners: Mutex<HashMap<String, Arc<KeyListeners>>>,
    all_listeners: Arc<Listeners<dyn Fn(&str, &Value) + Send + Sync>>,
    stamps: Mutex<HashMap<String, u64>>,
    clock: AtomicU64,
}

impl AtomRegistry {
    pub fn new() -> Arc<Self> {
        Self::build(None)
    }

    /// Child registry that delegates misses and subscriptions to `parent`
    pub fn with_parent(parent: Arc<AtomRegistry>) -> Arc<Self> {
        Self::build(Some(parent))
    }

    fn build(parent: Option<Arc<AtomRegistry>>) -> Arc<Self> {
        Arc::new_cyclic(|me| AtomRegistry {
            me: me.clone(),
            parent,
            slots: RwLock::new(HashMap::new()),
            key_listeners: Mutex::new(HashMap::new()),
            all_listeners: Arc::new(Listeners::default()),
            stamps: Mutex::new(HashMap::new()),
            clock: AtomicU64::new(0),
        })
    }

    pub fn parent(&self) -> Option<&Arc<AtomRegistry>> {
        self.parent.as_ref()
    }

    /// Whether the key is defined locally (ignores the parent chain)
    pub fn has_local(&self, key: &str) -> bool {
        self.slots.read().contains_key(key)
    }

    /// Locally defined keys
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.slots.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Write without notifying listeners.
    fn write(&self, key: &str, value: Value) -> Written {
        let existing_atom = match self.slots.read().get(key) {
            Some(Slot::Atom { atom, .. }) => Some(atom.clone()),
            Some(Slot::Plain(current)) if *current == value => return Written::Unchanged,
            _ => None,
        };

        match existing_atom {
            Some(atom) => {
                trace!(key, "Updating atom in place");
                if atom.replace(value) {
                    Written::Atom(atom)
                } else {
                    Written::Unchanged
                }
            }
            None => {
                self.slots
                    .write()
                    .insert(key.to_string(), Slot::Plain(value));
                Written::Plain
            }
        }
    }

    fn stamp(&self, key: &str) {
        let tick = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        self.stamps.lock().insert(key.to_string(), tick);
    }

    /// Notify key listeners and store-wide listeners of a change
    fn notify(&self, key: &str, value: &Value) {
        self.stamp(key);
        let key_listeners = self.key_listeners.lock().get(key).cloned();
        if let Some(listeners) = key_listeners {
            for listener in listeners.snapshot() {
                listener(value);
            }
        }
        for listener in self.all_listeners.snapshot() {
            listener(key, value);
        }
    }

    fn link_atom(&self, key: &str, atom: &Arc<Atom>) -> Subscription {
        let me = self.me.clone();
        let key = key.to_string();
        atom.subscribe(move |value| {
            if let Some(registry) = me.upgrade() {
                registry.notify(&key, value);
            }
        })
    }
}

impl AtomStore for AtomRegistry {
    fn get(&self, key: &str) -> Option<Value> {
        if let Some(slot) = self.slots.read().get(key) {
            return Some(slot.value());
        }
        self.parent.as_ref().and_then(|parent| parent.get(key))
    }

    fn set(&self, key: &str, value: Value) {
        self.batch_set(vec![(key.to_string(), value)]);
    }

    fn batch_set(&self, updates: Vec<(String, Value)>) {
        let mut changed = Vec::new();
        let mut atoms = Vec::new();
        for (key, value) in updates {
            match self.write(&key, value) {
                Written::Unchanged => {}
                Written::Plain => changed.push(key),
                Written::Atom(atom) => atoms.push(atom),
            }
        }
        for atom in atoms {
            atom.notify();
        }
        for key in changed {
            let value = self.get(&key).unwrap_or(Value::Null);
            self.notify(&key, &value);
        }
    }

    fn remove(&self, key: &str) -> Option<Value> {
        let removed = self.slots.write().remove(key);
        removed.map(|slot| {
            let value = slot.value();
            if let Slot::Atom { link, .. } = slot {
                link.unsubscribe();
            }
            self.notify(key, &Value::Null);
            value
        })
    }

    fn get_atom(&self, key: &str) -> Option<Arc<Atom>> {
        match self.slots.read().get(key) {
            Some(Slot::Atom { atom, .. }) => return Some(atom.clone()),
            Some(Slot::Plain(_)) => return None,
            None => {}
        }
        self.parent.as_ref().and_then(|parent| parent.get_atom(key))
    }

    fn insert_atom(&self, key: &str, atom: Arc<Atom>) {
        let link = self.link_atom(key, &atom);
        let value = atom.get();
        let previous = self
            .slots
            .write()
            .insert(key.to_string(), Slot::Atom { atom, link });
        if let Some(Slot::Atom { link, .. }) = previous {
            link.unsubscribe();
        }
        self.notify(key, &value);
    }

    fn version(&self, key: &str) -> u64 {
        if let Some(stamp) = self.stamps.lock().get(key) {
            return *stamp;
        }
        self.parent
            .as_ref()
            .map(|parent| parent.version(key))
            .unwrap_or(0)
    }

    fn subscribe(&self, key: &str, callback: KeyCallback) -> Subscription {
        let listeners = self
            .key_listeners
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone();
        let id = listeners.add(callback.clone());
        let local = Subscription::new(move || listeners.remove(id));

        match &self.parent {
            Some(parent) => local.join(parent.subscribe(key, callback)),
            None => local,
        }
    }

    fn subscribe_all(&self, callback: AnyCallback) -> Subscription {
        let id = self.all_listeners.add(callback);
        let listeners = Arc::downgrade(&self.all_listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.remove(id);
            }
        })
    }
}

impl std::fmt::Debug for AtomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomRegistry")
            .field("keys", &self.keys())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
