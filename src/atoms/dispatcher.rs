//! Atom Dispatcher
//!
//! Routes keys across several registries. Resolution order for reads:
//!
//! 1. namespace prefix (`ns.key` or the legacy `ns://key`) when `ns` is mounted
//! 2. the default (local) registry
//! 3. ambient registries in registration order
//!
//! The first value that is defined wins. Writes go to the mounted namespace on
//! a prefix match and to the default registry otherwise.

use super::{AnyCallback, Atom, AtomRegistry, AtomStore, KeyCallback, Subscription};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub struct AtomDispatcher {
    default: Arc<AtomRegistry>,
    namespaces: RwLock<Vec<(String, Arc<AtomRegistry>)>>,
    ambients: RwLock<Vec<Arc<AtomRegistry>>>,
}

impl AtomDispatcher {
    pub fn new(default: Arc<AtomRegistry>) -> Self {
        Self {
            default,
            namespaces: RwLock::new(Vec::new()),
            ambients: RwLock::new(Vec::new()),
        }
    }

    pub fn default_registry(&self) -> &Arc<AtomRegistry> {
        &self.default
    }

    /// Mount `registry` under `namespace`, replacing any previous mount.
    pub fn mount(&self, namespace: impl Into<String>, registry: Arc<AtomRegistry>) {
        let namespace = namespace.into();
        debug!(namespace = %namespace, "Mounting atom namespace");
        let mut namespaces = self.namespaces.write();
        match namespaces.iter_mut().find(|(ns, _)| *ns == namespace) {
            Some(entry) => entry.1 = registry,
            None => namespaces.push((namespace, registry)),
        }
    }

    pub fn unmount(&self, namespace: &str) -> Option<Arc<AtomRegistry>> {
        let mut namespaces = self.namespaces.write();
        let index = namespaces.iter().position(|(ns, _)| ns == namespace)?;
        Some(namespaces.remove(index).1)
    }

    /// Append an ambient fallback registry
    pub fn use_ambient(&self, registry: Arc<AtomRegistry>) {
        self.ambients.write().push(registry);
    }

    fn namespace(&self, namespace: &str) -> Option<Arc<AtomRegistry>> {
        self.namespaces
            .read()
            .iter()
            .find(|(ns, _)| ns == namespace)
            .map(|(_, registry)| registry.clone())
    }

    /// Split a key into a mounted namespace registry and the key inside it.
    fn route<'k>(&self, key: &'k str) -> Option<(Arc<AtomRegistry>, &'k str)> {
        let (namespace, rest) = key
            .split_once("://")
            .or_else(|| key.split_once('.'))?;
        self.namespace(namespace).map(|registry| (registry, rest))
    }

    /// Registries consulted for `key`, in resolution order
    fn chain(&self, key: &str) -> Vec<(Arc<AtomRegistry>, String)> {
        let mut chain = Vec::new();
        if let Some((registry, rest)) = self.route(key) {
            chain.push((registry, rest.to_string()));
        }
        chain.push((self.default.clone(), key.to_string()));
        for ambient in self.ambients.read().iter() {
            chain.push((ambient.clone(), key.to_string()));
        }
        chain
    }

    fn write_target(&self, key: &str) -> (Arc<AtomRegistry>, String) {
        match self.route(key) {
            Some((registry, rest)) => (registry, rest.to_string()),
            None => (self.default.clone(), key.to_string()),
        }
    }
}

impl AtomStore for AtomDispatcher {
    fn get(&self, key: &str) -> Option<Value> {
        self.chain(key)
            .into_iter()
            .find_map(|(registry, key)| registry.get(&key))
    }

    fn set(&self, key: &str, value: Value) {
        let (registry, key) = self.write_target(key);
        registry.set(&key, value);
    }

    fn batch_set(&self, updates: Vec<(String, Value)>) {
        let mut grouped: Vec<(Arc<AtomRegistry>, Vec<(String, Value)>)> = Vec::new();
        for (key, value) in updates {
            let (registry, key) = self.write_target(&key);
            match grouped.iter_mut().find(|(r, _)| Arc::ptr_eq(r, &registry)) {
                Some((_, batch)) => batch.push((key, value)),
                None => grouped.push((registry, vec![(key, value)])),
            }
        }
        for (registry, batch) in grouped {
            registry.batch_set(batch);
        }
    }

    fn remove(&self, key: &str) -> Option<Value> {
        let (registry, key) = self.write_target(key);
        registry.remove(&key)
    }

    fn get_atom(&self, key: &str) -> Option<Arc<Atom>> {
        self.chain(key)
            .into_iter()
            .find_map(|(registry, key)| registry.get_atom(&key))
    }

    fn insert_atom(&self, key: &str, atom: Arc<Atom>) {
        let (registry, key) = self.write_target(key);
        registry.insert_atom(&key, atom);
    }

    fn version(&self, key: &str) -> u64 {
        self.chain(key)
            .into_iter()
            .find(|(registry, key)| registry.contains(key))
            .map(|(registry, key)| registry.version(&key))
            .unwrap_or(0)
    }

    fn subscribe(&self, key: &str, callback: KeyCallback) -> Subscription {
        self.chain(key)
            .into_iter()
            .fold(Subscription::empty(), |subscription, (registry, key)| {
                subscription.join(registry.subscribe(&key, callback.clone()))
            })
    }

    /// Keys from mounted namespaces are reported with their `ns.` prefix.
    fn subscribe_all(&self, callback: AnyCallback) -> Subscription {
        let mut subscription = self.default.subscribe_all(callback.clone());
        for (namespace, registry) in self.namespaces.read().iter() {
            let prefix = format!("{}.", namespace);
            let forward = callback.clone();
            subscription = subscription.join(registry.subscribe_all(Arc::new(
                move |key: &str, value: &Value| forward(&format!("{}{}", prefix, key), value),
            )));
        }
        for ambient in self.ambients.read().iter() {
            subscription = subscription.join(ambient.subscribe_all(callback.clone()));
        }
        subscription
    }
}

impl std::fmt::Debug for AtomDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let namespaces: Vec<String> = self
            .namespaces
            .read()
            .iter()
            .map(|(ns, _)| ns.clone())
            .collect();
        f.debug_struct("AtomDispatcher")
            .field("namespaces", &namespaces)
            .field("ambients", &self.ambients.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn dispatcher() -> (AtomDispatcher, Arc<AtomRegistry>) {
        let local = AtomRegistry::new();
        (AtomDispatcher::new(local.clone()), local)
    }

    #[test]
    fn test_resolution_order_namespace_local_ambient() {
        let (dispatcher, local) = dispatcher();
        let user = AtomRegistry::new();
        let ambient_a = AtomRegistry::new();
        let ambient_b = AtomRegistry::new();
        dispatcher.mount("user", user.clone());
        dispatcher.use_ambient(ambient_a.clone());
        dispatcher.use_ambient(ambient_b.clone());

        user.set("name", json!("from-namespace"));
        local.set("user.name", json!("from-local"));
        assert_eq!(dispatcher.get("user.name"), Some(json!("from-namespace")));
        assert_eq!(dispatcher.get("user://name"), Some(json!("from-namespace")));

        local.set("theme", json!("local"));
        ambient_a.set("theme", json!("ambient-a"));
        assert_eq!(dispatcher.get("theme"), Some(json!("local")));

        ambient_a.set("locale", json!("en"));
        ambient_b.set("locale", json!("fr"));
        assert_eq!(dispatcher.get("locale"), Some(json!("en")));

        ambient_b.set("only_b", json!(true));
        assert_eq!(dispatcher.get("only_b"), Some(json!(true)));
        assert_eq!(dispatcher.get("missing"), None);
    }

    #[test]
    fn test_namespace_miss_falls_through_to_local() {
        let (dispatcher, local) = dispatcher();
        dispatcher.mount("cart", AtomRegistry::new());
        local.set("cart.total", json!(3));
        assert_eq!(dispatcher.get("cart.total"), Some(json!(3)));
    }

    #[test]
    fn test_set_routes_to_namespace() {
        let (dispatcher, local) = dispatcher();
        let user = AtomRegistry::new();
        dispatcher.mount("user", user.clone());

        dispatcher.set("user.name", json!("Ada"));
        dispatcher.set("count", json!(1));

        assert_eq!(user.get("name"), Some(json!("Ada")));
        assert!(!local.has_local("user.name"));
        assert_eq!(local.get("count"), Some(json!(1)));
    }

    #[test]
    fn test_subscribe_all_prefixes_namespace_keys() {
        let (dispatcher, _local) = dispatcher();
        let user = AtomRegistry::new();
        dispatcher.mount("user", user.clone());

        let keys = Arc::new(Mutex::new(Vec::new()));
        let sink = keys.clone();
        let _sub = dispatcher.subscribe_all(Arc::new(move |key: &str, _v: &Value| {
            sink.lock().push(key.to_string())
        }));

        dispatcher.set("user.name", json!("Ada"));
        dispatcher.set("count", json!(1));

        assert_eq!(*keys.lock(), vec!["user.name".to_string(), "count".to_string()]);
    }
}
