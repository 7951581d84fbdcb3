//! Reactive Atoms
//!
//! Observable single-value cells and the stores that hold them. A store slot
//! holds either an [`Atom`] or a plain value; writes of plain values into an
//! atom slot mutate the atom in place so that anyone holding the atom keeps a
//! live reference.
//!
//! Callbacks are never invoked while an internal lock is held, so a callback
//! may read from or write to the store that notified it.

pub mod dispatcher;
pub mod registry;

pub use dispatcher::AtomDispatcher;
pub use registry::AtomRegistry;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Listener for a single key or atom
pub type KeyCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Listener for every key of a store: `(key, new value)`
pub type AnyCallback = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Handle returned by `subscribe`; call [`Subscription::unsubscribe`] to detach.
#[must_use = "dropping a Subscription keeps the listener attached; call unsubscribe() to detach"]
pub struct Subscription {
    cancel: Vec<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: vec![Box::new(cancel)],
        }
    }

    pub(crate) fn empty() -> Self {
        Self { cancel: Vec::new() }
    }

    /// Merge two subscriptions into one handle
    pub(crate) fn join(mut self, mut other: Subscription) -> Self {
        self.cancel.append(&mut other.cancel);
        self
    }

    pub fn unsubscribe(self) {
        for cancel in self.cancel {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("handles", &self.cancel.len())
            .finish()
    }
}

/// Ordered listener list with stable ids for removal
pub(crate) struct Listeners<F: ?Sized> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Arc<F>)>>,
}

impl<F: ?Sized> Default for Listeners<F> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<F: ?Sized> Listeners<F> {
    pub(crate) fn add(&self, listener: Arc<F>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: u64) {
        self.entries.lock().retain(|(existing, _)| *existing != id);
    }

    /// Clone the current listener list so it can be called without the lock.
    pub(crate) fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries.lock().iter().map(|(_, l)| l.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

struct AtomState {
    value: Value,
    version: u64,
}

/// Observable single-value cell
pub struct Atom {
    state: RwLock<AtomState>,
    schema: Option<Value>,
    listeners: Arc<Listeners<dyn Fn(&Value) + Send + Sync>>,
}

impl Atom {
    pub fn new(value: Value) -> Arc<Self> {
        Self::with_schema(value, None)
    }

    pub fn with_schema(value: Value, schema: Option<Value>) -> Arc<Self> {
        Arc::new(Atom {
            state: RwLock::new(AtomState { value, version: 0 }),
            schema,
            listeners: Arc::new(Listeners::default()),
        })
    }

    pub fn get(&self) -> Value {
        self.state.read().value.clone()
    }

    pub fn schema(&self) -> Option<&Value> {
        self.schema.as_ref()
    }

    /// Number of writes that changed the value
    pub fn version(&self) -> u64 {
        self.state.read().version
    }

    /// Replace the value and notify subscribers. Writing an equal value is a no-op.
    pub fn set(&self, value: Value) {
        if self.replace(value) {
            self.notify();
        }
    }

    /// Replace the value without notifying; returns whether it changed.
    pub(crate) fn replace(&self, value: Value) -> bool {
        let mut state = self.state.write();
        if state.value == value {
            return false;
        }
        state.value = value;
        state.version += 1;
        true
    }

    pub(crate) fn notify(&self) {
        let value = self.get();
        for listener in self.listeners.snapshot() {
            listener(&value);
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        self.subscribe_arc(Arc::new(callback))
    }

    pub(crate) fn subscribe_arc(&self, callback: KeyCallback) -> Subscription {
        let id = self.listeners.add(callback);
        let listeners = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.remove(id);
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Atom")
            .field("value", &state.value)
            .field("version", &state.version)
            .field("schema", &self.schema)
            .finish()
    }
}

/// Common surface of [`AtomRegistry`] and [`AtomDispatcher`]
pub trait AtomStore: Send + Sync {
    /// Current value for `key`, `None` when undefined everywhere it is looked up
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a plain value (mutates an existing atom in place)
    fn set(&self, key: &str, value: Value);

    /// Apply several writes, notifying only after all of them landed
    fn batch_set(&self, updates: Vec<(String, Value)>);

    fn remove(&self, key: &str) -> Option<Value>;

    fn get_atom(&self, key: &str) -> Option<Arc<Atom>>;

    fn insert_atom(&self, key: &str, atom: Arc<Atom>);

    /// Monotonic change stamp for `key`; 0 when the key was never written
    fn version(&self, key: &str) -> u64;

    fn subscribe(&self, key: &str, callback: KeyCallback) -> Subscription;

    fn subscribe_all(&self, callback: AnyCallback) -> Subscription;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}
