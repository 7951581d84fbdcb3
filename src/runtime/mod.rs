//! Reactive Runtime
//!
//! Glue between the stream decoder, the entity store, the compiler and the
//! atom store:
//!
//! ```text
//! chunks -> StreamDecoder -> patches -> EntityStore -> Compiler -> tree
//!                                          ^                        |
//!                              atom writes -+--- dependency index <-+
//! ```
//!
//! Patches and atom writes only mark ids dirty; the [`SignalCenter`] coalesces
//! them into incremental compiles on its scheduler.

pub mod scheduler;
pub mod signals;

pub use scheduler::{ImmediateScheduler, ManualScheduler, Scheduler, SchedulerKind, TokioScheduler};
pub use signals::{Dirty, SignalCenter};

use crate::actions::ActionRegistry;
use crate::atoms::{AtomDispatcher, AtomRegistry, AtomStore, Listeners, Subscription};
use crate::config::TesseraConfig;
use crate::entity::{Entity, EntityStore};
use crate::error::{CompileError, PatchError};
use crate::node::{snapshot_tree, NodeRef};
use crate::pipeline::{
    CompileOptions, CompileWarning, Compiler, DependencyIndex, Descriptor, DescriptorBuilder,
};
use crate::stream::{DecoderOptions, StreamDecoder};
use crate::types::{NodeId, Patch};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

type RenderListeners = Listeners<dyn Fn(&[NodeRef]) + Send + Sync>;

pub struct Runtime {
    me: Weak<Runtime>,
    entities: RwLock<EntityStore>,
    compiler: Mutex<Compiler>,
    atoms: Arc<AtomDispatcher>,
    actions: RwLock<Option<Arc<ActionRegistry>>>,
    signals: Arc<SignalCenter>,
    manual: Option<Arc<ManualScheduler>>,
    options: CompileOptions,
    descriptors: DescriptorBuilder,
    auto_repair: bool,
    tree: RwLock<Vec<NodeRef>>,
    dependencies: RwLock<DependencyIndex>,
    warnings: RwLock<Vec<CompileWarning>>,
    last_error: Mutex<Option<CompileError>>,
    render_listeners: Arc<RenderListeners>,
    atom_link: Mutex<Option<Subscription>>,
    generation: AtomicU64,
}

impl Runtime {
    /// Runtime with the scheduler named in `config`.
    ///
    /// `tokio` falls back to immediate flushing outside a tokio runtime.
    pub fn new(config: &TesseraConfig) -> Arc<Self> {
        match config.runtime.scheduler {
            SchedulerKind::Immediate => Self::build(config, Arc::new(ImmediateScheduler), None),
            SchedulerKind::Manual => {
                let manual = ManualScheduler::new();
                Self::build(config, manual.clone(), Some(manual))
            }
            SchedulerKind::Tokio => match TokioScheduler::current() {
                Some(scheduler) => Self::build(config, Arc::new(scheduler), None),
                None => {
                    warn!("No tokio runtime available, flushing immediately");
                    Self::build(config, Arc::new(ImmediateScheduler), None)
                }
            },
        }
    }

    pub fn with_scheduler(config: &TesseraConfig, scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Self::build(config, scheduler, None)
    }

    fn build(
        config: &TesseraConfig,
        scheduler: Arc<dyn Scheduler>,
        manual: Option<Arc<ManualScheduler>>,
    ) -> Arc<Self> {
        let runtime = Arc::new_cyclic(|me| Runtime {
            me: me.clone(),
            entities: RwLock::new(EntityStore::new()),
            compiler: Mutex::new(Compiler::new()),
            atoms: Arc::new(AtomDispatcher::new(AtomRegistry::new())),
            actions: RwLock::new(None),
            signals: SignalCenter::new(scheduler),
            manual,
            options: config.compiler.compile_options(),
            descriptors: DescriptorBuilder::new(config.compiler.known_types.clone()),
            auto_repair: config.stream.auto_repair,
            tree: RwLock::new(Vec::new()),
            dependencies: RwLock::new(DependencyIndex::default()),
            warnings: RwLock::new(Vec::new()),
            last_error: Mutex::new(None),
            render_listeners: Arc::new(Listeners::default()),
            atom_link: Mutex::new(None),
            generation: AtomicU64::new(0),
        });

        let me = runtime.me.clone();
        runtime.signals.set_target(Arc::new(move |dirty| {
            if let Some(runtime) = me.upgrade() {
                runtime.recompile(dirty);
            }
        }));
        runtime.link_atoms();
        runtime
    }

    /// (Re)subscribe to every registry reachable through the dispatcher.
    fn link_atoms(&self) {
        let me = self.me.clone();
        let link = self.atoms.subscribe_all(Arc::new(move |key: &str, _value: &Value| {
            if let Some(runtime) = me.upgrade() {
                runtime.on_atom_change(key);
            }
        }));
        if let Some(previous) = self.atom_link.lock().replace(link) {
            previous.unsubscribe();
        }
    }

    fn on_atom_change(&self, key: &str) {
        let dependents = self.dependencies.read().dependents_of(key);
        if !dependents.is_empty() {
            debug!(key, dependents = dependents.len(), "Atom change dirties nodes");
            self.signals.mark_dirty(dependents);
        }
    }

    fn recompile(&self, dirty: Dirty) {
        let entities = self.entities.read().clone();
        let mut options = self.options.clone();
        options.atoms = Some(self.atoms.clone() as Arc<dyn AtomStore>);
        options.actions = self.actions.read().clone();
        options.dirty_ids = match dirty {
            Dirty::Full => None,
            Dirty::Ids(ids) => Some(ids),
        };

        let outcome = {
            let mut compiler = self.compiler.lock();
            let result = compiler.compile(&entities, &options);
            *self.warnings.write() = compiler.warnings().to_vec();
            result.map(|roots| (roots, compiler.dependencies().clone()))
        };

        match outcome {
            Ok((roots, dependencies)) => {
                *self.dependencies.write() = dependencies;
                *self.tree.write() = roots.clone();
                *self.last_error.lock() = None;
                self.generation.fetch_add(1, Ordering::SeqCst);
                for listener in self.render_listeners.snapshot() {
                    listener(&roots);
                }
            }
            Err(err) => {
                error!(error = %err, "Runtime compile failed; keeping previous tree");
                *self.last_error.lock() = Some(err);
            }
        }
    }

    /// Merge a patch into the entity store and mark its id dirty.
    pub fn feed(&self, patch: &Patch) -> Result<bool, PatchError> {
        let changed = self.entities.write().merge_patch(patch)?;
        if changed {
            self.signals.mark_dirty([patch.id.clone()]);
        }
        Ok(changed)
    }

    /// Feed several patches with a single flush
    pub fn feed_all(&self, patches: &[Patch]) -> Result<usize, PatchError> {
        self.signals.batch(|| {
            let mut changed = 0;
            for patch in patches {
                if self.feed(patch)? {
                    changed += 1;
                }
            }
            Ok(changed)
        })
    }

    pub fn insert(&self, entity: Entity) {
        let id = entity.id.clone();
        let previous = self.entities.write().insert(entity.clone());
        if previous.as_ref() != Some(&entity) {
            self.signals.mark_dirty([id]);
        }
    }

    pub fn remove(&self, id: &str) -> Option<Entity> {
        let removed = self.entities.write().remove(id);
        if removed.is_some() {
            self.signals.mark_dirty([id.to_string()]);
        }
        removed
    }

    /// Replace the whole entity store and schedule a full compile
    pub fn load(&self, entities: EntityStore) {
        *self.entities.write() = entities;
        self.signals.mark_full();
    }

    /// Install action-tag definitions; every node is rebound on the next flush.
    pub fn set_actions(&self, registry: ActionRegistry) {
        *self.actions.write() = Some(Arc::new(registry));
        self.signals.mark_full();
    }

    /// Mount a namespaced atom registry (`ns.key`)
    pub fn mount(&self, namespace: impl Into<String>, registry: Arc<AtomRegistry>) {
        self.atoms.mount(namespace, registry);
        self.link_atoms();
        self.signals.mark_full();
    }

    /// Run `f` with all resulting flushes coalesced into one
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.signals.batch(f)
    }

    /// Flush pending work now, regardless of the scheduler
    pub fn flush(&self) {
        self.signals.flush_now();
    }

    /// Run queued flushes of a manual scheduler; returns how many ran.
    pub fn tick(&self) -> usize {
        self.manual.as_ref().map_or(0, |manual| manual.tick())
    }

    pub fn atoms(&self) -> &Arc<AtomDispatcher> {
        &self.atoms
    }

    pub fn signals(&self) -> &Arc<SignalCenter> {
        &self.signals
    }

    /// Roots of the latest successful compile
    pub fn tree(&self) -> Vec<NodeRef> {
        self.tree.read().clone()
    }

    pub fn snapshot(&self) -> Value {
        snapshot_tree(&self.tree())
    }

    pub fn descriptors(&self) -> Vec<Descriptor> {
        self.descriptors.build(&self.tree())
    }

    pub fn node(&self, id: &str) -> Option<NodeRef> {
        self.compiler.lock().node(id)
    }

    pub fn entities(&self) -> EntityStore {
        self.entities.read().clone()
    }

    pub fn warnings(&self) -> Vec<CompileWarning> {
        self.warnings.read().clone()
    }

    /// Error of the latest compile, cleared by the next successful one
    pub fn last_error(&self) -> Option<CompileError> {
        self.last_error.lock().clone()
    }

    /// Number of successful compiles so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Fire `event` on a compiled node; returns whether a handler was bound.
    ///
    /// The handler runs with no node lock held, so it may write atoms that
    /// recompile the same node.
    pub fn emit(&self, id: &str, event: &str, payload: &Value) -> bool {
        let handler = self
            .node(id)
            .and_then(|node| node.read().on_event.get(event).cloned());
        match handler {
            Some(handler) => {
                handler.call(payload);
                true
            }
            None => false,
        }
    }

    pub fn dependents_of(&self, key: &str) -> Vec<NodeId> {
        self.dependencies.read().dependents_of(key).into_iter().collect()
    }

    /// Called with the new roots after every successful compile
    pub fn on_render(&self, callback: impl Fn(&[NodeRef]) + Send + Sync + 'static) -> Subscription {
        let id = self.render_listeners.add(Arc::new(callback));
        let listeners = Arc::downgrade(&self.render_listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.remove(id);
            }
        })
    }

    /// A stream decoder whose patches feed this runtime
    pub fn stream(&self) -> RuntimeStream {
        self.stream_with(DecoderOptions::new().auto_repair(self.auto_repair))
    }

    /// Like [`Runtime::stream`], keeping the repair flag and transforms of
    /// `options`. Any sink already set on `options` is replaced.
    pub fn stream_with(&self, options: DecoderOptions) -> RuntimeStream {
        let me = self.me.clone();
        let decoder = StreamDecoder::new(options.on_patch(move |patch| {
            if let Some(runtime) = me.upgrade() {
                if let Err(err) = runtime.feed(&patch) {
                    warn!(id = %patch.id, error = %err, "Dropping invalid patch");
                }
            }
        }));
        RuntimeStream {
            signals: self.signals.clone(),
            decoder,
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("entities", &self.entities.read().len())
            .field("generation", &self.generation())
            .field("signals", &self.signals)
            .finish()
    }
}

/// Decoder bound to a runtime; each chunk results in at most one flush.
#[derive(Debug)]
pub struct RuntimeStream {
    signals: Arc<SignalCenter>,
    decoder: StreamDecoder,
}

impl RuntimeStream {
    pub fn write(&mut self, chunk: &str) -> usize {
        let decoder = &mut self.decoder;
        self.signals.batch(|| decoder.write(chunk))
    }

    pub fn end(&mut self) -> Option<Value> {
        let decoder = &mut self.decoder;
        self.signals.batch(|| decoder.end())
    }

    pub fn reset(&mut self) {
        self.decoder.reset();
    }

    pub fn decoder(&self) -> &StreamDecoder {
        &self.decoder
    }
}
