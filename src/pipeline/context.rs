use super::paths::PathTable;
use crate::actions::ActionRegistry;
use crate::atoms::AtomStore;
use crate::entity::{Entity, EntityStore};
use crate::node::NodeRef;
use crate::types::NodeId;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Default depth ceiling; the root sits at depth 1
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Per-call compile inputs
#[derive(Clone)]
pub struct CompileOptions {
    /// Explicit root; falls back to every parent-less node when absent or unknown
    pub root_id: Option<NodeId>,
    /// Incremental mode when `Some`
    pub dirty_ids: Option<BTreeSet<NodeId>>,
    pub atoms: Option<Arc<dyn AtomStore>>,
    pub actions: Option<Arc<ActionRegistry>>,
    pub max_depth: usize,
    /// Props that get a two-way `change` handler when bound to a single key
    pub sync_props: Vec<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            root_id: None,
            dirty_ids: None,
            atoms: None,
            actions: None,
            max_depth: DEFAULT_MAX_DEPTH,
            sync_props: vec!["value".to_string(), "checked".to_string()],
        }
    }
}

impl CompileOptions {
    pub fn with_root(mut self, root_id: impl Into<NodeId>) -> Self {
        self.root_id = Some(root_id.into());
        self
    }

    pub fn with_dirty<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.dirty_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_atoms(mut self, atoms: Arc<dyn AtomStore>) -> Self {
        self.atoms = Some(atoms);
        self
    }

    pub fn with_actions(mut self, actions: Arc<ActionRegistry>) -> Self {
        self.actions = Some(actions);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileOptions")
            .field("root_id", &self.root_id)
            .field("dirty_ids", &self.dirty_ids)
            .field("atoms", &self.atoms.is_some())
            .field("actions", &self.actions.is_some())
            .field("max_depth", &self.max_depth)
            .field("sync_props", &self.sync_props)
            .finish()
    }
}

/// Recoverable problem reported during a compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileWarning {
    pub plugin: &'static str,
    pub node_id: NodeId,
    pub path: String,
    pub message: String,
}

impl fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}): {}",
            self.plugin, self.node_id, self.path, self.message
        )
    }
}

/// Resolved props cached against the versions of the keys they depend on
#[derive(Debug, Clone)]
pub struct CachedAttributes {
    pub versions: Vec<u64>,
    pub resolved: serde_json::Map<String, serde_json::Value>,
}

/// Bidirectional node <-> binding-key index
#[derive(Debug, Clone, Default)]
pub struct DependencyIndex {
    forward: HashMap<NodeId, Vec<String>>,
    reverse: HashMap<String, BTreeSet<NodeId>>,
}

impl DependencyIndex {
    pub fn update(&mut self, id: &str, keys: Vec<String>) {
        self.remove(id);
        for key in &keys {
            self.reverse
                .entry(key.clone())
                .or_default()
                .insert(id.to_string());
        }
        if !keys.is_empty() {
            self.forward.insert(id.to_string(), keys);
        }
    }

    pub fn remove(&mut self, id: &str) {
        let Some(keys) = self.forward.remove(id) else {
            return;
        };
        for key in keys {
            if let Some(ids) = self.reverse.get_mut(&key) {
                ids.remove(id);
                if ids.is_empty() {
                    self.reverse.remove(&key);
                }
            }
        }
    }

    pub fn keys_of(&self, id: &str) -> &[String] {
        self.forward.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes affected by a change to `key`: exact dependents, dependents on a
    /// sub-path (`user` dirties `user.name`), and dependents on an ancestor
    /// path (`user.name` dirties `user`).
    pub fn dependents_of(&self, key: &str) -> BTreeSet<NodeId> {
        let mut ids = BTreeSet::new();
        for (dep, dependents) in &self.reverse {
            let related = dep == key
                || dep
                    .strip_prefix(key)
                    .is_some_and(|rest| rest.starts_with('.'))
                || key
                    .strip_prefix(dep.as_str())
                    .is_some_and(|rest| rest.starts_with('.'));
            if related {
                ids.extend(dependents.iter().cloned());
            }
        }
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
    }
}

/// State that survives between compile calls
#[derive(Debug, Default)]
pub struct CompilerState {
    /// Node arena; handles are reused for clean ids across incremental compiles
    pub nodes: HashMap<NodeId, NodeRef>,
    /// Post-inheritance entities
    pub resolved: HashMap<NodeId, Entity>,
    pub paths: PathTable,
    pub attributes: HashMap<NodeId, CachedAttributes>,
    pub dependencies: DependencyIndex,
    pub roots: Vec<NodeRef>,
}

impl CompilerState {
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.resolved.clear();
        self.paths.clear();
        self.attributes.clear();
        self.dependencies.clear();
        self.roots.clear();
    }

    /// Drop every trace of a node that no longer exists
    pub fn prune(&mut self, id: &str) {
        self.nodes.remove(id);
        self.resolved.remove(id);
        self.attributes.remove(id);
        self.dependencies.remove(id);
    }
}

/// Working view handed to each plugin during one compile call
pub struct PipelineContext<'a> {
    pub entities: &'a EntityStore,
    pub options: &'a CompileOptions,
    /// Effective dirty set (widened to inheritors); `None` on full compiles
    pub dirty: Option<BTreeSet<NodeId>>,
    pub state: &'a mut CompilerState,
    /// Ids whose inheritance was resolved during this call
    pub fresh: HashSet<NodeId>,
    pub warnings: Vec<CompileWarning>,
    /// Roots produced by tree assembly
    pub roots: Option<Vec<NodeRef>>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        entities: &'a EntityStore,
        options: &'a CompileOptions,
        dirty: Option<BTreeSet<NodeId>>,
        state: &'a mut CompilerState,
    ) -> Self {
        Self {
            entities,
            options,
            dirty,
            state,
            fresh: HashSet::new(),
            warnings: Vec::new(),
            roots: None,
        }
    }

    pub fn is_incremental(&self) -> bool {
        self.dirty.is_some()
    }

    /// Whether `id` has to be (re)processed in this call
    pub fn is_dirty(&self, id: &str) -> bool {
        self.dirty.as_ref().map_or(true, |dirty| dirty.contains(id))
    }

    pub fn node(&self, id: &str) -> Option<NodeRef> {
        self.state.nodes.get(id).cloned()
    }

    /// Post-inheritance entity, falling back to the raw declaration
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.state
            .resolved
            .get(id)
            .or_else(|| self.entities.get(id))
    }

    /// Full path for diagnostics; the bare id when no path is known yet
    pub fn path_of(&self, id: &str) -> String {
        self.state
            .paths
            .path_of(id)
            .map(str::to_string)
            .unwrap_or_else(|| id.to_string())
    }

    /// Record a recoverable problem and log it with its location.
    pub fn warn(&mut self, plugin: &'static str, id: &str, message: impl Into<String>) {
        let warning = CompileWarning {
            plugin,
            node_id: id.to_string(),
            path: self.path_of(id),
            message: message.into(),
        };
        warn!(
            plugin,
            node_id = %warning.node_id,
            path = %warning.path,
            "{}",
            warning.message
        );
        self.warnings.push(warning);
    }
}
