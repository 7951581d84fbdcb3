//! Error types for the Tessera compiler, atom store and runtime.

use crate::pipeline::Stage;
use crate::types::NodeId;
use thiserror::Error;

/// Fatal compile errors. Any of these aborts the `compile()` call.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("Circular inheritance at {id}: {}", chain.join(" -> "))]
    CircularInheritance { id: NodeId, chain: Vec<NodeId> },

    #[error("Circular parent chain at {id}: {}", chain.join(" -> "))]
    CircularParent { id: NodeId, chain: Vec<NodeId> },

    #[error("Cycle detected during tree traversal at {id} (path: {path})")]
    RecursionCycle { id: NodeId, path: String },

    #[error("Missing required dependency for plugin '{plugin}': {dependency}")]
    MissingDependency {
        plugin: &'static str,
        dependency: &'static str,
    },

    #[error("Plugin '{plugin}' failed in {stage:?} at {id} ({path}): {message}")]
    Plugin {
        stage: Stage,
        plugin: &'static str,
        id: NodeId,
        path: String,
        message: String,
    },
}

impl CompileError {
    /// Node id the error originated from, if the error is node-scoped.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            CompileError::CircularInheritance { id, .. }
            | CompileError::CircularParent { id, .. }
            | CompileError::RecursionCycle { id, .. }
            | CompileError::Plugin { id, .. } => Some(id),
            CompileError::MissingDependency { .. } => None,
        }
    }
}

/// Errors raised while merging a patch into the entity store
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Patch has no id")]
    MissingId,

    #[error("Patch for {0} is not a JSON object")]
    NotAnObject(NodeId),

    #[error("Invalid field '{field}' on {id}: {message}")]
    InvalidField {
        id: NodeId,
        field: String,
        message: String,
    },
}

/// Top-level error for runtime, configuration and tooling entry points
#[derive(Debug, Error)]
pub enum TesseraError {
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<config::ConfigError> for TesseraError {
    fn from(err: config::ConfigError) -> Self {
        TesseraError::ConfigError(err.to_string())
    }
}
