//! Tessera: Staged UI-Node Compiler
//!
//! Compiles flat, id-keyed UI-node declarations into a hydrated tree through
//! an ordered plugin pipeline, keeps that tree reactive to an atom store, and
//! decodes fragmented JSON patch streams with speculative repair.

pub mod actions;
pub mod atoms;
pub mod binding;
pub mod cli;
pub mod config;
pub mod entity;
pub mod error;
pub mod logging;
pub mod node;
pub mod pipeline;
pub mod runtime;
pub mod stream;
pub mod types;

pub use actions::{ActionDefinition, ActionInvocation, ActionRegistry};
pub use atoms::{Atom, AtomDispatcher, AtomRegistry, AtomStore, Subscription};
pub use config::{ConfigLoader, TesseraConfig};
pub use entity::{Entity, EntityStore};
pub use error::{CompileError, PatchError, TesseraError};
pub use node::{same_node, Node, NodeRef};
pub use pipeline::{
    flatten, unflatten, CompileOptions, CompileWarning, Compiler, Descriptor, DescriptorBuilder,
    PipelineRegistry, Plugin, PluginScope, Stage,
};
pub use runtime::{Runtime, Scheduler, SchedulerKind};
pub use stream::{DecoderOptions, StreamDecoder};
pub use types::{NodeId, Patch};
