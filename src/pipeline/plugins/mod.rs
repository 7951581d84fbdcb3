//! Built-in pipeline plugins

mod action_tags;
mod attribute_cache;
mod auto_sync;
mod dependency_scan;
mod incremental_discovery;
mod inherit;
mod path_resolution;
mod recursion_guard;
mod state_hydration;
mod tree_assembly;

pub use action_tags::ActionTags;
pub use attribute_cache::AttributeCache;
pub use auto_sync::AutoSync;
pub use dependency_scan::DependencyScan;
pub use incremental_discovery::IncrementalDiscovery;
pub use inherit::{merge_inherited, Inherit};
pub use path_resolution::PathResolution;
pub use recursion_guard::RecursionGuard;
pub use state_hydration::StateHydration;
pub use tree_assembly::TreeAssembly;
