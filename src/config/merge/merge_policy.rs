//! Merge rules: defaults first, then global file, workspace files, environment.

use crate::pipeline::DEFAULT_MAX_DEPTH;
use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("compiler.max_depth", DEFAULT_MAX_DEPTH as i64)?
        .set_default("stream.auto_repair", true)?
        .set_default("runtime.scheduler", "immediate")
}
