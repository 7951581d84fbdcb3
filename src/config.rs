//! Configuration System
//!
//! Layered configuration for the compiler, the stream decoder, the runtime
//! scheduler and logging. Sources are merged lowest to highest: built-in
//! defaults, the global config file, workspace `config/config.toml`,
//! workspace `config/{TESSERA_ENV}.toml`, then `TESSERA_*` environment
//! variables.

use crate::error::TesseraError;
use crate::logging::LoggingConfig;
use crate::pipeline::{CompileOptions, DEFAULT_MAX_DEPTH};
use crate::runtime::SchedulerKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

mod merge;
mod sources;

pub use sources::environment::PREFIX as ENV_PREFIX;
pub use sources::global_file::global_config_path;
pub use sources::workspace_file::ENV_NAME_VAR;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TesseraConfig {
    #[serde(default)]
    pub compiler: CompilerConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Depth ceiling enforced by the recursion guard
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Explicit root node; parent-less nodes become roots when unset
    #[serde(default)]
    pub root_id: Option<String>,

    #[serde(default = "default_sync_props")]
    pub sync_props: Vec<String>,

    /// Component catalog for descriptors. Empty accepts every type.
    #[serde(default)]
    pub known_types: Vec<String>,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_sync_props() -> Vec<String> {
    CompileOptions::default().sync_props
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            root_id: None,
            sync_props: default_sync_props(),
            known_types: Vec::new(),
        }
    }
}

impl CompilerConfig {
    /// Compile options seeded from this section. Atoms, actions and dirty
    /// ids are attached by the caller.
    pub fn compile_options(&self) -> CompileOptions {
        let mut options = CompileOptions::default().with_max_depth(self.max_depth);
        options.root_id = self.root_id.clone();
        options.sync_props = self.sync_props.clone();
        options
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_depth == 0 {
            return Err("max_depth must be at least 1".to_string());
        }
        if matches!(&self.root_id, Some(id) if id.trim().is_empty()) {
            return Err("root_id cannot be empty".to_string());
        }
        if self.sync_props.iter().any(|prop| prop.trim().is_empty()) {
            return Err("sync_props cannot contain empty names".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Repair the incomplete tail into preview patches while streaming
    #[serde(default = "default_true")]
    pub auto_repair: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            auto_repair: default_true(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub scheduler: SchedulerKind,
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Compiler(String),
    Logging(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Compiler(msg) => write!(f, "Compiler: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl TesseraConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.compiler.validate() {
            errors.push(ValidationError::Compiler(e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Builds a [`TesseraConfig`] from the layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration for a workspace.
    pub fn load(workspace_root: &Path) -> Result<TesseraConfig, TesseraError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = sources::environment::add_to_builder(builder);

        let config: TesseraConfig = builder.build()?.try_deserialize()?;
        Self::checked(config)
    }

    /// Load a single TOML file over the defaults, ignoring every other source.
    pub fn load_from_file(path: &Path) -> Result<TesseraConfig, TesseraError> {
        let config: TesseraConfig = merge::merge_policy::builder_with_defaults()?
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()?;
        Self::checked(config)
    }

    /// Path of the global config file, when a home directory is known
    pub fn global_config_path() -> Option<PathBuf> {
        global_config_path()
    }

    fn checked(config: TesseraConfig) -> Result<TesseraConfig, TesseraError> {
        config.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            TesseraError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        debug!(?config, "Configuration loaded");
        Ok(config)
    }
}
