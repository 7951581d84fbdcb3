//! CLI route: single route table and run context. Dispatches to the library
//! and renders results as JSON or TOML text.

use crate::atoms::{AtomRegistry, AtomStore};
use crate::cli::parse::{Commands, ConfigCommands, OutputFormat};
use crate::config::{ConfigLoader, TesseraConfig};
use crate::entity::EntityStore;
use crate::error::TesseraError;
use crate::node::snapshot_tree;
use crate::pipeline::{flatten, Compiler, DescriptorBuilder};
use crate::runtime::{ImmediateScheduler, Runtime};
use crate::stream::{DecoderOptions, SseTransform, StreamDecoder};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Runtime context for CLI execution: workspace and the loaded configuration.
pub struct RunContext {
    workspace_root: PathBuf,
    config: TesseraConfig,
}

impl RunContext {
    /// Create run context from workspace root and optional config path.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, TesseraError> {
        let config = match config_path {
            Some(path) => ConfigLoader::load_from_file(&path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        Ok(Self::with_config(workspace_root, config))
    }

    pub fn with_config(workspace_root: PathBuf, config: TesseraConfig) -> Self {
        Self {
            workspace_root,
            config,
        }
    }

    pub fn config(&self) -> &TesseraConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, TesseraError> {
        match command {
            Commands::Compile {
                file,
                root,
                descriptors,
                max_depth,
                format,
            } => self.handle_compile(file, root.as_deref(), *descriptors, *max_depth, *format),
            Commands::Stream {
                file,
                chunk_size,
                sse,
                patches,
                no_repair,
                format,
            } => {
                let text = std::fs::read_to_string(file)?;
                let repair = self.config.stream.auto_repair && !no_repair;
                if *patches {
                    Ok(self.handle_stream_patches(&text, *chunk_size, *sse, repair))
                } else {
                    self.handle_stream_tree(&text, *chunk_size, *sse, repair, *format)
                }
            }
            Commands::Flatten { file, format } => self.handle_flatten(file, *format),
            Commands::Config { command } => self.handle_config(command),
        }
    }

    fn handle_compile(
        &self,
        file: &Path,
        root: Option<&str>,
        descriptors: bool,
        max_depth: Option<usize>,
        format: OutputFormat,
    ) -> Result<String, TesseraError> {
        let entities = read_entities(file)?;
        let mut options = self
            .config
            .compiler
            .compile_options()
            .with_atoms(AtomRegistry::new() as Arc<dyn AtomStore>);
        if let Some(root) = root {
            options = options.with_root(root);
        }
        if let Some(max_depth) = max_depth {
            options = options.with_max_depth(max_depth);
        }

        let mut compiler = Compiler::new();
        let roots = compiler.compile(&entities, &options)?;
        info!(
            nodes = compiler.node_count(),
            warnings = compiler.warnings().len(),
            "Compiled {}",
            file.display()
        );

        if descriptors {
            let builder = DescriptorBuilder::new(self.config.compiler.known_types.clone());
            render(&builder.build(&roots), format)
        } else {
            render(&snapshot_tree(&roots), format)
        }
    }

    fn handle_stream_patches(&self, text: &str, chunk_size: usize, sse: bool, repair: bool) -> String {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let mut options = DecoderOptions::new()
            .auto_repair(repair)
            .on_patch(move |patch| sink.lock().push(patch.to_value().to_string()));
        if sse {
            options = options.transform(SseTransform::new());
        }

        let mut decoder = StreamDecoder::new(options);
        for chunk in chunks(text, chunk_size) {
            decoder.write(chunk);
        }
        decoder.end();
        debug!(stats = ?decoder.stats(), "Stream decoded");

        let lines = lines.lock();
        lines.join("\n")
    }

    fn handle_stream_tree(
        &self,
        text: &str,
        chunk_size: usize,
        sse: bool,
        repair: bool,
        format: OutputFormat,
    ) -> Result<String, TesseraError> {
        let runtime = Runtime::with_scheduler(&self.config, Arc::new(ImmediateScheduler));
        let mut options = DecoderOptions::new().auto_repair(repair);
        if sse {
            options = options.transform(SseTransform::new());
        }

        let mut stream = runtime.stream_with(options);
        for chunk in chunks(text, chunk_size) {
            stream.write(chunk);
        }
        stream.end();
        runtime.flush();

        if let Some(err) = runtime.last_error() {
            return Err(TesseraError::Compile(err));
        }
        info!(
            generation = runtime.generation(),
            entities = runtime.entities().len(),
            "Stream compiled"
        );
        render(&runtime.snapshot(), format)
    }

    fn handle_flatten(&self, file: &Path, format: OutputFormat) -> Result<String, TesseraError> {
        let entities = read_entities(file)?;
        let roots = Compiler::new().compile(&entities, &self.config.compiler.compile_options())?;

        let mut flat = Map::new();
        for entity in flatten(&roots).iter() {
            flat.insert(entity.id.clone(), serde_json::to_value(entity)?);
        }
        render(&Value::Object(flat), format)
    }

    fn handle_config(&self, command: &ConfigCommands) -> Result<String, TesseraError> {
        match command {
            ConfigCommands::Show => toml::to_string_pretty(&self.config)
                .map_err(|e| TesseraError::ConfigError(format!("Failed to render config: {}", e))),
            ConfigCommands::Validate => match self.config.validate() {
                Ok(()) => Ok(format!(
                    "Configuration for {} is valid",
                    self.workspace_root.display()
                )),
                Err(errors) => Err(TesseraError::ConfigError(
                    errors
                        .iter()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join("\n"),
                )),
            },
            ConfigCommands::Path => Ok(ConfigLoader::global_config_path()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "No home directory; global config disabled".to_string())),
        }
    }
}

fn read_entities(file: &Path) -> Result<EntityStore, TesseraError> {
    let text = std::fs::read_to_string(file)?;
    let value: Value = serde_json::from_str(&text)?;
    Ok(EntityStore::from_value(value)?)
}

fn render<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> Result<String, TesseraError> {
    let text = match format {
        OutputFormat::Pretty => serde_json::to_string_pretty(value)?,
        OutputFormat::Compact => serde_json::to_string(value)?,
    };
    Ok(text)
}

/// Split `text` into pieces of at most `size` bytes on char boundaries.
fn chunks(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut pieces = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + size).min(text.len());
        while !text.is_char_boundary(end) {
            end += 1;
        }
        pieces.push(&text[start..end]);
        start = end;
    }
    pieces
}
