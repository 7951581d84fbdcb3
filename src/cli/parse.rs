//! CLI parse: clap types for Tessera. No behavior; definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Tessera CLI - compile flat UI-node declarations into trees
#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(about = "Compile flat UI-node declarations and decode streamed patches", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile an entity file (id-keyed object or array) and print the tree
    Compile {
        /// Entity JSON file
        file: PathBuf,

        /// Root node id (defaults to every parent-less node)
        #[arg(long)]
        root: Option<String>,

        /// Print render descriptors instead of the node tree
        #[arg(long)]
        descriptors: bool,

        /// Depth ceiling for the recursion guard
        #[arg(long)]
        max_depth: Option<usize>,

        #[arg(long, value_enum, default_value = "pretty")]
        format: OutputFormat,
    },
    /// Decode a streamed patch file chunk by chunk and print the compiled result
    Stream {
        /// File holding the raw stream text
        file: PathBuf,

        /// Bytes per chunk fed to the decoder
        #[arg(long, default_value = "64")]
        chunk_size: usize,

        /// Input is framed as server-sent events
        #[arg(long)]
        sse: bool,

        /// Print every dispatched patch as a JSON line instead of the tree
        #[arg(long)]
        patches: bool,

        /// Disable preview repair of the incomplete tail
        #[arg(long)]
        no_repair: bool,

        #[arg(long, value_enum, default_value = "pretty")]
        format: OutputFormat,
    },
    /// Compile an entity file and print it flattened back into entities
    Flatten {
        /// Entity JSON file
        file: PathBuf,

        #[arg(long, value_enum, default_value = "pretty")]
        format: OutputFormat,
    },
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Validate the effective configuration
    Validate,
    /// Print the global configuration file path
    Path,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Pretty,
    Compact,
}
