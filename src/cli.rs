//! CLI domain: parse and route only.
//! No compile logic lives here; the route table calls into the library.

mod parse;
mod route;

pub use parse::{Cli, Commands, ConfigCommands, OutputFormat};
pub use route::RunContext;
