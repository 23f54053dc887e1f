use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::logging::LogLevel;
use crate::output::OutputFormat;

pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a child and a parent agent over the in-memory host and print
    /// what the parent observed.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, log_level: LogLevel) -> CliResult<i32> {
    match command {
        Command::Simulate(args) => simulate::run(args, format, log_level),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Content heights (comma-separated). The first is the height when the
    /// child starts; each later one is applied as a layout mutation.
    #[arg(long, value_delimiter = ',', default_value = "0")]
    pub heights: Vec<f64>,
    /// Content width.
    #[arg(long, default_value_t = 0.0)]
    pub width: f64,
    /// Scroll positions as LEFT:TOP (comma-separated), applied after the heights.
    #[arg(long, value_delimiter = ',')]
    pub scrolls: Vec<String>,
    /// Custom child-to-parent message as TYPE=JSON. Repeatable.
    #[arg(long = "message", value_name = "TYPE=JSON")]
    pub messages: Vec<String>,
    /// Origin the child posts to and accepts messages from.
    #[arg(long, value_name = "ORIGIN")]
    pub target_origin: Option<String>,
    /// Origin of the embedding document.
    #[arg(long, value_name = "ORIGIN", default_value = framesync::simulate::DEFAULT_PARENT_ORIGIN)]
    pub parent_origin: String,
    /// Origin of the embedded document.
    #[arg(long, value_name = "ORIGIN", default_value = framesync::simulate::DEFAULT_CHILD_ORIGIN)]
    pub child_origin: String,
    /// JSON object sent with the child's readiness announcement.
    #[arg(long, value_name = "JSON")]
    pub init_data: Option<String>,
    /// Schema directory for custom payload validation at the parent.
    #[arg(long, value_name = "DIR")]
    pub validate: Option<PathBuf>,
    /// With --validate: reject undeclared fields and types without a schema.
    #[arg(long, requires = "validate")]
    pub strict_schemas: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
