//! CLI module for plumb
//!
//! Subcommands:
//! - `plumb create` - Create an empty pipeline
//! - `plumb add` - Add bundle descriptors to a pipeline
//! - `plumb bootstrap` - Build the manager image
//! - `plumb plan` - Show the stage order without starting anything
//! - `plumb start` - Run a pipeline locally
//! - `plumb manager` - Run the pipeline manager in-process
//! - `plumb version` - Show version information

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod display;

pub use commands::*;
pub use display::*;

#[derive(Parser, Debug)]
#[command(name = "plumb")]
#[command(about = "A command line tool for managing distributed data pipelines")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to settings file (default: ~/.plumb/config.yml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to a .env file loaded before anything else
    #[arg(long, value_name = "FILE", global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a pipeline managed by plumb
    Create(PipelineArgs),

    /// Add bundles to a pipeline
    Add(AddArgs),

    /// Build the manager image used by `plumb start`
    Bootstrap(BootstrapArgs),

    /// Show the dependency graph and stage order of a pipeline
    Plan(PipelineArgs),

    /// Start a pipeline on the local container runtime
    Start(StartArgs),

    /// Run the pipeline manager against a list of stage URLs
    Manager(ManagerArgs),

    /// Show version information
    Version,
}

/// A command that only needs a pipeline name
#[derive(Parser, Debug)]
pub struct PipelineArgs {
    /// Pipeline name
    pub pipeline: String,
}

#[derive(Parser, Debug)]
pub struct AddArgs {
    /// Pipeline name
    pub pipeline: String,

    /// Bundle directories (containing plumb.yml) or descriptor files
    #[arg(required = true)]
    pub bundles: Vec<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct StartArgs {
    /// Pipeline name
    pub pipeline: String,

    /// Container runtime executable (overrides settings)
    #[arg(long, env = "PLUMB_DOCKER")]
    pub docker_cmd: Option<String>,
}

#[derive(Parser, Debug)]
pub struct BootstrapArgs {
    /// Build context: a checkout of the plumb sources
    #[arg(long, default_value = ".")]
    pub context: PathBuf,

    /// Manager Dockerfile (default: <context>/docker/manager.Dockerfile)
    #[arg(long)]
    pub dockerfile: Option<PathBuf>,

    /// Container runtime executable (overrides settings)
    #[arg(long, env = "PLUMB_DOCKER")]
    pub docker_cmd: Option<String>,
}

#[derive(Parser, Debug)]
pub struct ManagerArgs {
    /// Stage base URLs, in forwarding order
    pub stages: Vec<String>,

    /// Bind address
    #[arg(long, default_value = "0.0.0.0")]
    pub bind_addr: String,

    /// Port to listen on (default: 9800)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Per-stage request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Maximum payload size in bytes
    #[arg(long)]
    pub max_payload: Option<usize>,
}
