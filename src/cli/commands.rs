//! Command implementations for the CLI
//!
//! SBIO pattern: Commands return Results, I/O is handled by caller

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use super::{BootstrapArgs, ManagerArgs};
use crate::client::{HttpStageClient, StageClientError};
use crate::config::{self, settings::default_settings_path, BundleDescriptor, ConfigError, Settings};
use crate::graph::{self, Graph, GraphError, StageOrder};
use crate::runtime::{
    ContainerRuntime, ForwardingChain, LocalOrchestrator, OrchestratorError, RuntimeError,
};
use crate::server::{serve_manager, ManagerState};

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Client error: {0}")]
    Client(#[from] StageClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pipeline has no stages to forward through")]
    EmptyChain,

    #[error("Manager Dockerfile not found: {0}")]
    DockerfileNotFound(PathBuf),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

/// A pipeline that has been parsed, joined and sorted
#[derive(Debug)]
pub struct PipelinePlan {
    pub name: String,
    pub bundles: Vec<BundleDescriptor>,
    pub graph: Graph,
    pub order: StageOrder,
}

// ============================================================================
// Settings and pipeline workspace
// ============================================================================

/// Load settings from an explicit path or the default location
pub fn load_settings(path: Option<&Path>) -> CommandResult<Settings> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_settings_path);
    Ok(config::load_settings_from(&path)?)
}

pub fn create(settings: &Settings, pipeline: &str) -> CommandResult<PathBuf> {
    Ok(config::create_pipeline(settings, pipeline)?)
}

pub fn add(settings: &Settings, pipeline: &str, bundles: &[PathBuf]) -> CommandResult<Vec<String>> {
    Ok(config::add_bundles(settings, pipeline, bundles)?)
}

/// Load, join and sort a pipeline. Nothing is started.
pub fn plan_pipeline(settings: &Settings, pipeline: &str) -> CommandResult<PipelinePlan> {
    info!("Building dependency graph for '{}'", pipeline);
    let dir = config::get_pipeline(settings, pipeline)?;
    let bundles = config::load_pipeline(&dir)?;
    let (graph, order) = graph::plan(&bundles)?;
    info!("Startup order: {:?}", order.startup());

    Ok(PipelinePlan {
        name: pipeline.to_string(),
        bundles,
        graph,
        order,
    })
}

// ============================================================================
// Bootstrap
// ============================================================================

/// Manager Dockerfile location inside a plumb checkout
pub const MANAGER_DOCKERFILE: &str = "docker/manager.Dockerfile";

/// Commit this binary was built from, when the build stamped one
pub fn git_commit() -> &'static str {
    option_env!("PLUMB_GIT_COMMIT").unwrap_or("unknown")
}

/// Pure: the Dockerfile a bootstrap builds from
pub fn bootstrap_dockerfile(args: &BootstrapArgs) -> PathBuf {
    args.dockerfile
        .clone()
        .unwrap_or_else(|| args.context.join(MANAGER_DOCKERFILE))
}

/// Build the manager image `plumb start` launches
pub async fn bootstrap<R: ContainerRuntime>(
    settings: &Settings,
    args: &BootstrapArgs,
    runtime: R,
) -> CommandResult<String> {
    let dockerfile = bootstrap_dockerfile(args);
    if !dockerfile.is_file() {
        return Err(CommandError::DockerfileNotFound(dockerfile));
    }

    info!("Building '{}' from {}", settings.manager_image, dockerfile.display());
    runtime
        .build(&settings.manager_image, &dockerfile, &args.context, git_commit())
        .await?;
    Ok(settings.manager_image.clone())
}

// ============================================================================
// Local run
// ============================================================================

/// Plan a pipeline and run it on `runtime` until the manager exits or
/// `shutdown` fires.
pub async fn start<R: ContainerRuntime>(
    settings: &Settings,
    pipeline: &str,
    runtime: R,
    shutdown: watch::Receiver<bool>,
) -> CommandResult<()> {
    info!("==> Starting '{}' pipeline", pipeline);
    let plan = plan_pipeline(settings, pipeline)?;
    if plan.order.is_empty() {
        return Err(CommandError::EmptyChain);
    }

    let orchestrator = LocalOrchestrator::new(runtime, settings.clone());
    orchestrator.run(&plan.order, shutdown).await?;

    info!("<== '{}' finished", pipeline);
    Ok(())
}

// ============================================================================
// Manager
// ============================================================================

/// Manager settings after applying CLI overrides
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerOptions {
    pub addr: String,
    pub timeout: Duration,
    pub max_payload_bytes: usize,
    pub chain: ForwardingChain,
}

/// Pure: merge CLI arguments over settings
pub fn manager_options(settings: &Settings, args: &ManagerArgs) -> CommandResult<ManagerOptions> {
    if args.stages.is_empty() {
        return Err(CommandError::EmptyChain);
    }
    Ok(ManagerOptions {
        addr: format!(
            "{}:{}",
            args.bind_addr,
            args.port.unwrap_or(settings.manager_port)
        ),
        timeout: Duration::from_secs(args.timeout.unwrap_or(settings.stage_timeout_secs)),
        max_payload_bytes: args.max_payload.unwrap_or(settings.max_payload_bytes),
        chain: ForwardingChain::new(args.stages.clone()),
    })
}

/// Run the manager until `shutdown` fires
pub async fn run_manager(
    options: ManagerOptions,
    shutdown: watch::Receiver<bool>,
) -> CommandResult<()> {
    let client = HttpStageClient::new(options.timeout, options.max_payload_bytes)?;
    let state = ManagerState::new(
        Arc::new(client),
        options.chain.clone(),
        shutdown,
        options.max_payload_bytes,
    );

    let listener = TcpListener::bind(&options.addr).await?;
    info!("Manager listening on {}", options.addr);
    info!("Forwarding chain: {:?}", options.chain.addresses());

    serve_manager(listener, state).await?;
    Ok(())
}
