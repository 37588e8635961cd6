use std::process;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use plumb::cli::{
    self, format_added, format_created, format_plan, format_version, Cli, CommandError, Commands,
};
use plumb::runtime::{DockerRuntime, OrchestratorError};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    // Load .env file if specified
    if let Some(ref env_file) = cli.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
    }

    if let Err(e) = run(cli).await {
        if let Some(CommandError::Orchestrator(OrchestratorError::Interrupted)) =
            e.downcast_ref::<CommandError>()
        {
            warn!("Interrupted before the pipeline came up");
            process::exit(130);
        }
        error!("{:#}", e);
        process::exit(1);
    }
}

/// Raise the shutdown flag on CTRL-C
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received CTRL-C");
            let _ = tx.send(true);
        }
    });
    rx
}

async fn run(opts: Cli) -> anyhow::Result<()> {
    let config = opts.config;
    let settings = || cli::load_settings(config.as_deref()).context("Failed to load settings");

    match opts.command {
        Commands::Create(args) => {
            let settings = settings()?;
            let dir = cli::create(&settings, &args.pipeline)
                .with_context(|| format!("Failed to create pipeline '{}'", args.pipeline))?;
            print!("{}", format_created(&args.pipeline, &dir));
        }
        Commands::Add(args) => {
            let settings = settings()?;
            let added = cli::add(&settings, &args.pipeline, &args.bundles)
                .with_context(|| format!("Failed to add bundles to '{}'", args.pipeline))?;
            print!("{}", format_added(&args.pipeline, &added));
        }
        Commands::Bootstrap(args) => {
            let mut settings = settings()?;
            if let Some(docker_cmd) = args.docker_cmd.clone() {
                settings.docker_cmd = docker_cmd;
            }
            let runtime = DockerRuntime::from_settings(&settings);
            let tag = cli::bootstrap(&settings, &args, runtime)
                .await
                .context("Failed to build the manager image")?;
            println!("Built manager image '{}'", tag);
        }
        Commands::Plan(args) => {
            let settings = settings()?;
            let plan = cli::plan_pipeline(&settings, &args.pipeline)
                .with_context(|| format!("Failed to plan pipeline '{}'", args.pipeline))?;
            print!("{}", format_plan(&plan));
        }
        Commands::Start(args) => {
            let mut settings = settings()?;
            if let Some(docker_cmd) = args.docker_cmd {
                settings.docker_cmd = docker_cmd;
            }
            let runtime = DockerRuntime::from_settings(&settings);
            cli::start(&settings, &args.pipeline, runtime, shutdown_on_ctrl_c())
                .await
                .with_context(|| format!("Pipeline '{}' failed", args.pipeline))?;
        }
        Commands::Manager(args) => {
            let options = cli::manager_options(&settings()?, &args)?;
            cli::run_manager(options, shutdown_on_ctrl_c())
                .await
                .context("Manager failed")?;
        }
        Commands::Version => println!("{}", format_version()),
    }

    Ok(())
}
