//! Local orchestration of a sorted pipeline
//!
//! Stages are started one at a time in startup (consumer-first) order, so a
//! stage never comes up before everything it sends data to is listening. Once
//! every stage address is known the manager is launched with the chain in
//! forwarding (producer-first) order. Every container started along the way
//! lives in a [`StageArena`] and is removed on every exit path.

use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::graph::StageOrder;
use crate::runtime::docker::{ContainerRuntime, RuntimeError};
use crate::runtime::forward::{wait_for_shutdown, ForwardingChain};
use crate::runtime::stage::StageArena;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Stage '{stage}' failed to start: {source}")]
    StageStartFailure {
        stage: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Manager failed: {0}")]
    Manager(#[source] RuntimeError),

    #[error("Interrupted")]
    Interrupted,
}

/// Images, ports and the runtime used for one local run
pub struct LocalOrchestrator<R: ContainerRuntime> {
    runtime: R,
    settings: Settings,
}

impl<R: ContainerRuntime> LocalOrchestrator<R> {
    pub fn new(runtime: R, settings: Settings) -> Self {
        Self { runtime, settings }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Start every stage in startup order and return the forwarding chain.
    ///
    /// Stops at the first start or port-discovery failure; containers already
    /// started stay in `arena` for the caller to tear down. The shutdown flag
    /// is checked between stages, never mid-command, so no started container
    /// goes unrecorded.
    pub async fn start_stages(
        &self,
        order: &StageOrder,
        arena: &mut StageArena,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<ForwardingChain, OrchestratorError> {
        info!("Starting {} stages", order.len());
        let host = self.runtime.resolve_host_address();
        let mut addresses = Vec::with_capacity(order.len());

        for name in order.startup() {
            if *shutdown.borrow() {
                return Err(OrchestratorError::Interrupted);
            }

            let start_failure = |source| OrchestratorError::StageStartFailure {
                stage: name.clone(),
                source,
            };

            info!("Starting stage '{}'", name);
            let image = self.settings.image_for(name);
            let id = self.runtime.start(&image).await.map_err(start_failure)?;
            let handle = arena.insert(name, id);

            let port = self
                .runtime
                .inspect_port(&arena.get(handle).container_id, self.settings.stage_port)
                .await
                .map_err(start_failure)?;
            let address = format!("http://{}:{}", host, port);
            info!("Stage '{}' listening at {}", name, address);

            arena.set_address(handle, address.clone());
            addresses.push(address);
        }

        addresses.reverse();
        Ok(ForwardingChain::new(addresses))
    }

    /// Bring the pipeline up, run the manager until it exits or `shutdown`
    /// fires, then tear everything down.
    pub async fn run(
        &self,
        order: &StageOrder,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), OrchestratorError> {
        let mut arena = StageArena::new();
        let result = self.run_in(order, &mut arena, shutdown).await;

        let failures = arena.teardown(&self.runtime).await;
        if failures > 0 {
            warn!("{} containers could not be removed", failures);
        }
        result
    }

    async fn run_in(
        &self,
        order: &StageOrder,
        arena: &mut StageArena,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), OrchestratorError> {
        let chain = self.start_stages(order, arena, &shutdown).await?;
        info!("Forwarding chain: {:?}", chain.addresses());

        let name = format!("plumb-manager-{}", Uuid::new_v4().simple());
        let handle = arena.insert("manager", name.clone());

        info!("Running manager. CTRL-C to quit.");
        let manager = self.runtime.run_manager(
            &self.settings.manager_image,
            &name,
            self.settings.manager_port,
            chain.addresses(),
        );

        tokio::select! {
            result = manager => {
                // `--rm` already removed the container.
                arena.mark_stopped(handle);
                result.map_err(OrchestratorError::Manager)
            }
            _ = wait_for_shutdown(&mut shutdown) => {
                info!("Received termination; quitting.");
                Ok(())
            }
        }
    }
}
