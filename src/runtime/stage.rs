use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::docker::{ContainerId, ContainerRuntime};

/// Handle to a stage inside a [`StageArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageHandle(usize);

/// A stage container started for one local run
#[derive(Debug, Clone)]
pub struct RunningStage {
    pub name: String,
    pub container_id: ContainerId,
    /// Base URL, known once the published port has been discovered
    pub address: Option<String>,
    pub started_at: DateTime<Utc>,
    stopped: bool,
}

/// Every container started during one run, in start order.
///
/// Teardown walks the arena in reverse and skips stages already stopped, so
/// it is safe to call more than once.
#[derive(Debug, Default)]
pub struct StageArena {
    stages: Vec<RunningStage>,
}

impl StageArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, container_id: ContainerId) -> StageHandle {
        self.stages.push(RunningStage {
            name: name.to_string(),
            container_id,
            address: None,
            started_at: Utc::now(),
            stopped: false,
        });
        StageHandle(self.stages.len() - 1)
    }

    pub fn get(&self, handle: StageHandle) -> &RunningStage {
        &self.stages[handle.0]
    }

    pub fn set_address(&mut self, handle: StageHandle, address: String) {
        self.stages[handle.0].address = Some(address);
    }

    /// Record that the runtime already removed this stage
    pub fn mark_stopped(&mut self, handle: StageHandle) {
        self.stages[handle.0].stopped = true;
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stages not yet torn down
    pub fn live(&self) -> impl Iterator<Item = &RunningStage> {
        self.stages.iter().filter(|s| !s.stopped)
    }

    /// Stop every live stage, newest first.
    ///
    /// Failures are logged and the walk continues; the stage stays live so a
    /// later teardown can retry it.
    pub async fn teardown<R: ContainerRuntime + ?Sized>(&mut self, runtime: &R) -> usize {
        let mut failures = 0;
        for stage in self.stages.iter_mut().rev().filter(|s| !s.stopped) {
            info!(
                "Stopping stage '{}' (up since {})",
                stage.name,
                stage.started_at.to_rfc3339()
            );
            match runtime.stop(&stage.container_id).await {
                Ok(()) => stage.stopped = true,
                Err(e) => {
                    failures += 1;
                    warn!("Failed to stop stage '{}': {}", stage.name, e);
                }
            }
        }
        failures
    }
}
