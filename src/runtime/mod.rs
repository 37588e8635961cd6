pub mod docker;
pub mod forward;
pub mod orchestrator;
pub mod stage;

pub use docker::{ContainerRuntime, DockerRuntime, RuntimeError};
pub use forward::{wait_for_shutdown, ForwardError, Forwarder, ForwardingChain};
pub use orchestrator::{LocalOrchestrator, OrchestratorError};
pub use stage::{RunningStage, StageArena, StageHandle};
