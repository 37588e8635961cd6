//! Container runtime access
//!
//! The orchestrator only needs a narrow slice of a container runtime: start a
//! detached container, ask which host port a container port was published on,
//! and remove the container again. [`ContainerRuntime`] captures that slice;
//! [`DockerRuntime`] implements it by shelling out to the docker CLI.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::config::{resolve_docker_host, Settings};

/// Errors that can occur during container runtime operations
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Failed to run '{command}': {message}")]
    CommandFailed { command: String, message: String },

    #[error("Runtime returned no container id")]
    EmptyContainerId,

    #[error("Could not parse port from runtime output: '{0}'")]
    InvalidPort(String),

    #[error("Manager exited with status {0}")]
    ManagerExited(i32),

    #[error("Image build for '{tag}' exited with status {code}")]
    BuildFailed { tag: String, code: i32 },
}

/// Opaque id the runtime hands back for a started container
pub type ContainerId = String;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a detached container with its exposed ports published
    async fn start(&self, image: &str) -> Result<ContainerId, RuntimeError>;

    /// Host port that `container_port/tcp` of `id` is published on
    async fn inspect_port(&self, id: &str, container_port: u16) -> Result<u16, RuntimeError>;

    /// Stop and remove the container
    async fn stop(&self, id: &str) -> Result<(), RuntimeError>;

    /// Address published ports are reachable through
    fn resolve_host_address(&self) -> String;

    /// Run the pipeline manager attached, as container `name`, until it exits
    async fn run_manager(
        &self,
        image: &str,
        name: &str,
        port: u16,
        chain: &[String],
    ) -> Result<(), RuntimeError>;

    /// Build image `tag` from `dockerfile`, streaming the build output
    async fn build(
        &self,
        tag: &str,
        dockerfile: &Path,
        context: &Path,
        git_commit: &str,
    ) -> Result<(), RuntimeError>;
}

#[async_trait]
impl<T: ContainerRuntime + ?Sized> ContainerRuntime for Arc<T> {
    async fn start(&self, image: &str) -> Result<ContainerId, RuntimeError> {
        (**self).start(image).await
    }

    async fn inspect_port(&self, id: &str, container_port: u16) -> Result<u16, RuntimeError> {
        (**self).inspect_port(id, container_port).await
    }

    async fn stop(&self, id: &str) -> Result<(), RuntimeError> {
        (**self).stop(id).await
    }

    fn resolve_host_address(&self) -> String {
        (**self).resolve_host_address()
    }

    async fn run_manager(
        &self,
        image: &str,
        name: &str,
        port: u16,
        chain: &[String],
    ) -> Result<(), RuntimeError> {
        (**self).run_manager(image, name, port, chain).await
    }

    async fn build(
        &self,
        tag: &str,
        dockerfile: &Path,
        context: &Path,
        git_commit: &str,
    ) -> Result<(), RuntimeError> {
        (**self).build(tag, dockerfile, context, git_commit).await
    }
}

// ============================================================================
// SBIO: Pure argument generation (no I/O)
// ============================================================================

/// Generate `run` arguments for a stage container
pub fn generate_start_args(image: &str) -> Vec<String> {
    vec![
        "run".to_string(),
        "-d".to_string(),
        "-P".to_string(),
        image.to_string(),
    ]
}

/// Generate `inspect` arguments that print the host port of `container_port/tcp`
pub fn generate_inspect_port_args(id: &str, container_port: u16) -> Vec<String> {
    vec![
        "inspect".to_string(),
        "--format".to_string(),
        format!(
            "{{{{(index (index .NetworkSettings.Ports \"{}/tcp\") 0).HostPort}}}}",
            container_port
        ),
        id.to_string(),
    ]
}

/// Generate `rm` arguments (stop + remove)
pub fn generate_rm_args(id: &str) -> Vec<String> {
    vec!["rm".to_string(), "-f".to_string(), id.to_string()]
}

/// Generate `run` arguments for the attached manager container.
///
/// With `host_network` the manager shares the host's network namespace, so a
/// chain of loopback addresses reaches the published stage ports. Otherwise
/// its port is published like any other container's.
pub fn generate_manager_args(
    image: &str,
    name: &str,
    port: u16,
    chain: &[String],
    host_network: bool,
) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "--name".to_string(),
        name.to_string(),
    ];
    if host_network {
        args.extend(["--network".to_string(), "host".to_string()]);
    } else {
        args.extend(["-p".to_string(), format!("{}:{}", port, port)]);
    }
    args.push(image.to_string());
    args.push("--port".to_string());
    args.push(port.to_string());
    args.extend(chain.iter().cloned());
    args
}

/// Generate `build` arguments for an image, stamping the source commit
pub fn generate_build_args(
    tag: &str,
    dockerfile: &Path,
    context: &Path,
    git_commit: &str,
) -> Vec<String> {
    vec![
        "build".to_string(),
        "-t".to_string(),
        tag.to_string(),
        "-f".to_string(),
        dockerfile.display().to_string(),
        "--build-arg".to_string(),
        format!("GIT_COMMIT={}", git_commit),
        context.display().to_string(),
    ]
}

/// Whether `host` names this machine's loopback interface
pub fn is_loopback_host(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host
            .parse::<std::net::IpAddr>()
            .is_ok_and(|ip| ip.is_loopback())
}

/// Parse a container id from `run -d` output
pub fn parse_container_id(output: &str) -> Result<ContainerId, RuntimeError> {
    let id = output.trim();
    if id.is_empty() {
        return Err(RuntimeError::EmptyContainerId);
    }
    Ok(id.to_string())
}

/// Parse a host port from `inspect` output, tolerating quotes and whitespace
pub fn parse_port(output: &str) -> Result<u16, RuntimeError> {
    let trimmed = output.trim().trim_matches('\'').trim_matches('"');
    trimmed
        .parse()
        .map_err(|_| RuntimeError::InvalidPort(output.trim().to_string()))
}

// ============================================================================
// I/O implementation (docker CLI)
// ============================================================================

#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker_cmd: String,
    host: String,
}

impl DockerRuntime {
    pub fn new(docker_cmd: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            docker_cmd: docker_cmd.into(),
            host: host.into(),
        }
    }

    /// Runtime for the configured executable, with the host taken from `DOCKER_HOST`
    pub fn from_settings(settings: &Settings) -> Self {
        let docker_host = std::env::var("DOCKER_HOST").ok();
        Self::new(
            settings.docker_cmd.clone(),
            resolve_docker_host(docker_host.as_deref()),
        )
    }

    async fn output(&self, args: &[String]) -> Result<String, RuntimeError> {
        debug!("{} args: {:?}", self.docker_cmd, args);
        let command = format!("{} {}", self.docker_cmd, args.first().map_or("", String::as_str));

        let output = Command::new(&self.docker_cmd)
            .args(args)
            .output()
            .await
            .map_err(|e| RuntimeError::CommandFailed {
                command: command.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn start(&self, image: &str) -> Result<ContainerId, RuntimeError> {
        let stdout = self.output(&generate_start_args(image)).await?;
        parse_container_id(&stdout)
    }

    async fn inspect_port(&self, id: &str, container_port: u16) -> Result<u16, RuntimeError> {
        let stdout = self
            .output(&generate_inspect_port_args(id, container_port))
            .await?;
        parse_port(&stdout)
    }

    async fn stop(&self, id: &str) -> Result<(), RuntimeError> {
        self.output(&generate_rm_args(id)).await.map(|_| ())
    }

    fn resolve_host_address(&self) -> String {
        self.host.clone()
    }

    async fn run_manager(
        &self,
        image: &str,
        name: &str,
        port: u16,
        chain: &[String],
    ) -> Result<(), RuntimeError> {
        let host_network = is_loopback_host(&self.host);
        let args = generate_manager_args(image, name, port, chain, host_network);
        debug!("{} args: {:?}", self.docker_cmd, args);

        // Inherit stdio so the manager's log lines stream to the terminal.
        let status = Command::new(&self.docker_cmd)
            .args(&args)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| RuntimeError::CommandFailed {
                command: format!("{} run", self.docker_cmd),
                message: e.to_string(),
            })?;

        if !status.success() {
            return Err(RuntimeError::ManagerExited(status.code().unwrap_or(-1)));
        }
        Ok(())
    }

    async fn build(
        &self,
        tag: &str,
        dockerfile: &Path,
        context: &Path,
        git_commit: &str,
    ) -> Result<(), RuntimeError> {
        let args = generate_build_args(tag, dockerfile, context, git_commit);
        debug!("{} args: {:?}", self.docker_cmd, args);

        let status = Command::new(&self.docker_cmd)
            .args(&args)
            .status()
            .await
            .map_err(|e| RuntimeError::CommandFailed {
                command: format!("{} build", self.docker_cmd),
                message: e.to_string(),
            })?;

        if !status.success() {
            return Err(RuntimeError::BuildFailed {
                tag: tag.to_string(),
                code: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_start_args() {
        assert_eq!(
            generate_start_args("plumb/filter"),
            vec!["run", "-d", "-P", "plumb/filter"]
        );
    }

    #[test]
    fn test_generate_inspect_port_args() {
        let args = generate_inspect_port_args("abc123", 9800);
        assert_eq!(args[0], "inspect");
        assert_eq!(
            args[2],
            "{{(index (index .NetworkSettings.Ports \"9800/tcp\") 0).HostPort}}"
        );
        assert_eq!(args[3], "abc123");
    }

    #[test]
    fn test_generate_rm_args() {
        assert_eq!(generate_rm_args("abc123"), vec!["rm", "-f", "abc123"]);
    }

    #[test]
    fn test_generate_manager_args_local_daemon() {
        let chain = vec![
            "http://127.0.0.1:32768".to_string(),
            "http://127.0.0.1:32769".to_string(),
        ];
        let args = generate_manager_args("plumb/manager", "plumb-manager-1", 9800, &chain, true);
        assert_eq!(
            args,
            vec![
                "run",
                "--rm",
                "--name",
                "plumb-manager-1",
                "--network",
                "host",
                "plumb/manager",
                "--port",
                "9800",
                "http://127.0.0.1:32768",
                "http://127.0.0.1:32769",
            ]
        );
    }

    #[test]
    fn test_generate_manager_args_remote_daemon() {
        let chain = vec!["http://192.168.59.103:32768".to_string()];
        let args = generate_manager_args("plumb/manager", "m", 9800, &chain, false);
        assert_eq!(
            args,
            vec![
                "run",
                "--rm",
                "--name",
                "m",
                "-p",
                "9800:9800",
                "plumb/manager",
                "--port",
                "9800",
                "http://192.168.59.103:32768",
            ]
        );
    }

    #[test]
    fn test_generate_build_args() {
        let args = generate_build_args(
            "plumb/manager",
            Path::new("./docker/manager.Dockerfile"),
            Path::new("."),
            "abc1234",
        );
        assert_eq!(
            args,
            vec![
                "build",
                "-t",
                "plumb/manager",
                "-f",
                "./docker/manager.Dockerfile",
                "--build-arg",
                "GIT_COMMIT=abc1234",
                ".",
            ]
        );
    }

    #[test]
    fn test_is_loopback_host() {
        assert!(is_loopback_host("127.0.0.1"));
        assert!(is_loopback_host("localhost"));
        assert!(is_loopback_host("::1"));
        assert!(!is_loopback_host("192.168.59.103"));
        assert!(!is_loopback_host("docker.example.com"));
    }

    #[test]
    fn test_parse_container_id() {
        assert_eq!(parse_container_id("f00dfeed\n").unwrap(), "f00dfeed");
        assert!(matches!(
            parse_container_id("  \n"),
            Err(RuntimeError::EmptyContainerId)
        ));
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("32768\n").unwrap(), 32768);
        assert_eq!(parse_port("'32768'\n").unwrap(), 32768);
        assert!(matches!(
            parse_port("<no value>"),
            Err(RuntimeError::InvalidPort(_))
        ));
    }

    #[test]
    fn test_docker_runtime_host() {
        let runtime = DockerRuntime::new("docker", "192.168.59.103");
        assert_eq!(runtime.resolve_host_address(), "192.168.59.103");
    }

    #[tokio::test]
    async fn test_missing_executable_is_command_failure() {
        let runtime = DockerRuntime::new("/nonexistent/docker-binary", "127.0.0.1");
        let result = runtime.start("plumb/anything").await;
        assert!(matches!(result, Err(RuntimeError::CommandFailed { .. })));
    }
}
