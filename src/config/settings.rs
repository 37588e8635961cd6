use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Port every stage container listens on, and the manager's default port
pub const DEFAULT_PORT: u16 = 9800;

/// Cap on any single payload read by the manager (1 MiB)
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Default per-stage timeout in seconds
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 30;

/// Default settings directory: ~/.plumb
pub fn default_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".plumb")
}

/// Default settings file location: ~/.plumb/config.yml
pub fn default_settings_path() -> PathBuf {
    default_root().join("config.yml")
}

/// Tool-wide settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding one subdirectory per pipeline
    pub root: PathBuf,

    /// Container runtime executable
    pub docker_cmd: String,

    /// Stage images are named `<image_prefix>/<bundle>`
    pub image_prefix: String,

    pub manager_image: String,

    /// Port exposed inside every stage container
    pub stage_port: u16,

    pub manager_port: u16,

    pub stage_timeout_secs: u64,

    pub max_payload_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: default_root(),
            docker_cmd: "docker".to_string(),
            image_prefix: "plumb".to_string(),
            manager_image: "plumb/manager".to_string(),
            stage_port: DEFAULT_PORT,
            manager_port: DEFAULT_PORT,
            stage_timeout_secs: DEFAULT_STAGE_TIMEOUT_SECS,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

impl Settings {
    /// Image reference for a bundle
    pub fn image_for(&self, bundle: &str) -> String {
        format!("{}/{}", self.image_prefix, bundle)
    }

    /// Where the pipeline `name` is stored
    pub fn pipeline_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

// ============================================================================
// SBIO: Pure parsing (no I/O)
// ============================================================================

/// Parse settings from YAML, expanding `~` in the root path.
pub fn parse_settings(content: &str) -> Result<Settings, ConfigError> {
    let mut settings: Settings =
        serde_yaml::from_str(content).map_err(|e| ConfigError::SettingsError(e.to_string()))?;
    let root = settings.root.to_string_lossy().into_owned();
    settings.root = PathBuf::from(shellexpand::tilde(&root).into_owned());
    Ok(settings)
}

/// Host through which published container ports are reachable.
///
/// A `tcp://host:port` docker endpoint means containers live on a remote or
/// virtualized host; anything else is the local daemon.
pub fn resolve_docker_host(docker_host: Option<&str>) -> String {
    docker_host
        .and_then(|value| value.strip_prefix("tcp://"))
        .and_then(|rest| rest.split(['/', ':']).next())
        .filter(|host| !host.is_empty())
        .unwrap_or("127.0.0.1")
        .to_string()
}

// ============================================================================
// I/O boundary
// ============================================================================

/// Load settings from a path, falling back to defaults when absent
pub fn load_settings_from(path: &std::path::Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)?;
    parse_settings(&content)
}
