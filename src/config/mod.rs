pub mod bundle;
pub mod settings;

pub use bundle::{BundleDescriptor, BundleError, Field, BUNDLE_FILE};
pub use settings::{load_settings_from, parse_settings, resolve_docker_host, Settings};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

/// Errors for file I/O operations (separate from pure parsing errors)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Bundle error in {path}: {source}")]
    BundleError {
        path: PathBuf,
        #[source]
        source: BundleError,
    },

    #[error("Pipeline '{0}' not found")]
    PipelineNotFound(String),

    #[error("Pipeline '{0}' already exists")]
    PipelineExists(String),

    #[error("Invalid settings: {0}")]
    SettingsError(String),

    #[error("Bundle '{0}' is given more than once")]
    DuplicateBundle(String),
}

// ============================================================================
// SBIO: I/O wrapper - thin layer over pure functions
// ============================================================================

/// Load a bundle descriptor from a file, or from `plumb.yml` inside a directory.
pub fn load_bundle(path: &Path) -> Result<BundleDescriptor, ConfigError> {
    let file = if path.is_dir() {
        path.join(BUNDLE_FILE)
    } else {
        path.to_path_buf()
    };
    let content = std::fs::read_to_string(&file)?;
    BundleDescriptor::from_str(&content).map_err(|source| ConfigError::BundleError {
        path: file,
        source,
    })
}

/// Load every `*.yml` descriptor of a pipeline directory, in file-name order.
pub fn load_pipeline(dir: &Path) -> Result<Vec<BundleDescriptor>, ConfigError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "yml"))
        .collect();
    files.sort();

    files.iter().map(|file| load_bundle(file)).collect()
}

/// Resolve an existing pipeline directory
pub fn get_pipeline(settings: &Settings, name: &str) -> Result<PathBuf, ConfigError> {
    let path = settings.pipeline_path(name);
    if !path.is_dir() {
        return Err(ConfigError::PipelineNotFound(name.to_string()));
    }
    Ok(path)
}

/// Create an empty pipeline directory
pub fn create_pipeline(settings: &Settings, name: &str) -> Result<PathBuf, ConfigError> {
    let path = settings.pipeline_path(name);
    if path.exists() {
        return Err(ConfigError::PipelineExists(name.to_string()));
    }
    std::fs::create_dir_all(&path)?;
    info!("Created pipeline '{}' at {}", name, path.display());
    Ok(path)
}

/// Validate bundle descriptors and copy them into a pipeline as `<bundle>.yml`.
///
/// Every descriptor is parsed before anything is written.
pub fn add_bundles(
    settings: &Settings,
    pipeline: &str,
    bundle_paths: &[PathBuf],
) -> Result<Vec<String>, ConfigError> {
    let dir = get_pipeline(settings, pipeline)?;
    let bundles = bundle_paths
        .iter()
        .map(|p| load_bundle(p))
        .collect::<Result<Vec<_>, _>>()?;

    let mut names = HashSet::new();
    if let Some(dup) = bundles.iter().find(|b| !names.insert(b.name.as_str())) {
        return Err(ConfigError::DuplicateBundle(dup.name.clone()));
    }

    let mut added = Vec::with_capacity(bundles.len());
    for bundle in bundles {
        let target = dir.join(format!("{}.yml", bundle.name));
        let content = serde_yaml::to_string(&bundle).map_err(|e| ConfigError::BundleError {
            path: target.clone(),
            source: BundleError::ParseError(e.to_string()),
        })?;
        std::fs::write(&target, content)?;
        info!("Added bundle '{}' to '{}'", bundle.name, pipeline);
        added.push(bundle.name);
    }
    Ok(added)
}
