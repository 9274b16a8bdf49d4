//! Composition root: manifest resolution, logging, supervisor construction.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flotilla_core::Manifest;
use flotilla_runtime::ProcessSupervisor;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Manifest location under the user config directory.
const DEFAULT_MANIFEST: &str = "flotilla/services.json";

/// Install the global subscriber.
///
/// Logs go to stderr so stdout stays a clean event stream. `RUST_LOG`
/// overrides the default level.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Where the CLI reads its configuration from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    pub manifest_path: PathBuf,
}

impl CliConfig {
    /// Use the explicit path (flag or `FLOTILLA_MANIFEST`) or the default.
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self> {
        let manifest_path = match explicit {
            Some(path) => path,
            None => default_manifest_path()
                .context("No --manifest given and no config directory to look in")?,
        };
        Ok(Self { manifest_path })
    }
}

/// `<config dir>/flotilla/services.json`, if the platform has a config dir.
pub fn default_manifest_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(DEFAULT_MANIFEST))
}

/// Loaded manifest plus the supervisor built from it.
#[derive(Debug)]
pub struct CliContext {
    manifest_path: PathBuf,
    supervisor: ProcessSupervisor,
}

impl CliContext {
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }
}

/// Load the manifest and construct the supervisor.
pub fn bootstrap(config: CliConfig) -> Result<CliContext> {
    let manifest = Manifest::load(&config.manifest_path).with_context(|| {
        format!(
            "Failed to load service manifest {}",
            config.manifest_path.display()
        )
    })?;
    let (settings, registry) = manifest.into_parts()?;

    info!(
        manifest = %config.manifest_path.display(),
        services = registry.len(),
        "Loaded service manifest"
    );

    Ok(CliContext {
        manifest_path: config.manifest_path,
        supervisor: ProcessSupervisor::new(registry, settings),
    })
}
