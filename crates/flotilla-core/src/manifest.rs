//! JSON manifest describing the supervised services.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::ServiceDefinition;
use crate::error::ConfigError;
use crate::registry::ServiceRegistry;
use crate::settings::SupervisorSettings;

/// On-disk service manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Supervisor-wide policy values.
    #[serde(default)]
    pub settings: SupervisorSettings,
    /// Service definitions in start order.
    #[serde(default)]
    pub services: Vec<ServiceDefinition>,
}

impl Manifest {
    /// Read a manifest from disk.
    ///
    /// Relative working directories are resolved against the directory
    /// containing the manifest, so a manifest can ship next to the services
    /// it describes.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut manifest: Self =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        if let Some(base) = path.parent() {
            manifest.resolve_working_dirs(base);
        }
        Ok(manifest)
    }

    /// Make every relative working directory absolute against `base`.
    pub fn resolve_working_dirs(&mut self, base: &Path) {
        for def in &mut self.services {
            if let Some(dir) = def.working_dir.as_mut()
                && dir.is_relative()
            {
                *dir = base.join(&*dir);
            }
        }
    }

    /// Validate the definitions and split into settings and registry.
    pub fn into_parts(self) -> Result<(SupervisorSettings, ServiceRegistry), ConfigError> {
        let registry = ServiceRegistry::new(self.services)?;
        Ok((self.settings, registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    const MANIFEST: &str = r#"{
        "settings": { "startupTimeoutMs": 1000 },
        "services": [
            { "name": "backend", "command": "python", "workingDir": "backend",
              "env": {"PYTHONPATH": "../shared"}, "port": 8000 },
            { "name": "devserver", "kind": "external", "port": 5173 }
        ]
    }"#;

    #[test]
    fn test_load_resolves_relative_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.json");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(MANIFEST.as_bytes())
            .unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(
            manifest.services[0].working_dir.as_deref(),
            Some(dir.path().join("backend").as_path())
        );

        let (settings, registry) = manifest.into_parts().unwrap();
        assert_eq!(settings.effective_startup_timeout(), Duration::from_secs(1));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Manifest::load(Path::new("/nonexistent/flotilla.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        let err = Manifest::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
