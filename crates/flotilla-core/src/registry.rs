//! Static registry of service definitions.

use std::collections::HashMap;

use crate::domain::ServiceDefinition;
use crate::error::ConfigError;

/// Read-only list of service definitions in declared order.
///
/// Construction validates the definitions; after that the registry never
/// changes.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    definitions: Vec<ServiceDefinition>,
    index: HashMap<String, usize>,
}

impl ServiceRegistry {
    /// Build a registry, rejecting duplicate names and unusable definitions.
    pub fn new(definitions: Vec<ServiceDefinition>) -> Result<Self, ConfigError> {
        let mut index = HashMap::with_capacity(definitions.len());

        for (position, def) in definitions.iter().enumerate() {
            validate(def)?;
            if index.insert(def.name.clone(), position).is_some() {
                return Err(ConfigError::DuplicateService(def.name.clone()));
            }
        }

        Ok(Self { definitions, index })
    }

    /// All definitions in declared order.
    pub fn definitions(&self) -> &[ServiceDefinition] {
        &self.definitions
    }

    /// Look up a definition by name.
    pub fn get(&self, name: &str) -> Option<&ServiceDefinition> {
        self.index.get(name).map(|&i| &self.definitions[i])
    }

    /// Service names in declared order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|d| d.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn validate(def: &ServiceDefinition) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidDefinition {
        service: def.name.clone(),
        reason: reason.to_string(),
    };

    if def.name.trim().is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if def.is_managed() && def.command.as_deref().is_none_or(|c| c.trim().is_empty()) {
        return Err(invalid("managed services need a command"));
    }
    if !def.is_managed() && def.port.is_none() {
        return Err(invalid("external services need a port"));
    }
    if def.port == Some(0) {
        return Err(invalid("port 0 is not a valid listening port"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<ServiceDefinition> {
        vec![
            ServiceDefinition::managed("backend", "python").with_port(8000),
            ServiceDefinition::managed("admin", "node").non_critical(),
            ServiceDefinition::external("devserver", 5173),
        ]
    }

    #[test]
    fn test_preserves_declared_order() {
        let registry = ServiceRegistry::new(sample()).unwrap();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["backend", "admin", "devserver"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_get_known_and_unknown() {
        let registry = ServiceRegistry::new(sample()).unwrap();
        assert_eq!(registry.get("admin").map(|d| d.critical), Some(false));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_rejects_duplicates() {
        let mut defs = sample();
        defs.push(ServiceDefinition::managed("backend", "other"));
        let err = ServiceRegistry::new(defs).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateService(name) if name == "backend"));
    }

    #[test]
    fn test_rejects_managed_without_command() {
        let mut def = ServiceDefinition::managed("broken", "x");
        def.command = None;
        let err = ServiceRegistry::new(vec![def]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDefinition { .. }));
    }

    #[test]
    fn test_rejects_external_without_port() {
        let mut def = ServiceDefinition::external("dev", 3000);
        def.port = None;
        assert!(ServiceRegistry::new(vec![def]).is_err());
    }
}
