//! YAML catalogs
//!
//! Services and workflows are authored as YAML files and bulk-loaded into
//! the registries at startup.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use civic_core::{ConfigError, EngineError, EngineResult, StoreError};
use civic_schema::{strip_identity_fields, ServiceDefinition};

use crate::remediation::{remediate_duplicate_module_types, ModuleRename};
use crate::services::{indexed, ServiceRegistry};
use crate::workflows::{WorkflowDefinition, WorkflowRegistry};

/// Service catalog file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCatalog {
    #[serde(default)]
    pub version: Option<String>,
    pub services: Vec<ServiceDefinition>,
}

impl ServiceCatalog {
    pub fn from_yaml(yaml: &str) -> EngineResult<Self> {
        Ok(serde_yaml::from_str(yaml)
            .map_err(|e| ConfigError::Parse(format!("service catalog: {}", e)))?)
    }

    pub fn load(path: &str) -> EngineResult<Self> {
        Self::from_yaml(&read(path)?)
    }
}

/// Workflow catalog file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowCatalog {
    #[serde(default)]
    pub version: Option<String>,
    pub workflows: Vec<WorkflowDefinition>,
}

impl WorkflowCatalog {
    pub fn from_yaml(yaml: &str) -> EngineResult<Self> {
        Ok(serde_yaml::from_str(yaml)
            .map_err(|e| ConfigError::Parse(format!("workflow catalog: {}", e)))?)
    }

    pub fn load(path: &str) -> EngineResult<Self> {
        Self::from_yaml(&read(path)?)
    }
}

fn read(path: &str) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// Outcome of a catalog load
#[derive(Debug, Clone, Default)]
pub struct CatalogLoad {
    /// Ids of the registered services, in catalog order
    pub registered: Vec<String>,
    /// Module types changed by remediation
    pub renames: Vec<ModuleRename>,
    /// Identity fields moved out of forms, as (service id, field)
    pub moved_identity_fields: Vec<(String, String)>,
}

/// Register every service of `catalog`.
///
/// With `remediate` set, legacy problems are fixed first: identity fields
/// declared as form fields are moved to `citizenFields`, and duplicate
/// module types are renamed. Either way the whole batch is checked before
/// anything is registered: a rejected catalog leaves the registry as it was.
pub fn load_catalog(
    registry: &ServiceRegistry,
    catalog: ServiceCatalog,
    remediate: bool,
) -> EngineResult<CatalogLoad> {
    let mut services = catalog.services;
    let mut outcome = CatalogLoad::default();

    if remediate {
        for service in services.iter_mut() {
            for field in strip_identity_fields(service) {
                outcome.moved_identity_fields.push((service.id.clone(), field));
            }
        }
        outcome.renames = remediate_duplicate_module_types(&mut services);
    }

    check_batch(registry, &services)?;
    for service in services {
        let stored = registry.register(service)?;
        outcome.registered.push(stored.id);
    }
    tracing::info!(
        services = outcome.registered.len(),
        renames = outcome.renames.len(),
        "service catalog loaded"
    );
    Ok(outcome)
}

/// Reject the batch if any service would fail to register
fn check_batch(registry: &ServiceRegistry, services: &[ServiceDefinition]) -> EngineResult<()> {
    let existing = registry.list()?;
    let mut ids: HashSet<String> = existing.iter().map(|s| s.id.clone()).collect();
    let mut modules: HashMap<String, String> = existing
        .into_iter()
        .filter(indexed)
        .filter_map(|s| s.module_type.map(|module| (module, s.id)))
        .collect();

    for service in services {
        service.check()?;
        if !ids.insert(service.id.clone()) {
            return Err(StoreError::AlreadyExists(service.id.clone()).into());
        }
        if !indexed(service) {
            continue;
        }
        if let Some(module) = &service.module_type {
            if let Some(holder) = modules.get(module) {
                return Err(EngineError::DuplicateModuleType {
                    module_type: module.clone(),
                    existing_service: holder.clone(),
                });
            }
            modules.insert(module.clone(), service.id.clone());
        }
    }
    Ok(())
}

/// Create every workflow of `catalog`, each as the next active version of
/// its module.
pub fn load_workflows(
    registry: &WorkflowRegistry,
    workflows: Vec<WorkflowDefinition>,
) -> EngineResult<Vec<WorkflowDefinition>> {
    workflows
        .into_iter()
        .map(|definition| registry.create(definition))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_core::{EngineError, MemoryStore};
    use std::sync::Arc;

    const CATALOG: &str = r#"
version: "1.0"
services:
  - id: a
    name: Atendimento
    departmentCode: AGRICULTURA
    serviceType: COM_DADOS
    moduleType: ATENDIMENTOS_AGRICULTURA
    createdAt: "2025-01-10T00:00:00Z"
    fields:
      - { name: cpf, label: CPF, type: cpf }
      - { name: assunto, label: Assunto, type: text }
  - id: b
    name: Atendimento (cópia)
    departmentCode: AGRICULTURA
    serviceType: COM_DADOS
    moduleType: ATENDIMENTOS_AGRICULTURA
    createdAt: "2025-02-10T00:00:00Z"
"#;

    fn registry() -> ServiceRegistry {
        ServiceRegistry::new(Arc::new(MemoryStore::<ServiceDefinition>::new())).unwrap()
    }

    #[test]
    fn test_load_with_remediation() {
        let registry = registry();
        let catalog = ServiceCatalog::from_yaml(CATALOG).unwrap();
        let outcome = load_catalog(&registry, catalog, true).unwrap();

        assert_eq!(outcome.registered, vec!["a", "b"]);
        assert_eq!(outcome.renames[0].to, "ATENDIMENTOS_AGRICULTURA_1");
        assert_eq!(outcome.moved_identity_fields, vec![("a".to_string(), "cpf".to_string())]);
        assert_eq!(registry.get("a").unwrap().citizen_fields, vec!["cpf"]);
    }

    #[test]
    fn test_load_without_remediation_fails() {
        let registry = registry();
        let catalog = ServiceCatalog::from_yaml(CATALOG).unwrap();
        let err = load_catalog(&registry, catalog, false).unwrap_err();
        // the identity field declaration is caught before the duplicate
        assert!(matches!(err, EngineError::InvalidDefinition(_)));
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn test_later_duplicate_registers_nothing() {
        let registry = registry();
        let mut catalog = ServiceCatalog::from_yaml(CATALOG).unwrap();
        strip_identity_fields(&mut catalog.services[0]);

        let err = load_catalog(&registry, catalog, false).unwrap_err();
        match err {
            EngineError::DuplicateModuleType {
                module_type,
                existing_service,
            } => {
                assert_eq!(module_type, "ATENDIMENTOS_AGRICULTURA");
                assert_eq!(existing_service, "a");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(registry.list().unwrap().is_empty());
        assert!(registry.find_by_module("ATENDIMENTOS_AGRICULTURA").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_of_registered_service_rejected() {
        let registry = registry();
        let mut first = ServiceCatalog::from_yaml(CATALOG).unwrap();
        let second = first.services.split_off(1);
        load_catalog(&registry, first, true).unwrap();

        let err = load_catalog(&registry, ServiceCatalog { version: None, services: second }, false).unwrap_err();
        assert_eq!(err.code(), "REGISTRY/DUPLICATE_MODULE_TYPE");
        assert_eq!(registry.list().unwrap().len(), 1);
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let err = ServiceCatalog::from_yaml("services: 3").unwrap_err();
        assert_eq!(err.code(), "CONFIG");
    }
}
