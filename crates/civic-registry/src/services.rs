//! Service Definition Registry
//!
//! Owns the service definitions and the module index that routes a
//! `moduleType` to the one active data-collecting service bound to it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use civic_core::{EngineError, EngineResult, Store};
use civic_schema::ServiceDefinition;

/// Service registry
pub struct ServiceRegistry {
    store: Arc<dyn Store<ServiceDefinition>>,
    /// moduleType -> id of the active data-collecting service
    modules: RwLock<HashMap<String, String>>,
}

impl ServiceRegistry {
    /// Open a registry over `store`, indexing what it already holds.
    ///
    /// Stored data that already violates module uniqueness is indexed to the
    /// oldest definition; run remediation to fix the rest.
    pub fn new(store: Arc<dyn Store<ServiceDefinition>>) -> EngineResult<Self> {
        let mut stored: Vec<ServiceDefinition> =
            store.list()?.into_iter().map(|row| row.value).collect();
        stored.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let mut modules: HashMap<String, String> = HashMap::new();
        for service in stored.iter().filter(|s| indexed(s)) {
            if let Some(module) = &service.module_type {
                if let Some(holder) = modules.get(module) {
                    tracing::warn!(
                        module = %module,
                        holder = %holder,
                        duplicate = %service.id,
                        "stored services share a module type"
                    );
                    continue;
                }
                modules.insert(module.clone(), service.id.clone());
            }
        }

        Ok(Self {
            store,
            modules: RwLock::new(modules),
        })
    }

    /// Register a new definition
    pub fn register(&self, service: ServiceDefinition) -> EngineResult<ServiceDefinition> {
        service.check()?;
        let mut modules = self.modules_mut();

        if indexed(&service) {
            if let Some(module) = &service.module_type {
                if let Some(holder) = modules.get(module) {
                    return Err(EngineError::DuplicateModuleType {
                        module_type: module.clone(),
                        existing_service: holder.clone(),
                    });
                }
            }
        }

        let stored = self.store.insert(&service.id, &service)?.value;
        if indexed(&stored) {
            if let Some(module) = &stored.module_type {
                modules.insert(module.clone(), stored.id.clone());
            }
        }
        tracing::info!(
            service = %stored.name,
            id = %stored.id,
            module = stored.module_type.as_deref().unwrap_or("-"),
            "service registered"
        );
        Ok(stored)
    }

    /// Replace a stored definition. Module uniqueness is checked against
    /// every other active service.
    pub fn update(&self, service: ServiceDefinition) -> EngineResult<ServiceDefinition> {
        service.check()?;
        let mut modules = self.modules_mut();

        let current = self
            .store
            .get(&service.id)?
            .ok_or_else(|| EngineError::not_found("service", &service.id))?;

        if indexed(&service) {
            if let Some(module) = &service.module_type {
                match modules.get(module) {
                    Some(holder) if holder != &service.id => {
                        return Err(EngineError::DuplicateModuleType {
                            module_type: module.clone(),
                            existing_service: holder.clone(),
                        })
                    }
                    _ => {}
                }
            }
        }

        let stored = self.store.update(&service.id, current.revision, &service)?.value;
        modules.retain(|_, holder| holder.as_str() != stored.id);
        if indexed(&stored) {
            if let Some(module) = &stored.module_type {
                modules.insert(module.clone(), stored.id.clone());
            }
        }
        tracing::info!(service = %stored.name, id = %stored.id, "service updated");
        Ok(stored)
    }

    /// Take a service out of circulation. Its module type becomes free.
    pub fn deactivate(&self, id: &str) -> EngineResult<ServiceDefinition> {
        let mut modules = self.modules_mut();
        let current = self
            .store
            .get(id)?
            .ok_or_else(|| EngineError::not_found("service", id))?;

        let mut service = current.value;
        if !service.is_active {
            return Ok(service);
        }
        service.is_active = false;
        let stored = self.store.update(id, current.revision, &service)?.value;
        modules.retain(|_, holder| holder.as_str() != id);
        tracing::info!(service = %stored.name, id = %stored.id, "service deactivated");
        Ok(stored)
    }

    pub fn get(&self, id: &str) -> EngineResult<ServiceDefinition> {
        self.store
            .get(id)?
            .map(|row| row.value)
            .ok_or_else(|| EngineError::not_found("service", id))
    }

    /// Look a service up by id, falling back to its exact name
    pub fn resolve(&self, key: &str) -> EngineResult<ServiceDefinition> {
        if let Some(row) = self.store.get(key)? {
            return Ok(row.value);
        }
        self.list()?
            .into_iter()
            .find(|s| s.name == key)
            .ok_or_else(|| EngineError::not_found("service", key))
    }

    /// The active data-collecting service bound to `module_type`
    pub fn find_by_module(&self, module_type: &str) -> EngineResult<Option<ServiceDefinition>> {
        let id = match self.modules().get(module_type) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        Ok(self.store.get(&id)?.map(|row| row.value))
    }

    /// Active services of a department, by priority (highest first) then name
    pub fn list_by_department(&self, department_code: &str) -> EngineResult<Vec<ServiceDefinition>> {
        let mut services: Vec<ServiceDefinition> = self
            .list()?
            .into_iter()
            .filter(|s| s.is_active && s.department_code == department_code)
            .collect();
        services.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        Ok(services)
    }

    /// Every stored service, active or not, ordered by id
    pub fn list(&self) -> EngineResult<Vec<ServiceDefinition>> {
        Ok(self.store.list()?.into_iter().map(|row| row.value).collect())
    }

    fn modules(&self) -> RwLockReadGuard<'_, HashMap<String, String>> {
        self.modules.read().unwrap_or_else(|e| e.into_inner())
    }

    fn modules_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, String>> {
        self.modules.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Whether a service takes part in module routing
pub(crate) fn indexed(service: &ServiceDefinition) -> bool {
    service.is_active && service.is_data_collecting()
}
