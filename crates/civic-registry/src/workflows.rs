//! Workflow Definition Registry
//!
//! A workflow is the ordered list of stages a protocol of one module goes
//! through. Definitions are versioned per module and only one version is
//! active at a time. Stages of a stored version never change: a change of
//! stages is always a new version, which keeps the digest that running SLAs
//! captured at start meaningful.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

use civic_core::{EngineError, EngineResult, Store, StoreError, MAX_DEADLINE_DAYS};

/// One workflow stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub name: String,

    /// Days the stage is expected to take
    pub default_duration_days: u32,

    /// Staff roles that may advance the stage. Empty means any role.
    #[serde(default)]
    pub allowed_roles: Vec<String>,
}

impl Stage {
    pub fn new(name: impl Into<String>, default_duration_days: u32) -> Self {
        Self {
            name: name.into(),
            default_duration_days,
            allowed_roles: Vec::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn allows(&self, role: &str) -> bool {
        self.allowed_roles.is_empty() || self.allowed_roles.iter().any(|r| r == role)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    #[serde(default = "civic_core::new_id")]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Module type this workflow serves
    pub module: String,

    /// Starts at 1; assigned by the registry
    #[serde(default)]
    pub version: u32,

    pub stages: Vec<Stage>,

    #[serde(default)]
    pub is_active: bool,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Fingerprint of `stages`; assigned by the registry
    #[serde(default)]
    pub digest: String,
}

impl WorkflowDefinition {
    pub fn new(module: impl Into<String>, name: impl Into<String>, stages: Vec<Stage>) -> Self {
        let digest = stage_digest(&stages);
        Self {
            id: civic_core::new_id(),
            name: name.into(),
            description: String::new(),
            module: module.into(),
            version: 0,
            stages,
            is_active: false,
            created_at: Utc::now(),
            digest,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sum of the stage durations, saturating at `u32::MAX`
    pub fn total_days(&self) -> u32 {
        self.stages
            .iter()
            .fold(0u32, |total, s| total.saturating_add(s.default_duration_days))
    }

    pub fn stage(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    /// Whether `digest` still describes `stages`
    pub fn is_intact(&self) -> bool {
        self.digest == stage_digest(&self.stages)
    }

    fn check(&self) -> EngineResult<()> {
        let mut problems = Vec::new();
        if self.module.trim().is_empty() {
            problems.push("module is empty".to_string());
        }
        if self.stages.is_empty() {
            problems.push("workflow has no stages".to_string());
        }
        for (index, stage) in self.stages.iter().enumerate() {
            if stage.name.trim().is_empty() {
                problems.push(format!("stage #{} has no name", index));
            }
            if stage.default_duration_days > MAX_DEADLINE_DAYS {
                problems.push(format!(
                    "stage '{}' lasts {} days, more than {}",
                    stage.name, stage.default_duration_days, MAX_DEADLINE_DAYS
                ));
            }
        }
        if self.total_days() > MAX_DEADLINE_DAYS {
            problems.push(format!(
                "stages add up to {} days, more than {}",
                self.total_days(),
                MAX_DEADLINE_DAYS
            ));
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(EngineError::InvalidDefinition(format!(
                "workflow '{}': {}",
                self.name,
                problems.join("; ")
            )))
        }
    }
}

/// blake3 fingerprint of a stage list
pub fn stage_digest(stages: &[Stage]) -> String {
    let mut canonical = String::new();
    for stage in stages {
        canonical.push_str(&stage.name);
        canonical.push('\u{1f}');
        canonical.push_str(&stage.default_duration_days.to_string());
        canonical.push('\u{1f}');
        canonical.push_str(&stage.allowed_roles.join(","));
        canonical.push('\u{1e}');
    }
    format!("blake3:{}", blake3::hash(canonical.as_bytes()))
}

/// Workflow registry
pub struct WorkflowRegistry {
    store: Arc<dyn Store<WorkflowDefinition>>,
    /// Serializes version changes
    writer: Mutex<()>,
}

impl WorkflowRegistry {
    pub fn new(store: Arc<dyn Store<WorkflowDefinition>>) -> Self {
        Self {
            store,
            writer: Mutex::new(()),
        }
    }

    /// Store `definition` as the next version of its module and make it the
    /// active one.
    pub fn create(&self, definition: WorkflowDefinition) -> EngineResult<WorkflowDefinition> {
        definition.check()?;
        let _guard = self.write_lock();

        let history = self.list_by_module(&definition.module)?;
        let version = history.iter().map(|w| w.version).max().unwrap_or(0) + 1;
        for previous in history.iter().filter(|w| w.is_active) {
            self.set_active(&previous.id, false)?;
        }

        let mut definition = definition;
        definition.version = version;
        definition.is_active = true;
        definition.created_at = Utc::now();
        definition.digest = stage_digest(&definition.stages);

        let stored = self.store.insert(&definition.id, &definition)?.value;
        tracing::info!(
            module = %stored.module,
            version = stored.version,
            stages = stored.stages.len(),
            "workflow created"
        );
        Ok(stored)
    }

    pub fn find_active_by_module(&self, module: &str) -> EngineResult<Option<WorkflowDefinition>> {
        Ok(self
            .list_by_module(module)?
            .into_iter()
            .find(|w| w.is_active))
    }

    /// Copy the active version `id` into a new active version
    pub fn new_version(&self, id: &str) -> EngineResult<WorkflowDefinition> {
        let source = self.get(id)?;
        self.new_version_with_stages(id, source.stages)
    }

    /// New active version of the workflow `id` with different stages
    pub fn new_version_with_stages(&self, id: &str, stages: Vec<Stage>) -> EngineResult<WorkflowDefinition> {
        let _guard = self.write_lock();

        let source = self
            .store
            .get(id)?
            .ok_or_else(|| EngineError::not_found("workflow", id))?;
        let history = self.list_by_module(&source.value.module)?;
        let latest = history.iter().map(|w| w.version).max().unwrap_or(0);

        if !source.value.is_active || source.value.version != latest {
            return Err(EngineError::WorkflowVersionConflict {
                workflow_id: id.to_string(),
                detail: format!(
                    "version {} is not the active version of module {}",
                    source.value.version, source.value.module
                ),
            });
        }

        let mut next = WorkflowDefinition::new(source.value.module.clone(), source.value.name.clone(), stages)
            .with_description(source.value.description.clone());
        next.check()?;
        next.version = latest + 1;
        next.is_active = true;

        let mut retired = source.value.clone();
        retired.is_active = false;
        self.store
            .update(id, source.revision, &retired)
            .map_err(|e| version_conflict(id, e))?;
        let stored = self.store.insert(&next.id, &next)?.value;

        tracing::info!(
            module = %stored.module,
            from = source.value.version,
            to = stored.version,
            "workflow version bumped"
        );
        Ok(stored)
    }

    /// Store edits to name or description. Stages and version are fixed
    /// once stored.
    pub fn update(&self, definition: WorkflowDefinition) -> EngineResult<WorkflowDefinition> {
        let _guard = self.write_lock();
        let current = self
            .store
            .get(&definition.id)?
            .ok_or_else(|| EngineError::not_found("workflow", &definition.id))?;

        if definition.version != current.value.version
            || stage_digest(&definition.stages) != current.value.digest
        {
            return Err(EngineError::WorkflowVersionConflict {
                workflow_id: definition.id.clone(),
                detail: "stages of a stored version cannot change; create a new version".to_string(),
            });
        }

        let mut updated = current.value;
        updated.name = definition.name;
        updated.description = definition.description;
        Ok(self
            .store
            .update(&updated.id, current.revision, &updated)
            .map_err(|e| version_conflict(&updated.id, e))?
            .value)
    }

    pub fn get(&self, id: &str) -> EngineResult<WorkflowDefinition> {
        self.store
            .get(id)?
            .map(|row| row.value)
            .ok_or_else(|| EngineError::not_found("workflow", id))
    }

    /// Every version of a module, oldest first
    pub fn list_by_module(&self, module: &str) -> EngineResult<Vec<WorkflowDefinition>> {
        let mut versions: Vec<WorkflowDefinition> = self
            .store
            .list()?
            .into_iter()
            .map(|row| row.value)
            .filter(|w| w.module == module)
            .collect();
        versions.sort_by_key(|w| w.version);
        Ok(versions)
    }

    /// Active workflows of every module, by module
    pub fn list_active(&self) -> EngineResult<Vec<WorkflowDefinition>> {
        let mut active: Vec<WorkflowDefinition> = self
            .store
            .list()?
            .into_iter()
            .map(|row| row.value)
            .filter(|w| w.is_active)
            .collect();
        active.sort_by(|a, b| a.module.cmp(&b.module));
        Ok(active)
    }

    fn set_active(&self, id: &str, active: bool) -> EngineResult<()> {
        let row = self
            .store
            .get(id)?
            .ok_or_else(|| EngineError::not_found("workflow", id))?;
        let mut definition = row.value;
        definition.is_active = active;
        self.store
            .update(id, row.revision, &definition)
            .map_err(|e| version_conflict(id, e))?;
        Ok(())
    }

    fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn version_conflict(id: &str, error: StoreError) -> EngineError {
    if let StoreError::Conflict { .. } = &error {
        return EngineError::WorkflowVersionConflict {
            workflow_id: id.to_string(),
            detail: error.to_string(),
        };
    }
    EngineError::Store(error)
}

/// Module workflows the portal ships with
pub fn default_workflows() -> Vec<WorkflowDefinition> {
    vec![
        WorkflowDefinition::new(
            "ATENDIMENTOS_AGRICULTURA",
            "Atendimentos Agricultura",
            vec![
                Stage::new("Triagem", 2).with_roles(["ATENDENTE", "COORDENADOR"]),
                Stage::new("Atendimento Técnico", 6).with_roles(["TECNICO"]),
                Stage::new("Finalização", 2).with_roles(["COORDENADOR"]),
            ],
        )
        .with_description("Workflow para atendimentos gerais da agricultura"),
        WorkflowDefinition::new(
            "CADASTRO_PRODUTOR",
            "Cadastro de Produtor Rural",
            vec![
                Stage::new("Análise Documental", 3).with_roles(["ATENDENTE"]),
                Stage::new("Vistoria de Propriedade", 7).with_roles(["TECNICO"]),
                Stage::new("Análise Técnica", 5).with_roles(["TECNICO", "COORDENADOR"]),
            ],
        )
        .with_description("Workflow para cadastro de produtores rurais"),
        WorkflowDefinition::new(
            "ASSISTENCIA_TECNICA",
            "Assistência Técnica Rural",
            vec![
                Stage::new("Triagem Inicial", 2),
                Stage::new("Agendamento de Visita", 5).with_roles(["ATENDENTE"]),
                Stage::new("Atendimento Técnico", 3).with_roles(["TECNICO"]),
            ],
        )
        .with_description("Workflow para assistência técnica rural"),
        WorkflowDefinition::new(
            "ALERTA_SEGURANCA",
            "Alerta de Segurança",
            vec![
                Stage::new("Validação", 1).with_roles(["GUARDA", "COORDENADOR"]),
                Stage::new("Divulgação", 1).with_roles(["COORDENADOR"]),
                Stage::new("Monitoramento", 1),
            ],
        )
        .with_description("Workflow para alertas de segurança"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_core::MemoryStore;

    fn registry() -> WorkflowRegistry {
        WorkflowRegistry::new(Arc::new(MemoryStore::<WorkflowDefinition>::new()))
    }

    fn triage() -> WorkflowDefinition {
        WorkflowDefinition::new("M", "Triagem", vec![Stage::new("Triagem", 2), Stage::new("Execução", 5)])
    }

    #[test]
    fn test_create_assigns_version_and_digest() {
        let registry = registry();
        let created = registry.create(triage()).unwrap();
        assert_eq!(created.version, 1);
        assert!(created.is_active);
        assert!(created.digest.starts_with("blake3:"));
        assert!(created.is_intact());
        assert_eq!(created.total_days(), 7);
    }

    #[test]
    fn test_create_replaces_active() {
        let registry = registry();
        let first = registry.create(triage()).unwrap();
        let second = registry.create(triage()).unwrap();
        assert_eq!(second.version, 2);
        assert!(!registry.get(&first.id).unwrap().is_active);
        assert_eq!(registry.find_active_by_module("M").unwrap().unwrap().id, second.id);
    }

    #[test]
    fn test_new_version() {
        let registry = registry();
        let first = registry.create(triage()).unwrap();
        let next = registry.new_version(&first.id).unwrap();
        assert_eq!(next.version, 2);
        assert_eq!(next.digest, first.digest);
        assert!(!registry.get(&first.id).unwrap().is_active);

        let err = registry.new_version(&first.id).unwrap_err();
        assert!(matches!(err, EngineError::WorkflowVersionConflict { .. }));
    }

    #[test]
    fn test_new_version_with_stages_changes_digest() {
        let registry = registry();
        let first = registry.create(triage()).unwrap();
        let next = registry
            .new_version_with_stages(&first.id, vec![Stage::new("Triagem", 1)])
            .unwrap();
        assert_ne!(next.digest, first.digest);
        assert_eq!(registry.list_by_module("M").unwrap().len(), 2);
    }

    #[test]
    fn test_stage_edits_rejected() {
        let registry = registry();
        let mut created = registry.create(triage()).unwrap();
        created.stages[0].default_duration_days = 10;
        let err = registry.update(created.clone()).unwrap_err();
        assert_eq!(err.code(), "REGISTRY/WORKFLOW_VERSION_CONFLICT");

        created.stages[0].default_duration_days = 2;
        created.name = "Triagem rápida".to_string();
        assert_eq!(registry.update(created).unwrap().name, "Triagem rápida");
    }

    #[test]
    fn test_empty_workflow_rejected() {
        let registry = registry();
        let err = registry.create(WorkflowDefinition::new("M", "Vazio", vec![])).unwrap_err();
        assert!(matches!(err, EngineError::InvalidDefinition(_)));
    }

    #[test]
    fn test_oversized_durations_rejected() {
        let registry = registry();
        let huge = WorkflowDefinition::new("M", "Eterno", vec![Stage::new("Espera", u32::MAX)]);
        let err = registry.create(huge).unwrap_err();
        assert!(err.to_string().contains("more than 3650"));

        let stages = vec![Stage::new("A", 3000), Stage::new("B", 3000), Stage::new("C", u32::MAX)];
        let summed = WorkflowDefinition::new("M", "Longo", stages);
        assert_eq!(summed.total_days(), u32::MAX);
        assert!(matches!(registry.create(summed).unwrap_err(), EngineError::InvalidDefinition(_)));
        assert!(registry.list_by_module("M").unwrap().is_empty());
    }

    #[test]
    fn test_stage_roles() {
        let stage = Stage::new("Vistoria", 7).with_roles(["TECNICO"]);
        assert!(stage.allows("TECNICO"));
        assert!(!stage.allows("ATENDENTE"));
        assert!(Stage::new("Livre", 1).allows("QUALQUER"));
    }

    #[test]
    fn test_default_workflows() {
        let defaults = default_workflows();
        assert_eq!(defaults.len(), 4);
        let agro = &defaults[0];
        assert_eq!(agro.module, "ATENDIMENTOS_AGRICULTURA");
        assert_eq!(agro.total_days(), 10);
        assert!(defaults.iter().all(|w| w.is_intact()));
    }
}
