//! Module Handler: one submission path for every service
//!
//! ```text
//! payload ─▶ resolve service ─▶ validate ─┬─ INFORMATIONAL ─▶ validated data
//!                                         └─ DATA_COLLECTING
//!                                              ─▶ active workflow of moduleType
//!                                              ─▶ identity from profile
//!                                              ─▶ Protocol + SLA
//! ```
//!
//! Modules differ only by their service definition and workflow; there is
//! no per-module code.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use civic_core::{EngineError, RequestContext, Store};
use civic_registry::{ServiceRegistry, WorkflowRegistry};
use civic_schema::{is_identity_field, MessageCatalog, ServiceKind, ValidationError, Validator};

use crate::engine::SlaEngine;
use crate::protocol::Protocol;
use crate::sla::ProtocolSla;

#[derive(Error, Debug)]
pub enum SubmitError {
    /// The complete batch of validation errors
    #[error("SUBMIT/INVALID: {} validation error(s)", .0.len())]
    Invalid(Vec<ValidationError>),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl SubmitError {
    pub fn code(&self) -> &'static str {
        match self {
            SubmitError::Invalid(_) => "SUBMIT/INVALID",
            SubmitError::Engine(e) => e.code(),
        }
    }
}

/// Source of citizen identity values (name, CPF, address...) for a
/// citizen id. The engine never invents them.
pub trait IdentityProvider: Send + Sync {
    fn identity(&self, citizen_id: &str) -> Result<Map<String, Value>, EngineError>;
}

/// Fixed profiles, for tests and the CLI
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    profiles: HashMap<String, Map<String, Value>>,
}

impl StaticIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, citizen_id: impl Into<String>, profile: Value) -> Self {
        if let Value::Object(map) = profile {
            self.profiles.insert(citizen_id.into(), map);
        }
        self
    }
}

impl IdentityProvider for StaticIdentity {
    fn identity(&self, citizen_id: &str) -> Result<Map<String, Value>, EngineError> {
        self.profiles
            .get(citizen_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("citizen", citizen_id))
    }
}

/// Result of a successful submission
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Consultation service: nothing was recorded
    Informational {
        service_id: String,
        data: Map<String, Value>,
    },
    Protocol {
        protocol: Protocol,
        sla: ProtocolSla,
    },
}

pub struct ModuleHandler {
    services: Arc<ServiceRegistry>,
    workflows: Arc<WorkflowRegistry>,
    engine: Arc<SlaEngine>,
    protocols: Arc<dyn Store<Protocol>>,
    messages: Option<MessageCatalog>,
}

impl ModuleHandler {
    pub fn new(
        services: Arc<ServiceRegistry>,
        workflows: Arc<WorkflowRegistry>,
        engine: Arc<SlaEngine>,
        protocols: Arc<dyn Store<Protocol>>,
    ) -> Self {
        Self {
            services,
            workflows,
            engine,
            protocols,
            messages: None,
        }
    }

    /// Render validation messages from `catalog` instead of the built-in one
    pub fn with_messages(mut self, catalog: MessageCatalog) -> Self {
        self.messages = Some(catalog);
        self
    }

    /// Validate `payload` against the service `service_key` (id or name) and,
    /// for data-collecting services, open a protocol with its SLA.
    pub fn submit(
        &self,
        service_key: &str,
        citizen_id: &str,
        payload: &Value,
        identity: &dyn IdentityProvider,
        ctx: &RequestContext,
    ) -> Result<Submission, SubmitError> {
        let service = self.services.resolve(service_key)?;
        if !service.is_active {
            return Err(EngineError::not_found("service", service_key).into());
        }

        let catalog = self
            .messages
            .as_ref()
            .unwrap_or_else(|| MessageCatalog::default_catalog());
        let validated = Validator::new(catalog)
            .validate(&service, payload)
            .map_err(|errors| {
                tracing::debug!(service = %service.name, errors = errors.len(), "submission rejected");
                SubmitError::Invalid(errors)
            })?;

        if service.service_kind == ServiceKind::Informational {
            return Ok(Submission::Informational {
                service_id: service.id,
                data: validated.merged(),
            });
        }

        let module = service.module_type.clone().ok_or_else(|| {
            EngineError::InvalidDefinition(format!("service '{}' has no module type", service.name))
        })?;
        let workflow = self
            .workflows
            .find_active_by_module(&module)?
            .ok_or_else(|| EngineError::not_found("workflow", module.as_str()))?;

        let mut data = validated.merged();
        let profile = identity.identity(citizen_id)?;
        data.extend(profile.into_iter().filter(|(key, _)| is_identity_field(key)));

        // The protocol is stored first; a protocol without `slaId` is one
        // whose SLA never started, never the other way round.
        let mut protocol = Protocol::new(&service.id, citizen_id, data, Some(module), self.engine.now());
        let stored = self
            .protocols
            .insert(&protocol.id, &protocol)
            .map_err(EngineError::from)?;
        let sla = self.engine.start(&protocol, &service, &workflow, ctx)?;
        protocol.sla_id = Some(sla.id.clone());
        self.protocols
            .update(&protocol.id, stored.revision, &protocol)
            .map_err(EngineError::from)?;

        tracing::info!(
            protocol = %protocol.number,
            service = %service.name,
            module = protocol.module_type.as_deref().unwrap_or_default(),
            sla_id = %sla.id,
            "protocol opened"
        );
        Ok(Submission::Protocol { protocol, sla })
    }

    pub fn protocol(&self, id: &str) -> Result<Protocol, EngineError> {
        self.protocols
            .get(id)?
            .map(|row| row.value)
            .ok_or_else(|| EngineError::not_found("protocol", id))
    }

    pub fn protocols(&self) -> Result<Vec<Protocol>, EngineError> {
        Ok(self.protocols.list()?.into_iter().map(|row| row.value).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use civic_core::{EngineConfig, ManualClock, MemoryStore, StoreError, Versioned};
    use civic_registry::{Stage, WorkflowDefinition};
    use civic_schema::{FieldSchema, FieldType, ServiceDefinition, ValidationErrorKind};
    use serde_json::json;

    fn handler() -> ModuleHandler {
        handler_with(Arc::new(MemoryStore::<Protocol>::new()))
    }

    fn handler_with(protocols: Arc<dyn Store<Protocol>>) -> ModuleHandler {
        let services = Arc::new(
            ServiceRegistry::new(Arc::new(MemoryStore::<ServiceDefinition>::new())).unwrap(),
        );
        let workflows = Arc::new(WorkflowRegistry::new(Arc::new(
            MemoryStore::<WorkflowDefinition>::new(),
        )));
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()));
        let engine = Arc::new(SlaEngine::new(
            Arc::new(MemoryStore::<ProtocolSla>::new()),
            workflows.clone(),
            clock,
            EngineConfig::default(),
        ));

        let mut denuncia = ServiceDefinition::new(
            "Denúncia",
            "MEIO_AMBIENTE",
            ServiceKind::DataCollecting,
            Some("DENUNCIA_AMBIENTAL"),
        )
        .with_field(FieldSchema::new("local", "Local", FieldType::Text))
        .with_required(["nome", "local"]);
        denuncia.id = "svc-denuncia".to_string();
        services.register(denuncia).unwrap();

        let mut orfao = ServiceDefinition::new("Sem fluxo", "MEIO_AMBIENTE", ServiceKind::DataCollecting, Some("SEM_FLUXO"));
        orfao.id = "svc-orfao".to_string();
        services.register(orfao).unwrap();

        workflows
            .create(WorkflowDefinition::new(
                "DENUNCIA_AMBIENTAL",
                "Denúncia",
                vec![Stage::new("Triagem", 2), Stage::new("Fiscalização", 5)],
            ))
            .unwrap();

        ModuleHandler::new(services, workflows, engine, protocols)
    }

    /// A protocol store that is down
    struct Unavailable;

    impl Store<Protocol> for Unavailable {
        fn insert(&self, _: &str, _: &Protocol) -> Result<Versioned<Protocol>, StoreError> {
            Err(StoreError::Unavailable("protocols offline".to_string()))
        }

        fn get(&self, _: &str) -> Result<Option<Versioned<Protocol>>, StoreError> {
            Ok(None)
        }

        fn list(&self) -> Result<Vec<Versioned<Protocol>>, StoreError> {
            Ok(Vec::new())
        }

        fn update(&self, id: &str, _: u64, _: &Protocol) -> Result<Versioned<Protocol>, StoreError> {
            Err(StoreError::NotFound(id.to_string()))
        }
    }

    fn profiles() -> StaticIdentity {
        StaticIdentity::new().with_profile("cit-1", json!({ "nome": "Maria Souza", "cpf": "123", "apelido": "x" }))
    }

    #[test]
    fn test_submit_opens_protocol() {
        let handler = handler();
        let submission = handler
            .submit("svc-denuncia", "cit-1", &json!({ "local": "Rio", "nome": "Outro" }), &profiles(), &RequestContext::new("cit-1", "CIDADAO"))
            .unwrap();

        let (protocol, sla) = match submission {
            Submission::Protocol { protocol, sla } => (protocol, sla),
            other => panic!("expected a protocol, got {:?}", other),
        };
        assert_eq!(protocol.data["nome"], json!("Maria Souza"));
        assert_eq!(protocol.data["local"], json!("Rio"));
        assert!(!protocol.data.contains_key("apelido"));
        assert_eq!(protocol.sla_id.as_deref(), Some(sla.id.as_str()));
        assert_eq!((sla.due_date - sla.start_date).num_days(), 7);
        assert_eq!(handler.protocol(&protocol.id).unwrap(), protocol);
    }

    #[test]
    fn test_invalid_payload_creates_nothing() {
        let handler = handler();
        let err = handler
            .submit("Denúncia", "cit-1", &json!({}), &profiles(), &RequestContext::system())
            .unwrap_err();
        match err {
            SubmitError::Invalid(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "local");
                assert_eq!(errors[0].kind, ValidationErrorKind::MissingRequired);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(handler.protocols().unwrap().is_empty());
    }

    #[test]
    fn test_missing_workflow_creates_nothing() {
        let handler = handler();
        let err = handler
            .submit("svc-orfao", "cit-1", &json!({}), &profiles(), &RequestContext::system())
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(handler.protocols().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_citizen() {
        let handler = handler();
        let err = handler
            .submit("svc-denuncia", "ghost", &json!({ "local": "Rio" }), &profiles(), &RequestContext::system())
            .unwrap_err();
        assert!(matches!(err, SubmitError::Engine(EngineError::NotFound { kind: "citizen", .. })));
    }

    #[test]
    fn test_protocol_store_failure_starts_no_sla() {
        let handler = handler_with(Arc::new(Unavailable));
        let err = handler
            .submit("svc-denuncia", "cit-1", &json!({ "local": "Rio" }), &profiles(), &RequestContext::system())
            .unwrap_err();
        assert_eq!(err.code(), "STORE");
        assert!(handler.engine.list().unwrap().is_empty());
    }

    #[test]
    fn test_stored_protocol_links_its_sla() {
        let handler = handler();
        handler
            .submit("svc-denuncia", "cit-1", &json!({ "local": "Rio" }), &profiles(), &RequestContext::system())
            .unwrap();
        let stored = handler.protocols().unwrap();
        assert_eq!(stored.len(), 1);
        let sla = handler.engine.find_by_protocol(&stored[0].id).unwrap().unwrap();
        assert_eq!(stored[0].sla_id.as_deref(), Some(sla.id.as_str()));
    }
}
