//! Unified Error Model
//!
//! Every failure the registries and the SLA engine can signal is a named
//! variant here, so callers branch on the variant (or on [`EngineError::code`])
//! instead of matching message text. Expected bad form input is *not* an
//! error of this kind: validation returns its batch of field errors as data.
use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("REGISTRY/DUPLICATE_MODULE_TYPE: module '{module_type}' is already bound to service {existing_service}")]
    DuplicateModuleType {
        module_type: String,
        existing_service: String,
    },

    #[error("REGISTRY/WORKFLOW_VERSION_CONFLICT: workflow {workflow_id}: {detail}")]
    WorkflowVersionConflict { workflow_id: String, detail: String },

    #[error("SLA/TERMINAL_STATE: cannot {operation} SLA {sla_id}, it is already completed")]
    TerminalStateViolation {
        sla_id: String,
        operation: &'static str,
    },

    #[error("SLA/INVALID_TRANSITION: {0}")]
    InvalidTransition(String),

    #[error("SLA/STAGE_FORBIDDEN: role '{role}' may not act on stage '{stage}'")]
    StageForbidden { role: String, stage: String },

    #[error("NOT_FOUND/{kind}: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("SCHEMA/INVALID_DEFINITION: {0}")]
    InvalidDefinition(String),

    #[error("STORE/CONFLICT: {id} still contended after {attempts} attempts")]
    Conflict { id: String, attempts: u32 },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound { kind, id: id.into() }
    }

    /// Stable machine-readable code for serializing the failure.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::DuplicateModuleType { .. } => "REGISTRY/DUPLICATE_MODULE_TYPE",
            EngineError::WorkflowVersionConflict { .. } => "REGISTRY/WORKFLOW_VERSION_CONFLICT",
            EngineError::TerminalStateViolation { .. } => "SLA/TERMINAL_STATE",
            EngineError::InvalidTransition(_) => "SLA/INVALID_TRANSITION",
            EngineError::StageForbidden { .. } => "SLA/STAGE_FORBIDDEN",
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::InvalidDefinition(_) => "SCHEMA/INVALID_DEFINITION",
            EngineError::Conflict { .. } => "STORE/CONFLICT",
            EngineError::Config(_) => "CONFIG",
            EngineError::Store(_) => "STORE",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let err = EngineError::TerminalStateViolation {
            sla_id: "sla-1".to_string(),
            operation: "pause",
        };
        assert_eq!(err.code(), "SLA/TERMINAL_STATE");
        assert!(err.to_string().contains("cannot pause SLA sla-1"));

        let err = EngineError::not_found("service", "abc");
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(err.to_string(), "NOT_FOUND/service: abc");
    }

    #[test]
    fn test_store_error_converts() {
        let err: EngineError = StoreError::NotFound("x".to_string()).into();
        assert!(matches!(err, EngineError::Store(StoreError::NotFound(_))));
        assert_eq!(err.code(), "STORE");
    }
}
