//! Service definitions
//!
//! The declarative description of one public service: who owns it, whether
//! it collects data (and therefore opens a protocol), and its form.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use civic_core::{EngineError, EngineResult, MAX_DEADLINE_DAYS};

use crate::field::FieldSchema;
use crate::identity::is_identity_field;

/// Whether a service opens a protocol when submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceKind {
    /// Captures data routed to a processing module
    #[serde(alias = "COM_DADOS")]
    DataCollecting,
    /// Consultation only; nothing is tracked
    #[serde(alias = "INFORMATIVO", alias = "SEM_DADOS")]
    Informational,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ServiceKind::DataCollecting => write!(f, "DATA_COLLECTING"),
            ServiceKind::Informational => write!(f, "INFORMATIONAL"),
        }
    }
}

/// How the SLA due date of a protocol is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeadlinePolicy {
    /// Sum of the workflow's stage durations
    #[default]
    StageDurations,
    /// `estimatedDays` of the service, when set
    EstimatedDays,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    #[serde(default = "civic_core::new_id")]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    pub department_code: String,

    #[serde(alias = "serviceType")]
    pub service_kind: ServiceKind,

    /// Routing key of the processing module; `None` only for informational
    /// services
    #[serde(default)]
    pub module_type: Option<String>,

    #[serde(default)]
    pub requires_documents: bool,

    #[serde(default)]
    pub required_documents: Vec<String>,

    #[serde(default)]
    pub estimated_days: Option<u32>,

    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub fields: Vec<FieldSchema>,

    /// Required field names. May mention identity fields for documentation;
    /// those are never enforced.
    #[serde(default)]
    pub required: Vec<String>,

    /// Identity fields shown pre-filled on the form
    #[serde(default)]
    pub citizen_fields: Vec<String>,

    #[serde(default)]
    pub deadline_policy: DeadlinePolicy,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl ServiceDefinition {
    pub fn new(
        name: impl Into<String>,
        department_code: impl Into<String>,
        service_kind: ServiceKind,
        module_type: Option<&str>,
    ) -> Self {
        Self {
            id: civic_core::new_id(),
            name: name.into(),
            description: String::new(),
            department_code: department_code.into(),
            service_kind,
            module_type: module_type.map(str::to_string),
            requires_documents: false,
            required_documents: Vec::new(),
            estimated_days: None,
            priority: 0,
            fields: Vec::new(),
            required: Vec::new(),
            citizen_fields: Vec::new(),
            deadline_policy: DeadlinePolicy::default(),
            created_at: Utc::now(),
            is_active: true,
        }
    }

    pub fn with_field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_data_collecting(&self) -> bool {
        self.service_kind == ServiceKind::DataCollecting
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names enforced as required: the `required` list followed by fields
    /// flagged `required`, without identity fields and without repeats.
    pub fn effective_required(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.required
            .iter()
            .map(String::as_str)
            .chain(
                self.fields
                    .iter()
                    .filter(|f| f.required)
                    .map(|f| f.name.as_str()),
            )
            .filter(|name| !is_identity_field(name))
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Check the authoring invariants. All problems are reported together.
    pub fn check(&self) -> EngineResult<()> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("name is empty".to_string());
        }

        match (self.service_kind, self.module_type.as_deref()) {
            (ServiceKind::Informational, Some(module)) => problems.push(format!(
                "informational service cannot carry moduleType '{}'",
                module
            )),
            (ServiceKind::DataCollecting, None) => {
                problems.push("data-collecting service needs a moduleType".to_string())
            }
            (ServiceKind::DataCollecting, Some(module)) if module.trim().is_empty() => {
                problems.push("data-collecting service needs a moduleType".to_string())
            }
            _ => {}
        }

        if let Some(days) = self.estimated_days {
            if days > MAX_DEADLINE_DAYS {
                problems.push(format!(
                    "estimatedDays {} exceeds {} days",
                    days, MAX_DEADLINE_DAYS
                ));
            }
        }

        let mut names = HashSet::new();
        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                problems.push(format!("field '{}' is declared twice", field.name));
            }
            if is_identity_field(&field.name) {
                problems.push(format!(
                    "field '{}' collides with a citizen identity field",
                    field.name
                ));
            }
            problems.extend(check_field(field));
        }

        for name in &self.required {
            if !names.contains(name.as_str()) && !is_identity_field(name) {
                problems.push(format!("required name '{}' is not a declared field", name));
            }
        }

        for name in &self.citizen_fields {
            if !is_identity_field(name) {
                problems.push(format!("citizen field '{}' is not an identity field", name));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(EngineError::InvalidDefinition(format!(
                "service '{}': {}",
                self.name,
                problems.join("; ")
            )))
        }
    }
}

fn check_field(field: &FieldSchema) -> Vec<String> {
    let mut problems = Vec::new();
    let v = &field.validation;

    if let (Some(min), Some(max)) = (v.min, v.max) {
        if min > max {
            problems.push(format!("field '{}': min {} exceeds max {}", field.name, min, max));
        }
    }
    if let (Some(min), Some(max)) = (v.min_length, v.max_length) {
        if min > max {
            problems.push(format!(
                "field '{}': minLength {} exceeds maxLength {}",
                field.name, min, max
            ));
        }
    }
    if let Some(pattern) = &v.pattern {
        if let Err(e) = Regex::new(pattern) {
            problems.push(format!("field '{}': invalid pattern: {}", field.name, e));
        }
    }
    for bound in [&field.config.min_date, &field.config.max_date]
        .into_iter()
        .flatten()
    {
        if chrono::NaiveDate::parse_from_str(bound, "%Y-%m-%d").is_err() {
            problems.push(format!("field '{}': date bound '{}' is not YYYY-MM-DD", field.name, bound));
        }
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;
    use serde_json::json;

    fn alert_service() -> ServiceDefinition {
        ServiceDefinition::new(
            "Alerta de Segurança",
            "SEGURANCA_PUBLICA",
            ServiceKind::DataCollecting,
            Some("ALERTA_SEGURANCA"),
        )
        .with_field(FieldSchema::new("tipoAlerta", "Tipo", FieldType::Select).with_options(["Situação de Risco"]))
        .with_field(FieldSchema::new("descricaoAlerta", "Descrição", FieldType::Textarea).required())
        .with_required(["nome", "cpf", "tipoAlerta"])
    }

    #[test]
    fn test_effective_required_skips_identity() {
        let service = alert_service();
        assert_eq!(service.effective_required(), vec!["tipoAlerta", "descricaoAlerta"]);
    }

    #[test]
    fn test_check_accepts_identity_in_required() {
        assert!(alert_service().check().is_ok());
    }

    #[test]
    fn test_check_rejects_identity_field_declaration() {
        let service = alert_service().with_field(FieldSchema::new("cpf", "CPF", FieldType::Cpf));
        let err = service.check().unwrap_err();
        assert!(err.to_string().contains("collides with a citizen identity field"));
    }

    #[test]
    fn test_check_module_type_rules() {
        let info = ServiceDefinition::new("Estatísticas", "SEGURANCA_PUBLICA", ServiceKind::Informational, Some("X"));
        assert!(info.check().is_err());

        let data = ServiceDefinition::new("Cadastro", "AGRICULTURA", ServiceKind::DataCollecting, None);
        assert!(data.check().is_err());
    }

    #[test]
    fn test_check_reports_all_problems() {
        let service = alert_service()
            .with_field(FieldSchema::new("tipoAlerta", "Dup", FieldType::Text))
            .with_field(FieldSchema::new("qtd", "Qtd", FieldType::Number).with_range(Some(10.0), Some(1.0)))
            .with_required(["inexistente"]);
        let message = service.check().unwrap_err().to_string();
        assert!(message.contains("declared twice"));
        assert!(message.contains("min 10 exceeds max 1"));
        assert!(message.contains("'inexistente'"));
    }

    #[test]
    fn test_check_bounds_estimated_days() {
        let mut service = alert_service();
        service.estimated_days = Some(MAX_DEADLINE_DAYS);
        assert!(service.check().is_ok());

        service.estimated_days = Some(u32::MAX);
        let message = service.check().unwrap_err().to_string();
        assert!(message.contains("estimatedDays 4294967295 exceeds 3650 days"));
    }

    #[test]
    fn test_legacy_kind_names() {
        let service: ServiceDefinition = serde_json::from_value(json!({
            "name": "Estatísticas de Segurança",
            "departmentCode": "SEGURANCA_PUBLICA",
            "serviceType": "SEM_DADOS",
            "moduleType": null
        }))
        .unwrap();
        assert_eq!(service.service_kind, ServiceKind::Informational);
        assert!(service.is_active);
        assert_eq!(service.deadline_policy, DeadlinePolicy::StageDurations);
    }
}
