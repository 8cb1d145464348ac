//! Protocols: submitted requests of data-collecting services

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    pub id: String,

    /// Number shown to the citizen, `PROT-YYYYMMDD-XXXXXXXX`
    pub number: String,

    pub service_id: String,
    pub citizen_id: String,

    /// Validated payload, identity and service values merged
    pub data: Map<String, Value>,

    #[serde(default)]
    pub module_type: Option<String>,

    #[serde(default)]
    pub sla_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Protocol {
    pub fn new(
        service_id: impl Into<String>,
        citizen_id: impl Into<String>,
        data: Map<String, Value>,
        module_type: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let id = civic_core::new_id();
        Self {
            number: protocol_number(&id, created_at),
            id,
            service_id: service_id.into(),
            citizen_id: citizen_id.into(),
            data,
            module_type,
            sla_id: None,
            created_at,
        }
    }
}

/// `PROT-<date>-<first 8 hex digits of the id>`
pub fn protocol_number(id: &str, created_at: DateTime<Utc>) -> String {
    let suffix: String = id
        .chars()
        .filter(char::is_ascii_hexdigit)
        .take(8)
        .collect::<String>()
        .to_uppercase();
    format!("PROT-{}-{}", created_at.format("%Y%m%d"), suffix)
}
