//! Citizen identity fields
//!
//! Names of the profile attributes a protocol inherits from the citizen's
//! own account. They are filled in from the profile, so a service form never
//! validates them, even when its `required` list mentions them.

use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Reserved field names, process-wide and fixed.
pub const CITIZEN_IDENTITY_FIELDS: [&str; 18] = [
    "nome",
    "cpf",
    "rg",
    "dataNascimento",
    "email",
    "telefone",
    "telefoneSecundario",
    "cep",
    "logradouro",
    "numero",
    "complemento",
    "bairro",
    "cidade",
    "uf",
    "nomeMae",
    "estadoCivil",
    "profissao",
    "rendaFamiliar",
];

static IDENTITY_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| CITIZEN_IDENTITY_FIELDS.iter().copied().collect());

pub fn is_identity_field(name: &str) -> bool {
    IDENTITY_SET.contains(name)
}

/// A payload split into what comes from the citizen profile and what the
/// service form itself collects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionedPayload {
    pub identity: Map<String, Value>,
    pub service: Map<String, Value>,
}

/// Move every identity key of `payload` into `identity`; the rest goes to
/// `service`. Keys are compared exactly.
pub fn partition(payload: &Map<String, Value>) -> PartitionedPayload {
    let mut parts = PartitionedPayload::default();
    for (key, value) in payload {
        if is_identity_field(key) {
            parts.identity.insert(key.clone(), value.clone());
        } else {
            parts.service.insert(key.clone(), value.clone());
        }
    }
    parts
}
