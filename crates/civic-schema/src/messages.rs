//! Validation message catalog
//!
//! Field errors carry a human-readable message for the citizen. Messages are
//! Handlebars templates keyed by rule (`required`, `minLength`, `enum`, ...)
//! and default to Portuguese. A YAML file can override any subset:
//!
//! ```yaml
//! version: "1.0"
//! locale: pt-BR
//! templates:
//!   required:
//!     description: Missing required field
//!     template: "Preencha o campo {{field}}"
//! ```

use handlebars::Handlebars;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use civic_core::ConfigError;

const DEFAULT_TEMPLATES: [(&str, &str); 12] = [
    ("required", "O campo '{{field}}' é obrigatório"),
    ("type", "O campo '{{field}}' deve ser do tipo {{expected}}"),
    ("format", "O campo '{{field}}' está em formato inválido (esperado: {{expected}})"),
    ("pattern", "O campo '{{field}}' não corresponde ao padrão esperado"),
    ("invalidPattern", "O padrão de validação do campo '{{field}}' é inválido"),
    ("minLength", "O campo '{{field}}' deve ter no mínimo {{limit}} caracteres"),
    ("maxLength", "O campo '{{field}}' deve ter no máximo {{limit}} caracteres"),
    ("minimum", "O campo '{{field}}' deve ser maior ou igual a {{limit}}"),
    ("maximum", "O campo '{{field}}' deve ser menor ou igual a {{limit}}"),
    ("enum", "O campo '{{field}}' deve ser um dos valores: {{allowed}}"),
    ("fileType", "O arquivo do campo '{{field}}' deve ser de um dos tipos: {{allowed}}"),
    ("fileSize", "O arquivo do campo '{{field}}' deve ter no máximo {{limit}} bytes"),
];

static DEFAULT_CATALOG: Lazy<MessageCatalog> = Lazy::new(MessageCatalog::new);

/// Messages file structure
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub templates: HashMap<String, MessageTemplate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageTemplate {
    #[serde(default)]
    pub description: Option<String>,
    pub template: String,
}

#[derive(Debug)]
pub struct MessageCatalog {
    registry: Handlebars<'static>,
    locale: String,
}

impl MessageCatalog {
    /// Catalog with the built-in Portuguese messages
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        for (key, template) in DEFAULT_TEMPLATES {
            if let Err(e) = registry.register_template_string(key, template) {
                tracing::error!(key, error = %e, "built-in validation message rejected");
            }
        }
        Self {
            registry,
            locale: "pt-BR".to_string(),
        }
    }

    /// Shared catalog with the built-in messages
    pub fn default_catalog() -> &'static MessageCatalog {
        &DEFAULT_CATALOG
    }

    /// Built-in messages overridden by a YAML messages file
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let file: MessagesFile = serde_yaml::from_str(yaml)
            .map_err(|e| ConfigError::Parse(format!("messages: {}", e)))?;
        let mut catalog = Self::new();
        if let Some(locale) = file.locale {
            catalog.locale = locale;
        }
        for (key, entry) in file.templates {
            catalog
                .registry
                .register_template_string(&key, &entry.template)
                .map_err(|e| ConfigError::Parse(format!("template '{}': {}", key, e)))?;
        }
        Ok(catalog)
    }

    /// Load a messages file from disk
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml(&content)
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Render the message for `key`. Unknown keys and render failures fall
    /// back to `"<key>: <field>"` so a message is always produced.
    pub fn render(&self, key: &str, args: &Value) -> String {
        match self.registry.render(key, args) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(key, error = %e, "validation message failed to render");
                let field = args.get("field").and_then(Value::as_str).unwrap_or("?");
                format!("{}: {}", key, field)
            }
        }
    }
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self::new()
    }
}
