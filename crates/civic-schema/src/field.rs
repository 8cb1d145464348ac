//! Field schema model
//!
//! One form field of a service: its type, constraints and display hints.
//! Pure data; checking a value against a field lives in `validation`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of a form field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Short text
    #[serde(alias = "string", alias = "short_text")]
    Text,
    /// Long text
    #[serde(alias = "long_text")]
    Textarea,
    #[serde(alias = "integer")]
    Number,
    Email,
    #[serde(alias = "telefone")]
    Phone,
    /// National id (CPF)
    Cpf,
    /// Tax id (CNPJ)
    Cnpj,
    /// Postal code (CEP)
    Cep,
    Date,
    #[serde(alias = "datetime-local")]
    Datetime,
    Time,
    #[serde(alias = "checkbox", alias = "bool")]
    Boolean,
    /// Single select
    Select,
    /// Multi select
    #[serde(alias = "multi-select")]
    Multiselect,
    /// Single choice
    Radio,
    File,
    Image,
    #[serde(alias = "money")]
    Currency,
    Percentage,
    Url,
    Color,
    /// Foreign reference to a row of an auxiliary table
    #[serde(alias = "select-table", alias = "foreign-reference")]
    Reference,
}

impl FieldType {
    /// Types whose value must be a literal member of `config.options`
    pub fn is_choice(self) -> bool {
        matches!(self, FieldType::Select | FieldType::Radio | FieldType::Multiselect)
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            FieldType::Number | FieldType::Currency | FieldType::Percentage
        )
    }

    /// Types whose value is free or formatted text
    pub fn is_textual(self) -> bool {
        matches!(
            self,
            FieldType::Text
                | FieldType::Textarea
                | FieldType::Email
                | FieldType::Phone
                | FieldType::Cpf
                | FieldType::Cnpj
                | FieldType::Cep
                | FieldType::Url
                | FieldType::Color
        )
    }

    /// JSON type name used in messages and in exported JSON Schema
    pub fn json_type(self) -> &'static str {
        match self {
            FieldType::Number | FieldType::Currency | FieldType::Percentage => "number",
            FieldType::Boolean => "boolean",
            FieldType::Multiselect => "array",
            _ => "string",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FieldType::Text => "text",
            FieldType::Textarea => "textarea",
            FieldType::Number => "number",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Cpf => "cpf",
            FieldType::Cnpj => "cnpj",
            FieldType::Cep => "cep",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::Time => "time",
            FieldType::Boolean => "boolean",
            FieldType::Select => "select",
            FieldType::Multiselect => "multiselect",
            FieldType::Radio => "radio",
            FieldType::File => "file",
            FieldType::Image => "image",
            FieldType::Currency => "currency",
            FieldType::Percentage => "percentage",
            FieldType::Url => "url",
            FieldType::Color => "color",
            FieldType::Reference => "reference",
        };
        write!(f, "{}", name)
    }
}

/// Value constraints
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValidation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    /// Regex, searched anywhere in the value (JSON Schema semantics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl FieldValidation {
    pub fn is_empty(&self) -> bool {
        self == &FieldValidation::default()
    }
}

/// An allowed option of a choice field. Authored either as a bare string or
/// as `{ value, label }`; only `value` takes part in validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldOption {
    Plain(String),
    Labeled { value: String, label: String },
}

impl FieldOption {
    pub fn value(&self) -> &str {
        match self {
            FieldOption::Plain(value) => value,
            FieldOption::Labeled { value, .. } => value,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            FieldOption::Plain(value) => value,
            FieldOption::Labeled { label, .. } => label,
        }
    }
}

impl From<&str> for FieldOption {
    fn from(value: &str) -> Self {
        FieldOption::Plain(value.to_string())
    }
}

/// Type-specific configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    /// Options of select / multiselect / radio fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,

    /// Referenced entity of a foreign-reference field (e.g. "UnidadeSaude")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    /// Earliest accepted date, `YYYY-MM-DD`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_date: Option<String>,

    /// Latest accepted date, `YYYY-MM-DD`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_date: Option<String>,

    /// Accepted MIME types or extensions (".pdf", "image/*")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accept: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<u64>,
}

impl FieldConfig {
    pub fn is_empty(&self) -> bool {
        self == &FieldConfig::default()
    }

    pub fn has_option(&self, value: &str) -> bool {
        self.options.iter().any(|o| o.value() == value)
    }

    pub fn option_values(&self) -> Vec<&str> {
        self.options.iter().map(|o| o.value()).collect()
    }
}

/// Where and in which order the field is shown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldDisplay {
    pub show_in_list: bool,
    pub show_in_detail: bool,
    pub show_in_form: bool,
    pub order: u32,
}

impl Default for FieldDisplay {
    fn default() -> Self {
        Self {
            show_in_list: false,
            show_in_detail: true,
            show_in_form: true,
            order: 0,
        }
    }
}

impl FieldDisplay {
    fn is_default(&self) -> bool {
        self == &FieldDisplay::default()
    }
}

/// One form field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub name: String,

    pub label: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "FieldValidation::is_empty")]
    pub validation: FieldValidation,

    #[serde(default, skip_serializing_if = "FieldConfig::is_empty")]
    pub config: FieldConfig,

    #[serde(default, skip_serializing_if = "FieldDisplay::is_default")]
    pub display: FieldDisplay,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            field_type,
            required: false,
            validation: FieldValidation::default(),
            config: FieldConfig::default(),
            display: FieldDisplay::default(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.options = options
            .into_iter()
            .map(|o| FieldOption::Plain(o.into()))
            .collect();
        self
    }

    pub fn with_length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.validation.min_length = min;
        self.validation.max_length = max;
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.validation.min = min;
        self.validation.max = max;
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.validation.pattern = Some(pattern.into());
        self
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.display.order = order;
        self
    }
}
