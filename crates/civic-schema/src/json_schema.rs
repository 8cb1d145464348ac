//! JSON Schema import and export
//!
//! Form builders and older catalogs describe forms either as a JSON Schema
//! object or as a flat list of legacy field records. Both are converted to
//! [`FieldSchema`] lists here; properties naming a citizen identity field
//! never become form fields and are listed as `citizenFields` instead.

use serde_json::{json, Map, Value};

use civic_core::{EngineError, EngineResult};

use crate::field::{FieldOption, FieldSchema, FieldType};
use crate::identity::is_identity_field;
use crate::service::ServiceDefinition;

/// Extension keyword carrying the exact field type across a round trip
const FIELD_TYPE_KEY: &str = "x-fieldType";
const ORDER_KEY: &str = "x-order";

/// Form part of a service, as read from an external description
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedForm {
    pub fields: Vec<FieldSchema>,
    pub required: Vec<String>,
    pub citizen_fields: Vec<String>,
}

impl ImportedForm {
    /// Replace the form of `service` with this one
    pub fn apply(self, mut service: ServiceDefinition) -> ServiceDefinition {
        service.fields = self.fields;
        service.required = self.required;
        service.citizen_fields = self.citizen_fields;
        service
    }
}

/// Export the service form as a JSON Schema object. Identity fields are not
/// part of the schema; only enforced required names are listed.
pub fn to_json_schema(service: &ServiceDefinition) -> Value {
    let mut properties = Map::new();
    for (index, field) in service.fields.iter().enumerate() {
        properties.insert(field.name.clone(), field_to_property(field, index));
    }
    json!({
        "type": "object",
        "title": service.name,
        "properties": properties,
        "required": service.effective_required(),
        "additionalProperties": true,
    })
}

fn field_to_property(field: &FieldSchema, index: usize) -> Value {
    let mut prop = Map::new();
    prop.insert("type".into(), json!(field.field_type.json_type()));
    prop.insert("title".into(), json!(field.label));
    prop.insert(FIELD_TYPE_KEY.into(), json!(field.field_type.to_string()));
    prop.insert(ORDER_KEY.into(), json!(if field.display.order > 0 { field.display.order as usize } else { index }));

    let format = match field.field_type {
        FieldType::Email => Some("email"),
        FieldType::Date => Some("date"),
        FieldType::Datetime => Some("date-time"),
        FieldType::Time => Some("time"),
        FieldType::Url => Some("uri"),
        _ => None,
    };
    if let Some(format) = format {
        prop.insert("format".into(), json!(format));
    }

    let options = field.config.option_values();
    if !options.is_empty() {
        if field.field_type == FieldType::Multiselect {
            prop.insert("items".into(), json!({ "type": "string", "enum": options }));
        } else {
            prop.insert("enum".into(), json!(options));
        }
    }

    let v = &field.validation;
    if let Some(min) = v.min {
        prop.insert("minimum".into(), json!(min));
    }
    if let Some(max) = v.max {
        prop.insert("maximum".into(), json!(max));
    }
    if let Some(min) = v.min_length {
        prop.insert("minLength".into(), json!(min));
    }
    if let Some(max) = v.max_length {
        prop.insert("maxLength".into(), json!(max));
    }
    if let Some(pattern) = &v.pattern {
        prop.insert("pattern".into(), json!(pattern));
    }
    Value::Object(prop)
}

/// Read a JSON Schema object (`type: object` with `properties`)
pub fn from_json_schema(schema: &Value) -> EngineResult<ImportedForm> {
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| EngineError::InvalidDefinition("schema has no 'properties' object".into()))?;

    let required: Vec<String> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    let mut form = ImportedForm::default();
    let mut entries: Vec<(u64, &String, &Value)> = properties
        .iter()
        .map(|(name, prop)| (prop.get(ORDER_KEY).and_then(Value::as_u64).unwrap_or(u64::MAX), name, prop))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    for (_, name, prop) in entries {
        if is_identity_field(name) {
            form.citizen_fields.push(name.clone());
            continue;
        }
        let mut field = property_to_field(name, prop)?;
        field.required = required.iter().any(|r| r == name);
        form.fields.push(field);
    }
    form.required = required;
    Ok(form)
}

fn property_to_field(name: &str, prop: &Value) -> EngineResult<FieldSchema> {
    let prop = prop
        .as_object()
        .ok_or_else(|| EngineError::InvalidDefinition(format!("property '{}' is not an object", name)))?;

    let label = prop.get("title").and_then(Value::as_str).unwrap_or(name);
    let field_type = match prop.get(FIELD_TYPE_KEY) {
        Some(t) => serde_json::from_value(t.clone()).map_err(|e| {
            EngineError::InvalidDefinition(format!("property '{}': {}", name, e))
        })?,
        None => infer_field_type(prop),
    };

    let mut field = FieldSchema::new(name, label, field_type);
    if let Some(order) = prop.get(ORDER_KEY).and_then(Value::as_u64) {
        field.display.order = order as u32;
    }
    field.validation.min = prop.get("minimum").and_then(Value::as_f64);
    field.validation.max = prop.get("maximum").and_then(Value::as_f64);
    field.validation.min_length = prop.get("minLength").and_then(Value::as_u64).map(|n| n as usize);
    field.validation.max_length = prop.get("maxLength").and_then(Value::as_u64).map(|n| n as usize);
    field.validation.pattern = prop.get("pattern").and_then(Value::as_str).map(str::to_string);

    let options = prop
        .get("enum")
        .or_else(|| prop.get("items").and_then(|items| items.get("enum")))
        .and_then(Value::as_array);
    if let Some(options) = options {
        field.config.options = options.iter().filter_map(option_from_value).collect();
    }
    Ok(field)
}

fn infer_field_type(prop: &Map<String, Value>) -> FieldType {
    let json_type = prop.get("type").and_then(Value::as_str).unwrap_or("string");
    let format = prop.get("format").and_then(Value::as_str);
    match (json_type, format) {
        ("number", _) | ("integer", _) => FieldType::Number,
        ("boolean", _) => FieldType::Boolean,
        ("array", _) => FieldType::Multiselect,
        (_, Some("email")) => FieldType::Email,
        (_, Some("date")) => FieldType::Date,
        (_, Some("date-time")) => FieldType::Datetime,
        (_, Some("time")) => FieldType::Time,
        (_, Some("uri")) | (_, Some("url")) => FieldType::Url,
        _ if prop.contains_key("enum") => FieldType::Select,
        _ => FieldType::Text,
    }
}

fn option_from_value(value: &Value) -> Option<FieldOption> {
    match value {
        Value::String(s) => Some(FieldOption::Plain(s.clone())),
        Value::Object(o) => {
            let value = o.get("value").and_then(Value::as_str)?;
            let label = o.get("label").and_then(Value::as_str).unwrap_or(value);
            Some(FieldOption::Labeled {
                value: value.to_string(),
                label: label.to_string(),
            })
        }
        Value::Number(n) => Some(FieldOption::Plain(n.to_string())),
        _ => None,
    }
}

/// Read a legacy field list: `[{ id, label, type, required, options,
/// category }]`. Records marked `category: citizen` or named after an
/// identity field become citizen fields. Unknown types fall back to text.
pub fn from_legacy_fields(fields: &[Value]) -> EngineResult<ImportedForm> {
    let mut form = ImportedForm::default();
    for (index, record) in fields.iter().enumerate() {
        let id = record
            .get("id")
            .or_else(|| record.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::InvalidDefinition(format!("legacy field #{} has no id", index)))?;

        let is_citizen = record.get("category").and_then(Value::as_str) == Some("citizen");
        if is_citizen || is_identity_field(id) {
            if !form.citizen_fields.iter().any(|f| f == id) {
                form.citizen_fields.push(id.to_string());
            }
            continue;
        }
        if record.get("enabled").and_then(Value::as_bool) == Some(false) {
            continue;
        }

        let field_type = record
            .get("type")
            .cloned()
            .and_then(|t| serde_json::from_value::<FieldType>(t).ok())
            .unwrap_or(FieldType::Text);
        let label = record.get("label").and_then(Value::as_str).unwrap_or(id);

        let mut field = FieldSchema::new(id, label, field_type).with_order(index as u32);
        if let Some(options) = record.get("options").and_then(Value::as_array) {
            field.config.options = options.iter().filter_map(option_from_value).collect();
        }
        if let Some(validation) = record.get("validation").filter(|v| v.is_object()) {
            field.validation = serde_json::from_value(validation.clone()).unwrap_or_default();
        }
        if record.get("required").and_then(Value::as_bool) == Some(true) {
            field.required = true;
            form.required.push(id.to_string());
        }
        form.fields.push(field);
    }
    Ok(form)
}

/// Move fields named after identity attributes out of the form and into
/// `citizenFields`. Returns the moved names.
pub fn strip_identity_fields(service: &mut ServiceDefinition) -> Vec<String> {
    let (identity, kept): (Vec<FieldSchema>, Vec<FieldSchema>) = std::mem::take(&mut service.fields)
        .into_iter()
        .partition(|f| is_identity_field(&f.name));
    service.fields = kept;

    let moved: Vec<String> = identity.into_iter().map(|f| f.name).collect();
    for name in &moved {
        if !service.citizen_fields.contains(name) {
            service.citizen_fields.push(name.clone());
        }
    }
    if !moved.is_empty() {
        tracing::info!(service = %service.name, moved = ?moved, "identity fields moved out of form");
    }
    moved
}
