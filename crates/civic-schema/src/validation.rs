//! Form validation
//!
//! Checks a submitted payload against a [`ServiceDefinition`]:
//!
//! ```text
//! payload → partition → required check → per-field checks → merge
//!              ↓              ↓                 ↓
//!          identity     MISSING_REQUIRED   TYPE / PATTERN / LENGTH /
//!        (never checked)                   VALUE / ENUM errors
//! ```
//!
//! Identity fields come from the citizen profile and skip every check, even
//! when the service lists them as required. Unknown keys pass through
//! untouched. All errors are collected; nothing short-circuits.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};
use std::fmt;

use crate::field::{FieldSchema, FieldType};
use crate::formats::{self, format_name};
use crate::identity::{is_identity_field, partition};
use crate::messages::MessageCatalog;
use crate::service::ServiceDefinition;

/// Field used for errors about the payload as a whole
pub const ROOT_FIELD: &str = "$root";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationErrorKind {
    MissingRequired,
    TypeMismatch,
    PatternMismatch,
    LengthOutOfRange,
    ValueOutOfRange,
    EnumNotMember,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ValidationErrorKind::MissingRequired => "MISSING_REQUIRED",
            ValidationErrorKind::TypeMismatch => "TYPE_MISMATCH",
            ValidationErrorKind::PatternMismatch => "PATTERN_MISMATCH",
            ValidationErrorKind::LengthOutOfRange => "LENGTH_OUT_OF_RANGE",
            ValidationErrorKind::ValueOutOfRange => "VALUE_OUT_OF_RANGE",
            ValidationErrorKind::EnumNotMember => "ENUM_NOT_MEMBER",
        };
        write!(f, "{}", name)
    }
}

/// One problem with one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.field, self.kind, self.message)
    }
}

/// A payload that passed validation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidatedPayload {
    /// Citizen identity values, passed through as submitted
    pub identity: Map<String, Value>,
    /// Service values, normalized (numeric strings become numbers, boolean
    /// strings become booleans)
    pub service: Map<String, Value>,
}

impl ValidatedPayload {
    /// Identity and service parts as one object
    pub fn merged(&self) -> Map<String, Value> {
        let mut merged = self.identity.clone();
        merged.extend(self.service.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.merged())
    }
}

/// Validate with the built-in message catalog
pub fn validate(
    service: &ServiceDefinition,
    payload: &Value,
) -> Result<ValidatedPayload, Vec<ValidationError>> {
    Validator::new(MessageCatalog::default_catalog()).validate(service, payload)
}

pub struct Validator<'a> {
    catalog: &'a MessageCatalog,
}

impl<'a> Validator<'a> {
    pub fn new(catalog: &'a MessageCatalog) -> Self {
        Self { catalog }
    }

    pub fn validate(
        &self,
        service: &ServiceDefinition,
        payload: &Value,
    ) -> Result<ValidatedPayload, Vec<ValidationError>> {
        let object = match payload.as_object() {
            Some(object) => object,
            None => {
                return Err(vec![self.error(
                    ROOT_FIELD,
                    ROOT_FIELD,
                    ValidationErrorKind::TypeMismatch,
                    "type",
                    json!({ "expected": "object" }),
                )])
            }
        };

        let parts = partition(object);
        let mut service_part = parts.service;
        let mut errors = Vec::new();

        for name in service.effective_required() {
            let present = service_part.get(name).map_or(false, |v| !is_empty_value(v));
            if !present {
                let label = service.field(name).map_or(name, |f| f.label.as_str());
                errors.push(self.error(
                    name,
                    label,
                    ValidationErrorKind::MissingRequired,
                    "required",
                    json!({}),
                ));
            }
        }

        for field in &service.fields {
            if is_identity_field(&field.name) {
                continue;
            }
            let value = match service_part.get(&field.name) {
                Some(value) if !is_empty_value(value) => value,
                _ => continue,
            };
            let before = errors.len();
            let normalized = self.check_field(field, value, &mut errors);
            if errors.len() == before {
                if let Some(normalized) = normalized {
                    service_part.insert(field.name.clone(), normalized);
                }
            }
        }

        if errors.is_empty() {
            tracing::debug!(service = %service.name, "payload accepted");
            Ok(ValidatedPayload {
                identity: parts.identity,
                service: service_part,
            })
        } else {
            tracing::debug!(service = %service.name, errors = errors.len(), "payload rejected");
            Err(errors)
        }
    }

    /// Check one present value. Returns the normalized value when it differs
    /// from the submitted one.
    fn check_field(
        &self,
        field: &FieldSchema,
        value: &Value,
        errors: &mut Vec<ValidationError>,
    ) -> Option<Value> {
        match field.field_type {
            t if t.is_numeric() => self.check_number(field, value, errors),
            FieldType::Boolean => self.check_boolean(field, value, errors),
            FieldType::Select | FieldType::Radio => {
                if let Some(text) = self.expect_string(field, value, errors) {
                    self.check_option(field, text, errors);
                }
                None
            }
            FieldType::Multiselect => {
                self.check_multiselect(field, value, errors);
                None
            }
            FieldType::Date | FieldType::Datetime | FieldType::Time => {
                if let Some(text) = self.expect_string(field, value, errors) {
                    self.check_temporal(field, text, errors);
                }
                None
            }
            FieldType::File | FieldType::Image => {
                self.check_file(field, value, errors);
                None
            }
            FieldType::Reference => {
                let ok = match value {
                    Value::String(s) => !s.trim().is_empty(),
                    Value::Number(n) => n.is_u64() || n.is_i64(),
                    _ => false,
                };
                if !ok {
                    self.type_mismatch(field, "string", errors);
                }
                None
            }
            _ => {
                if let Some(text) = self.expect_string(field, value, errors) {
                    self.check_text(field, text, errors);
                }
                None
            }
        }
    }

    fn expect_string<'v>(
        &self,
        field: &FieldSchema,
        value: &'v Value,
        errors: &mut Vec<ValidationError>,
    ) -> Option<&'v str> {
        match value.as_str() {
            Some(text) => Some(text),
            None => {
                self.type_mismatch(field, field.field_type.json_type(), errors);
                None
            }
        }
    }

    fn check_text(&self, field: &FieldSchema, text: &str, errors: &mut Vec<ValidationError>) {
        if !formats::matches_format(field.field_type, text) {
            let expected = format_name(field.field_type).unwrap_or("texto");
            errors.push(self.field_error(
                field,
                ValidationErrorKind::PatternMismatch,
                "format",
                json!({ "expected": expected }),
            ));
        }
        self.check_length(field, text, errors);
        self.check_pattern(field, text, errors);
    }

    fn check_length(&self, field: &FieldSchema, text: &str, errors: &mut Vec<ValidationError>) {
        let len = text.chars().count();
        if let Some(min) = field.validation.min_length {
            if len < min {
                errors.push(self.field_error(
                    field,
                    ValidationErrorKind::LengthOutOfRange,
                    "minLength",
                    json!({ "limit": min }),
                ));
            }
        }
        if let Some(max) = field.validation.max_length {
            if len > max {
                errors.push(self.field_error(
                    field,
                    ValidationErrorKind::LengthOutOfRange,
                    "maxLength",
                    json!({ "limit": max }),
                ));
            }
        }
    }

    fn check_pattern(&self, field: &FieldSchema, text: &str, errors: &mut Vec<ValidationError>) {
        let pattern = match &field.validation.pattern {
            Some(pattern) => pattern,
            None => return,
        };
        match Regex::new(pattern) {
            Ok(re) => {
                if !re.is_match(text) {
                    errors.push(self.field_error(
                        field,
                        ValidationErrorKind::PatternMismatch,
                        "pattern",
                        json!({ "pattern": pattern }),
                    ));
                }
            }
            Err(e) => {
                tracing::warn!(field = %field.name, error = %e, "service carries an invalid pattern");
                errors.push(self.field_error(
                    field,
                    ValidationErrorKind::PatternMismatch,
                    "invalidPattern",
                    json!({ "pattern": pattern }),
                ));
            }
        }
    }

    fn check_number(
        &self,
        field: &FieldSchema,
        value: &Value,
        errors: &mut Vec<ValidationError>,
    ) -> Option<Value> {
        let number = match parse_number(value) {
            Some(number) => number,
            None => {
                self.type_mismatch(field, "number", errors);
                return None;
            }
        };

        let (mut min, mut max) = (field.validation.min, field.validation.max);
        if field.field_type == FieldType::Percentage {
            min = Some(min.map_or(0.0, |m| m.max(0.0)));
            max = Some(max.map_or(100.0, |m| m.min(100.0)));
        }
        if let Some(min) = min {
            if number < min {
                errors.push(self.field_error(
                    field,
                    ValidationErrorKind::ValueOutOfRange,
                    "minimum",
                    json!({ "limit": format_number(min) }),
                ));
            }
        }
        if let Some(max) = max {
            if number > max {
                errors.push(self.field_error(
                    field,
                    ValidationErrorKind::ValueOutOfRange,
                    "maximum",
                    json!({ "limit": format_number(max) }),
                ));
            }
        }

        if value.is_number() {
            None
        } else {
            number_value(number)
        }
    }

    fn check_boolean(
        &self,
        field: &FieldSchema,
        value: &Value,
        errors: &mut Vec<ValidationError>,
    ) -> Option<Value> {
        match value {
            Value::Bool(_) => None,
            Value::String(s) if s == "true" => Some(Value::Bool(true)),
            Value::String(s) if s == "false" => Some(Value::Bool(false)),
            _ => {
                self.type_mismatch(field, "boolean", errors);
                None
            }
        }
    }

    /// Exact membership: no case folding, no accent stripping
    fn check_option(&self, field: &FieldSchema, text: &str, errors: &mut Vec<ValidationError>) {
        if field.config.options.is_empty() || field.config.has_option(text) {
            return;
        }
        errors.push(self.field_error(
            field,
            ValidationErrorKind::EnumNotMember,
            "enum",
            json!({ "allowed": field.config.option_values().join(", "), "value": text }),
        ));
    }

    fn check_multiselect(&self, field: &FieldSchema, value: &Value, errors: &mut Vec<ValidationError>) {
        let items = match value.as_array() {
            Some(items) => items,
            None => {
                self.type_mismatch(field, "array", errors);
                return;
            }
        };
        for item in items {
            match item.as_str() {
                Some(text) => self.check_option(field, text, errors),
                None => {
                    self.type_mismatch(field, "array", errors);
                    return;
                }
            }
        }
    }

    fn check_temporal(&self, field: &FieldSchema, text: &str, errors: &mut Vec<ValidationError>) {
        let date = match field.field_type {
            FieldType::Date => formats::parse_date(text),
            FieldType::Datetime => formats::parse_datetime(text).map(|dt| dt.date()),
            _ => {
                if formats::parse_time(text).is_none() {
                    self.format_mismatch(field, errors);
                }
                return;
            }
        };
        let date = match date {
            Some(date) => date,
            None => {
                self.format_mismatch(field, errors);
                return;
            }
        };
        if let Some(min) = field.config.min_date.as_deref().and_then(formats::parse_date) {
            if date < min {
                errors.push(self.field_error(
                    field,
                    ValidationErrorKind::ValueOutOfRange,
                    "minimum",
                    json!({ "limit": min.to_string() }),
                ));
            }
        }
        if let Some(max) = field.config.max_date.as_deref().and_then(formats::parse_date) {
            if date > max {
                errors.push(self.field_error(
                    field,
                    ValidationErrorKind::ValueOutOfRange,
                    "maximum",
                    json!({ "limit": max.to_string() }),
                ));
            }
        }
    }

    /// A file value is a stored upload id, an upload descriptor
    /// `{ name, mimeType, size }`, or a list of either.
    fn check_file(&self, field: &FieldSchema, value: &Value, errors: &mut Vec<ValidationError>) {
        match value {
            Value::String(_) => {}
            Value::Object(descriptor) => self.check_upload(field, descriptor, errors),
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::String(_) => {}
                        Value::Object(descriptor) => self.check_upload(field, descriptor, errors),
                        _ => {
                            self.type_mismatch(field, "file", errors);
                            return;
                        }
                    }
                }
            }
            _ => self.type_mismatch(field, "file", errors),
        }
    }

    fn check_upload(&self, field: &FieldSchema, upload: &Map<String, Value>, errors: &mut Vec<ValidationError>) {
        let name = upload.get("name").and_then(Value::as_str).unwrap_or("");
        let mime = upload.get("mimeType").and_then(Value::as_str).unwrap_or("");

        let mut accept: Vec<&str> = field.config.accept.iter().map(String::as_str).collect();
        if field.field_type == FieldType::Image && accept.is_empty() {
            accept.push("image/*");
        }
        if !accept.is_empty() && !accept.iter().any(|rule| accepts(rule, name, mime)) {
            errors.push(self.field_error(
                field,
                ValidationErrorKind::PatternMismatch,
                "fileType",
                json!({ "allowed": accept.join(", ") }),
            ));
        }

        if let (Some(max), Some(size)) = (
            field.config.max_size_bytes,
            upload.get("size").and_then(Value::as_u64),
        ) {
            if size > max {
                errors.push(self.field_error(
                    field,
                    ValidationErrorKind::ValueOutOfRange,
                    "fileSize",
                    json!({ "limit": max }),
                ));
            }
        }
    }

    fn type_mismatch(&self, field: &FieldSchema, expected: &str, errors: &mut Vec<ValidationError>) {
        errors.push(self.field_error(
            field,
            ValidationErrorKind::TypeMismatch,
            "type",
            json!({ "expected": expected }),
        ));
    }

    fn format_mismatch(&self, field: &FieldSchema, errors: &mut Vec<ValidationError>) {
        let expected = format_name(field.field_type).unwrap_or("texto");
        errors.push(self.field_error(
            field,
            ValidationErrorKind::PatternMismatch,
            "format",
            json!({ "expected": expected }),
        ));
    }

    fn field_error(
        &self,
        field: &FieldSchema,
        kind: ValidationErrorKind,
        message_key: &str,
        args: Value,
    ) -> ValidationError {
        self.error(&field.name, &field.label, kind, message_key, args)
    }

    fn error(
        &self,
        name: &str,
        label: &str,
        kind: ValidationErrorKind,
        message_key: &str,
        mut args: Value,
    ) -> ValidationError {
        if let Some(map) = args.as_object_mut() {
            map.insert("field".to_string(), Value::String(label.to_string()));
        }
        ValidationError {
            field: name.to_string(),
            kind,
            message: self.catalog.render(message_key, &args),
        }
    }
}

/// `null`, blank strings and empty lists count as "not provided"
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Numbers, and strings holding a number. A single decimal comma is read as
/// a decimal point ("12,5").
fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            let parsed = if s.contains(',') && !s.contains('.') && s.matches(',').count() == 1 {
                s.replace(',', ".").parse::<f64>()
            } else {
                s.parse::<f64>()
            };
            parsed.ok().filter(|n| n.is_finite())
        }
        _ => None,
    }
}

fn number_value(number: f64) -> Option<Value> {
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        Some(Value::Number(Number::from(number as i64)))
    } else {
        Number::from_f64(number).map(Value::Number)
    }
}

fn format_number(number: f64) -> String {
    if number.fract() == 0.0 {
        format!("{}", number as i64)
    } else {
        format!("{}", number)
    }
}

fn accepts(rule: &str, name: &str, mime: &str) -> bool {
    if let Some(ext) = rule.strip_prefix('.') {
        return name
            .rsplit_once('.')
            .map_or(false, |(_, e)| e.eq_ignore_ascii_case(ext));
    }
    if let Some(prefix) = rule.strip_suffix("/*") {
        return mime
            .split_once('/')
            .map_or(false, |(kind, _)| kind.eq_ignore_ascii_case(prefix));
    }
    mime.eq_ignore_ascii_case(rule)
}
