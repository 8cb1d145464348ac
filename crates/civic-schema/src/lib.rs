//! Civic Schema: service forms and their validation
//!
//! A [`ServiceDefinition`] describes one public service and its form as a
//! list of [`FieldSchema`]s. [`validate`] checks a submitted payload against
//! it, leaving the citizen identity fields (filled in from the profile) out
//! of every check.
//!
//! ```ignore
//! let service: ServiceDefinition = serde_yaml::from_str(yaml)?;
//! service.check()?;
//! match validate(&service, &payload) {
//!     Ok(valid) => store(valid.into_value()),
//!     Err(errors) => reply_with(errors),
//! }
//! ```

pub mod field;
pub mod formats;
pub mod identity;
pub mod json_schema;
pub mod messages;
pub mod service;
pub mod validation;

pub use field::{FieldConfig, FieldDisplay, FieldOption, FieldSchema, FieldType, FieldValidation};
pub use identity::{is_identity_field, partition, PartitionedPayload, CITIZEN_IDENTITY_FIELDS};
pub use json_schema::{from_json_schema, from_legacy_fields, strip_identity_fields, to_json_schema, ImportedForm};
pub use messages::MessageCatalog;
pub use service::{DeadlinePolicy, ServiceDefinition, ServiceKind};
pub use validation::{
    validate, ValidatedPayload, ValidationError, ValidationErrorKind, Validator, ROOT_FIELD,
};
