//! Civic Registry: service and workflow definitions
//!
//! - [`ServiceRegistry`]: services by id, department and module type, with
//!   module type uniqueness among active data-collecting services
//! - [`WorkflowRegistry`]: versioned stage lists per module
//! - [`remediation`]: repair of catalogs with duplicate module types
//! - [`catalog`]: YAML loading

pub mod catalog;
pub mod remediation;
pub mod services;
pub mod workflows;

pub use catalog::{load_catalog, load_workflows, CatalogLoad, ServiceCatalog, WorkflowCatalog};
pub use remediation::{plan_module_renames, remediate_duplicate_module_types, ModuleRename};
pub use services::ServiceRegistry;
pub use workflows::{default_workflows, stage_digest, Stage, WorkflowDefinition, WorkflowRegistry};
