//! Civic Workflow: protocols and their SLA
//!
//! - [`sla`]: the SLA record and its pure transitions
//! - [`status`]: progress, status and remaining time, computed on read
//! - [`engine`]: persisted transitions with compare-and-swap retries
//! - [`stats`]: overdue and near-due listings, aggregate figures
//! - [`submission`]: the single module handler turning a payload into a
//!   protocol
//!
//! ```ignore
//! let engine = Arc::new(SlaEngine::new(sla_store, workflows.clone(), clock, config));
//! let handler = ModuleHandler::new(services, workflows, engine.clone(), protocols);
//! if let Submission::Protocol { sla, .. } = handler.submit(id, citizen, &payload, &profiles, &ctx)? {
//!     engine.pause(&sla.id, "aguardando documentos", &ctx)?;
//! }
//! ```

pub mod calendar;
pub mod engine;
pub mod protocol;
pub mod sla;
pub mod stats;
pub mod status;
pub mod submission;

pub use engine::SlaEngine;
pub use protocol::{protocol_number, Protocol};
pub use sla::{ProtocolSla, SlaAction, SlaEvent};
pub use stats::{near_due, overdue, SlaStats};
pub use status::{days_remaining, describe_remaining, progress, status, SlaStatus, SlaView};
pub use submission::{IdentityProvider, ModuleHandler, StaticIdentity, Submission, SubmitError};
