//! Civic Core: error model, clock, configuration and persistence port
//!
//! Shared by the schema, registry and workflow crates. Nothing in here knows
//! about services or SLAs; it only fixes how the engine fails, tells time,
//! reads its settings and stores records.

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig};
pub use context::RequestContext;
pub use error::{EngineError, EngineResult};
pub use store::{MemoryStore, Store, StoreError, Versioned};

/// Engine version
pub const ENGINE_VERSION: &str = "1.0.0";

/// Longest deadline, in days, a service or a whole workflow may declare
pub const MAX_DEADLINE_DAYS: u32 = 3650;

/// Fresh record identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
