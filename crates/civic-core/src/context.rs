//! Request Context: who is acting, carried through every state change
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// User id of the staff member or citizen acting
    pub actor: String,
    /// Role the actor holds (e.g. "ATENDENTE", "COORDENADOR")
    pub role: String,
    pub trace_id: String,
}

impl RequestContext {
    pub fn new(actor: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            role: role.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Context for actions the engine takes on its own behalf.
    pub fn system() -> Self {
        Self::new("system", "SYSTEM")
    }
}
