use serde::Serialize;
use uuid::Uuid;

/// The authenticated caller. Authentication itself happens in front of the gateway.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: String,
    pub groups: Vec<String>,
}

/// Per-request state handed to every storage operation.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub trace_id: Uuid,
    pub identity: Identity,
}

impl RequestContext {
    pub fn new(identity: Identity) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            identity,
        }
    }

    pub fn user(&self) -> &str {
        &self.identity.user
    }
}
