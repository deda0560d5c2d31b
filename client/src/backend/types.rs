//! Caller handle and call error definitions

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::service::BackendService;
use crate::agent::AgentError;
use crate::principal::Principal;

/// Errors that can occur when calling the remote service
#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("Unexpected reply from {method}: {reason}")]
    UnexpectedReply { method: &'static str, reason: String },
}

/// Opaque binding of the remote service to one signing identity
///
/// Handles are immutable; changing identity means building a new handle.
#[derive(Clone)]
pub struct CallerHandle {
    service: Arc<dyn BackendService>,
    principal: Principal,
}

impl CallerHandle {
    pub fn new(service: Arc<dyn BackendService>, principal: Principal) -> Self {
        Self { service, principal }
    }

    /// Principal of the identity this handle signs with
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn is_anonymous(&self) -> bool {
        self.principal.is_anonymous()
    }

    /// Whether both handles are the same binding
    pub fn same_binding(&self, other: &CallerHandle) -> bool {
        Arc::ptr_eq(&self.service, &other.service)
    }

    pub async fn greet(&self, name: &str) -> Result<String, CallError> {
        self.service.greet(name).await
    }

    pub async fn whoami(&self) -> Result<Principal, CallError> {
        self.service.whoami().await
    }
}

impl fmt::Debug for CallerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallerHandle")
            .field("principal", &self.principal)
            .finish_non_exhaustive()
    }
}
