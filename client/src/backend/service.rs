//! BackendService trait definition

use async_trait::async_trait;
use std::sync::Arc;

use super::types::{CallError, CallerHandle};
use crate::agent::Agent;
use crate::principal::Principal;

/// Remote operations exposed by the greeting backend
#[async_trait]
pub trait BackendService: Send + Sync {
    /// Greet `name`; the reply text is defined by the remote service
    async fn greet(&self, name: &str) -> Result<String, CallError>;

    /// Principal the remote service sees as the caller
    async fn whoami(&self) -> Result<Principal, CallError>;
}

/// Binds a remote service to an agent
pub trait ServiceFactory: Send + Sync {
    fn create_caller(&self, service_id: &str, agent: Arc<dyn Agent>) -> CallerHandle;
}
