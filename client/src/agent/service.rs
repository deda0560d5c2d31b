//! Agent trait definitions

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::types::AgentError;
use crate::identity::Identity;
use crate::principal::Principal;

/// An identity bound to a network endpoint
#[async_trait]
pub trait Agent: Send + Sync {
    /// Principal that signs this agent's calls
    fn principal(&self) -> Principal;

    /// Fetch and trust the network's root key. Only safe on local networks.
    async fn fetch_root_key(&self) -> Result<(), AgentError>;

    /// Whether replies can currently be verified
    async fn has_root_key(&self) -> bool;

    /// Issue a query against a remote service
    async fn query(&self, service_id: &str, method: &str, arg: Value) -> Result<Value, AgentError>;
}

/// Creates agents bound to a given identity
pub trait AgentFactory: Send + Sync {
    fn create_agent(&self, identity: Identity) -> Arc<dyn Agent>;
}
