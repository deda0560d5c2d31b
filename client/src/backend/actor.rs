//! Backend calls issued through an agent

use async_trait::async_trait;
use metrics::counter;
use serde_json::Value;
use std::sync::Arc;

use super::service::{BackendService, ServiceFactory};
use super::types::{CallError, CallerHandle};
use crate::agent::Agent;
use crate::principal::Principal;

/// Calls one remote service through one agent
pub struct AgentCaller {
    service_id: String,
    agent: Arc<dyn Agent>,
}

impl AgentCaller {
    pub fn new(service_id: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        Self {
            service_id: service_id.into(),
            agent,
        }
    }

    async fn query_text(&self, method: &'static str, arg: Value) -> Result<String, CallError> {
        counter!("authapp_backend_calls_total", "method" => method).increment(1);
        let reply = self
            .agent
            .query(&self.service_id, method, arg)
            .await
            .inspect_err(|_| {
                counter!("authapp_backend_call_errors_total", "method" => method).increment(1);
            })?;

        match reply {
            Value::String(text) => Ok(text),
            other => Err(CallError::UnexpectedReply {
                method,
                reason: format!("expected text, got {}", other),
            }),
        }
    }
}

#[async_trait]
impl BackendService for AgentCaller {
    async fn greet(&self, name: &str) -> Result<String, CallError> {
        self.query_text("greet", Value::from(name)).await
    }

    async fn whoami(&self) -> Result<Principal, CallError> {
        self.query_text("whoami", Value::Null)
            .await
            .map(Principal::from_text)
    }
}

/// Builds [`AgentCaller`] handles
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentServiceFactory;

impl ServiceFactory for AgentServiceFactory {
    fn create_caller(&self, service_id: &str, agent: Arc<dyn Agent>) -> CallerHandle {
        let principal = agent.principal();
        CallerHandle::new(Arc::new(AgentCaller::new(service_id, agent)), principal)
    }
}
