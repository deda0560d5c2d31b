//! Identity exchange: turning a signing identity into a usable caller handle

use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::agent::{AgentError, AgentFactory};
use crate::backend::{CallerHandle, ServiceFactory};
use crate::config::NetworkMode;
use crate::identity::Identity;

/// The network the backend lives on, and how to reach it
pub struct Network {
    mode: NetworkMode,
    service_id: String,
    agents: Arc<dyn AgentFactory>,
    services: Arc<dyn ServiceFactory>,
}

impl Network {
    pub fn new(
        mode: NetworkMode,
        service_id: impl Into<String>,
        agents: Arc<dyn AgentFactory>,
        services: Arc<dyn ServiceFactory>,
    ) -> Self {
        Self {
            mode,
            service_id: service_id.into(),
            agents,
            services,
        }
    }

    /// Build a caller handle signing as `identity`
    ///
    /// On a local network the root key is fetched before the handle is
    /// returned; elsewhere it never is.
    pub async fn caller_for(&self, identity: Identity) -> Result<CallerHandle, AgentError> {
        let start = Instant::now();
        let agent = self.agents.create_agent(identity);

        if self.mode.is_local() {
            debug!("Local network: fetching root key for {}", agent.principal());
            agent.fetch_root_key().await?;
        }

        let handle = self.services.create_caller(&self.service_id, agent);
        info!(
            "Bound caller for service {} to {}",
            self.service_id,
            handle.principal()
        );

        counter!("authapp_identity_exchanges_total").increment(1);
        histogram!("authapp_identity_exchange_duration_seconds").record(start.elapsed());
        Ok(handle)
    }

    /// The unauthenticated default handle
    pub async fn anonymous_caller(&self) -> Result<CallerHandle, AgentError> {
        self.caller_for(Identity::anonymous()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AgentServiceFactory;
    use crate::test_utils::MockAgentFactory;

    fn network(mode: NetworkMode, agents: Arc<MockAgentFactory>) -> Network {
        Network::new(mode, "backend", agents, Arc::new(AgentServiceFactory))
    }

    #[tokio::test]
    async fn test_local_network_bootstraps_root_key() {
        let agents = Arc::new(MockAgentFactory::new());
        let network = network(NetworkMode::Local, agents.clone());

        let handle = network.anonymous_caller().await.unwrap();
        assert_eq!(agents.root_key_fetches(), 1);
        assert_eq!(handle.greet("Ada").await.unwrap(), "Hello, Ada!");
    }

    #[tokio::test]
    async fn test_remote_network_skips_root_key() {
        let agents = Arc::new(MockAgentFactory::trusting());
        let network = network(NetworkMode::Remote, agents.clone());

        let identity = Identity::generate();
        let handle = network.caller_for(identity.clone()).await.unwrap();
        assert_eq!(agents.root_key_fetches(), 0);
        assert_eq!(handle.principal(), &identity.principal());
        assert_eq!(handle.whoami().await.unwrap(), identity.principal());
    }

    #[tokio::test]
    async fn test_root_key_failure_propagates() {
        let agents = Arc::new(MockAgentFactory::new());
        agents.fail_root_key(true);
        let network = network(NetworkMode::Local, agents.clone());

        let result = network.caller_for(Identity::generate()).await;
        assert!(result.is_err());
        assert_eq!(agents.root_key_fetches(), 1);
    }
}
