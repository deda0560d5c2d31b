//! Common Test Utilities for Integration Tests
//!
//! Shared helpers: a replica bound to an ephemeral port and a scripted
//! interactive login flow.

#![allow(dead_code)]

use async_trait::async_trait;
use authapp_client::agent::HttpAgentFactory;
use authapp_client::backend::AgentServiceFactory;
use authapp_client::config::NetworkMode;
use authapp_client::identity::{
    AuthorizeRequest, FlowDecision, InteractiveFlow, LocalIdentityProviderFactory, ProviderError,
};
use authapp_client::network::Network;
use authapp_client::replica::{GreetingCanister, ReplicaState, replica_routes};
use authapp_client::session::{SessionConfig, SessionError, SessionManager};
use ed25519_dalek::{SigningKey, VerifyingKey};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BACKEND_ID: &str = "bkyz2-fmaaa-aaaaa-qaaaq-cai";
pub const IDENTITY_PROVIDER_URL: &str = "http://rdmx6-jaaaa-aaaaa-aaadq-cai.localhost:8080";

const ROOT_SECRET: [u8; 32] = [7u8; 32];

/// A replica serving on 127.0.0.1 with the greeting backend installed
pub struct TestReplica {
    pub host: String,
    pub state: ReplicaState,
}

impl TestReplica {
    /// Key a remote-mode client must trust to verify this replica's replies
    pub fn root_key(&self) -> VerifyingKey {
        SigningKey::from_bytes(&ROOT_SECRET).verifying_key()
    }
}

pub async fn spawn_replica() -> TestReplica {
    let state = ReplicaState::new(SigningKey::from_bytes(&ROOT_SECRET))
        .with_canister(BACKEND_ID, Arc::new(GreetingCanister));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind replica listener");
    let addr = listener.local_addr().expect("Listener has no address");
    let app = replica_routes(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Replica server failed");
    });

    TestReplica {
        host: format!("http://{}", addr),
        state,
    }
}

/// Interactive flow answering from a queue of decisions
///
/// Once the queue is empty the flow never answers, like a user who walked away.
pub struct ScriptedFlow {
    decisions: Mutex<VecDeque<FlowDecision>>,
    requests: Mutex<Vec<AuthorizeRequest>>,
}

impl ScriptedFlow {
    pub fn new(decisions: impl IntoIterator<Item = FlowDecision>) -> Arc<Self> {
        Arc::new(Self {
            decisions: Mutex::new(decisions.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<AuthorizeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl InteractiveFlow for ScriptedFlow {
    async fn authorize(&self, request: &AuthorizeRequest) -> Result<FlowDecision, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.decisions.lock().unwrap().pop_front();
        match next {
            Some(decision) => Ok(decision),
            None => std::future::pending().await,
        }
    }
}

/// Options for building a client against a [`TestReplica`]
pub struct ClientOptions {
    pub mode: NetworkMode,
    pub host: String,
    pub service_id: String,
    pub trusted_root_key: Option<VerifyingKey>,
    pub login_timeout: Option<Duration>,
}

impl ClientOptions {
    pub fn local(replica: &TestReplica) -> Self {
        Self {
            mode: NetworkMode::Local,
            host: replica.host.clone(),
            service_id: BACKEND_ID.to_string(),
            trusted_root_key: None,
            login_timeout: Some(Duration::from_secs(5)),
        }
    }

    pub fn remote(replica: &TestReplica, trusted_root_key: Option<VerifyingKey>) -> Self {
        Self {
            mode: NetworkMode::Remote,
            trusted_root_key,
            ..Self::local(replica)
        }
    }
}

pub async fn try_connect(
    options: ClientOptions,
    storage_dir: &Path,
    flow: Arc<ScriptedFlow>,
) -> Result<SessionManager, SessionError> {
    let agents = HttpAgentFactory::new(options.host).with_trusted_root_key(options.trusted_root_key);
    let network = Network::new(
        options.mode,
        options.service_id,
        Arc::new(agents),
        Arc::new(AgentServiceFactory),
    );
    let providers = LocalIdentityProviderFactory::new(storage_dir, flow);
    let config = SessionConfig {
        identity_provider_url: IDENTITY_PROVIDER_URL.to_string(),
        login_timeout: options.login_timeout,
        session_ttl: Duration::from_secs(3600),
    };

    SessionManager::bootstrap(Arc::new(providers), network, config).await
}

pub async fn connect(
    options: ClientOptions,
    storage_dir: &Path,
    flow: Arc<ScriptedFlow>,
) -> SessionManager {
    try_connect(options, storage_dir, flow)
        .await
        .expect("Failed to connect test client")
}
