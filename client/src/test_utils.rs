//! Test Utilities Module
//!
//! Provides mock collaborators for exercising the session lifecycle without a
//! replica or an identity provider. This module is only compiled when running tests.

#![cfg(test)]

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::agent::{Agent, AgentError, AgentFactory};
use crate::backend::{BackendService, CallError, CallerHandle};
use crate::identity::{
    Identity, IdentityProvider, IdentityProviderFactory, LoginFlow, LoginRequest, ProviderError,
};
use crate::principal::Principal;

// ============================================================================
// Identity Provider Mocks
// ============================================================================

/// What the next interactive login does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockLogin {
    /// Complete with a freshly generated identity
    Complete,
    /// Report that the user closed the flow
    Close,
    /// Never resolve
    Hang,
    /// Fail with a provider error
    Fail,
}

struct MockProviderState {
    authenticated: bool,
    identity: Identity,
    login: MockLogin,
    login_urls: Vec<String>,
    logouts: usize,
}

/// In-memory identity provider
pub struct MockIdentityProvider {
    state: Mutex<MockProviderState>,
}

impl MockIdentityProvider {
    /// A provider with no prior session
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockProviderState {
                authenticated: false,
                identity: Identity::anonymous(),
                login: MockLogin::Complete,
                login_urls: Vec::new(),
                logouts: 0,
            }),
        }
    }

    /// A provider that already holds a session, as after a page reload
    pub fn authenticated() -> Self {
        let provider = Self::new();
        {
            let mut state = provider.state.lock().unwrap();
            state.authenticated = true;
            state.identity = Identity::generate();
        }
        provider
    }

    /// Reports a session but hands out the anonymous identity, as when the
    /// session expires between `is_authenticated` and `identity`
    pub fn lapsed() -> Self {
        let provider = Self::new();
        provider.state.lock().unwrap().authenticated = true;
        provider
    }

    pub fn set_login(&self, login: MockLogin) {
        self.state.lock().unwrap().login = login;
    }

    pub fn current_principal(&self) -> Principal {
        self.state.lock().unwrap().identity.principal()
    }

    pub fn login_urls(&self) -> Vec<String> {
        self.state.lock().unwrap().login_urls.clone()
    }

    pub fn logouts(&self) -> usize {
        self.state.lock().unwrap().logouts
    }
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn is_authenticated(&self) -> Result<bool, ProviderError> {
        Ok(self.state.lock().unwrap().authenticated)
    }

    async fn identity(&self) -> Result<Identity, ProviderError> {
        Ok(self.state.lock().unwrap().identity.clone())
    }

    async fn login(&self, request: LoginRequest) -> Result<LoginFlow, ProviderError> {
        let login = {
            let mut state = self.state.lock().unwrap();
            state.login_urls.push(request.identity_provider_url);
            state.login
        };

        match login {
            MockLogin::Complete => {
                let mut state = self.state.lock().unwrap();
                state.authenticated = true;
                state.identity = Identity::generate();
                Ok(LoginFlow::Completed)
            }
            MockLogin::Close => Ok(LoginFlow::Closed),
            MockLogin::Hang => std::future::pending().await,
            MockLogin::Fail => Err(ProviderError::Flow("mock flow failure".to_string())),
        }
    }

    async fn logout(&self) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.authenticated = false;
        state.identity = Identity::anonymous();
        state.logouts += 1;
        Ok(())
    }
}

/// Hands out one shared [`MockIdentityProvider`]
pub struct MockProviderFactory {
    provider: Arc<MockIdentityProvider>,
    creates: AtomicUsize,
    fail: AtomicBool,
}

impl MockProviderFactory {
    pub fn new(provider: Arc<MockIdentityProvider>) -> Self {
        Self {
            provider,
            creates: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityProviderFactory for MockProviderFactory {
    async fn create(&self) -> Result<Arc<dyn IdentityProvider>, ProviderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable("mock provider down".to_string()));
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(self.provider.clone())
    }
}

// ============================================================================
// Agent Mocks
// ============================================================================

#[derive(Default)]
struct MockNetworkState {
    root_key_fetches: AtomicUsize,
    fail_root_key: AtomicBool,
    fail_queries: AtomicBool,
}

/// Agent answering `greet` and `whoami` in-process
pub struct MockAgent {
    principal: Principal,
    root_key: AtomicBool,
    network: Arc<MockNetworkState>,
}

#[async_trait]
impl Agent for MockAgent {
    fn principal(&self) -> Principal {
        self.principal.clone()
    }

    async fn fetch_root_key(&self) -> Result<(), AgentError> {
        self.network.root_key_fetches.fetch_add(1, Ordering::SeqCst);
        if self.network.fail_root_key.load(Ordering::SeqCst) {
            return Err(AgentError::Rejected {
                status: 503,
                code: "unavailable".to_string(),
                message: "mock replica down".to_string(),
            });
        }
        self.root_key.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn has_root_key(&self) -> bool {
        self.root_key.load(Ordering::SeqCst)
    }

    async fn query(&self, _service_id: &str, method: &str, arg: Value) -> Result<Value, AgentError> {
        if !self.root_key.load(Ordering::SeqCst) {
            return Err(AgentError::UntrustedRootKey);
        }
        if self.network.fail_queries.load(Ordering::SeqCst) {
            return Err(AgentError::Rejected {
                status: 500,
                code: "internal".to_string(),
                message: "mock query failure".to_string(),
            });
        }

        match method {
            "greet" => Ok(Value::String(format!(
                "Hello, {}!",
                arg.as_str().unwrap_or_default()
            ))),
            "whoami" => Ok(Value::String(self.principal.to_string())),
            "count" => Ok(Value::from(42)),
            other => Err(AgentError::Rejected {
                status: 400,
                code: "unknown_method".to_string(),
                message: other.to_string(),
            }),
        }
    }
}

/// Creates [`MockAgent`]s and counts root-key bootstraps across them
pub struct MockAgentFactory {
    network: Arc<MockNetworkState>,
    trusting: bool,
}

impl MockAgentFactory {
    /// Agents start without a root key
    pub fn new() -> Self {
        Self {
            network: Arc::new(MockNetworkState::default()),
            trusting: false,
        }
    }

    /// Agents start with a trusted root key
    pub fn trusting() -> Self {
        Self {
            trusting: true,
            ..Self::new()
        }
    }

    pub fn root_key_fetches(&self) -> usize {
        self.network.root_key_fetches.load(Ordering::SeqCst)
    }

    pub fn fail_root_key(&self, fail: bool) {
        self.network.fail_root_key.store(fail, Ordering::SeqCst);
    }

    pub fn fail_queries(&self, fail: bool) {
        self.network.fail_queries.store(fail, Ordering::SeqCst);
    }
}

impl Default for MockAgentFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentFactory for MockAgentFactory {
    fn create_agent(&self, identity: Identity) -> Arc<dyn Agent> {
        Arc::new(MockAgent {
            principal: identity.principal(),
            root_key: AtomicBool::new(self.trusting),
            network: self.network.clone(),
        })
    }
}

// ============================================================================
// Backend Mocks
// ============================================================================

enum MockBackendMode {
    Ok,
    Failing,
    Gated(Arc<Notify>),
}

/// Backend service that answers directly, fails, or waits on a gate
pub struct MockBackend {
    principal: Principal,
    mode: MockBackendMode,
    calls: AtomicUsize,
}

impl MockBackend {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            mode: MockBackendMode::Ok,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(principal: Principal) -> Self {
        Self {
            mode: MockBackendMode::Failing,
            ..Self::new(principal)
        }
    }

    /// Calls suspend until `gate` is notified
    pub fn gated(principal: Principal, gate: Arc<Notify>) -> Self {
        Self {
            mode: MockBackendMode::Gated(gate),
            ..Self::new(principal)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            MockBackendMode::Ok => Ok(()),
            MockBackendMode::Failing => Err(CallError::Agent(AgentError::Rejected {
                status: 500,
                code: "internal".to_string(),
                message: "mock backend failure".to_string(),
            })),
            MockBackendMode::Gated(gate) => {
                gate.notified().await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl BackendService for MockBackend {
    async fn greet(&self, name: &str) -> Result<String, CallError> {
        self.enter().await?;
        Ok(format!("Hello, {}!", name))
    }

    async fn whoami(&self) -> Result<Principal, CallError> {
        self.enter().await?;
        Ok(self.principal.clone())
    }
}

/// A working caller handle signing as `principal`
pub fn mock_handle(principal: Principal) -> CallerHandle {
    CallerHandle::new(Arc::new(MockBackend::new(principal.clone())), principal)
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Initialize test logging with detailed output
pub fn init_test_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "authapp=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

// ============================================================================
// Tests for Test Utilities
// ============================================================================
