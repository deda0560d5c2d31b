//! authapp client library
//!
//! Authenticates against an identity provider and binds outbound calls to
//! whichever identity is currently active. Also hosts the development replica
//! used for local testing.

pub mod agent;
pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod identity;
pub mod network;
pub mod principal;
pub mod protocol;
pub mod replica;
pub mod session;

mod test_utils;

// Re-export commonly used types
pub use agent::{Agent, AgentError, AgentFactory, HttpAgent, HttpAgentFactory};
pub use backend::{AgentServiceFactory, BackendService, CallError, CallerHandle, ServiceFactory};
pub use config::{Config, NetworkMode};
pub use dispatcher::{CallDispatcher, PRINCIPAL_ERROR_MESSAGE};
pub use identity::{Identity, IdentityProvider, IdentityProviderFactory};
pub use network::Network;
pub use principal::Principal;
pub use session::{LoginOutcome, SessionError, SessionManager, SessionState};
