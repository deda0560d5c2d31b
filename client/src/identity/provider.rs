//! IdentityProvider trait definitions

use async_trait::async_trait;
use std::sync::Arc;

use super::types::{Identity, LoginFlow, LoginRequest, ProviderError};

/// Client of an external identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Whether a session obtained earlier (possibly by a previous process) is still valid
    async fn is_authenticated(&self) -> Result<bool, ProviderError>;

    /// The identity currently held by the client. Anonymous when not authenticated.
    async fn identity(&self) -> Result<Identity, ProviderError>;

    /// Run the interactive authentication flow.
    ///
    /// Resolves once, when the flow completes or is closed by the user. A flow
    /// that is simply abandoned never resolves; callers bound it themselves.
    async fn login(&self, request: LoginRequest) -> Result<LoginFlow, ProviderError>;

    /// Terminate the provider session
    async fn logout(&self) -> Result<(), ProviderError>;
}

/// Creates identity-provider clients
#[async_trait]
pub trait IdentityProviderFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn IdentityProvider>, ProviderError>;
}
