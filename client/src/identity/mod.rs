//! Identity provider clients
//!
//! This module provides:
//! - `Identity`, the signing identity bound to outbound calls
//! - `IdentityProvider` and `IdentityProviderFactory` traits for provider clients
//! - `LocalIdentityProvider`, a file-backed client driven by an `InteractiveFlow`

mod local;
mod provider;
mod types;

pub use local::{
    AuthorizeRequest, FlowDecision, InteractiveFlow, LocalIdentityProvider,
    LocalIdentityProviderFactory,
};
pub use provider::{IdentityProvider, IdentityProviderFactory};
pub use types::{
    Identity, LoginFlow, LoginRequest, ProviderError, ed25519_key_from_der, ed25519_key_to_der,
};
