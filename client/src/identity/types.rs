//! Identity-related types and error definitions

use ed25519_dalek::pkcs8::{DecodePublicKey, EncodePublicKey};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::principal::Principal;

/// DER-encode an Ed25519 public key as SubjectPublicKeyInfo
pub fn ed25519_key_to_der(key: &VerifyingKey) -> Option<Vec<u8>> {
    key.to_public_key_der()
        .ok()
        .map(|document| document.as_bytes().to_vec())
}

/// Decode a DER SubjectPublicKeyInfo holding an Ed25519 public key
pub fn ed25519_key_from_der(der: &[u8]) -> Option<VerifyingKey> {
    VerifyingKey::from_public_key_der(der).ok()
}

/// Errors reported by an identity provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("Interactive login flow failed: {0}")]
    Flow(String),

    #[error("Stored session is corrupt: {0}")]
    CorruptStorage(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A signing identity
///
/// Either the anonymous identity, which signs nothing, or an Ed25519 key whose
/// principal is derived from its public key.
#[derive(Clone)]
pub struct Identity {
    key: Option<SigningKey>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self { key: None }
    }

    /// Generate a fresh Ed25519 identity
    pub fn generate() -> Self {
        Self::from_secret_key(rand::random())
    }

    pub fn from_secret_key(secret: [u8; 32]) -> Self {
        Self {
            key: Some(SigningKey::from_bytes(&secret)),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.key.is_none()
    }

    pub fn principal(&self) -> Principal {
        match self.public_key_der() {
            Some(der) => Principal::self_authenticating(&der),
            None => Principal::anonymous(),
        }
    }

    /// DER-encoded public key, `None` for the anonymous identity
    pub fn public_key_der(&self) -> Option<Vec<u8>> {
        self.key
            .as_ref()
            .and_then(|key| ed25519_key_to_der(&key.verifying_key()))
    }

    /// Sign a message, `None` for the anonymous identity
    pub fn sign(&self, message: &[u8]) -> Option<Vec<u8>> {
        self.key
            .as_ref()
            .map(|key| key.sign(message).to_bytes().to_vec())
    }

    pub(crate) fn secret_key(&self) -> Option<[u8; 32]> {
        self.key.as_ref().map(SigningKey::to_bytes)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("principal", &self.principal())
            .finish()
    }
}

/// Parameters of one interactive login
#[derive(Debug, Clone)]
pub struct LoginRequest {
    /// Where the interactive flow is opened
    pub identity_provider_url: String,
    /// Lifetime of the session granted on success
    pub max_time_to_live: Duration,
}

/// How an interactive login flow ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFlow {
    /// The user authenticated; the provider now holds a new identity
    Completed,
    /// The user closed the flow without authenticating
    Closed,
}
