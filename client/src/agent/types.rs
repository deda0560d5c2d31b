//! Agent error definitions

use thiserror::Error;

/// Errors that can occur when issuing calls through an agent
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("No trusted root key; fetch it from the replica or configure one")]
    UntrustedRootKey,

    #[error("Invalid root key: {0}")]
    InvalidRootKey(String),

    #[error("Reply certificate for {method} did not verify")]
    InvalidCertificate { method: String },

    #[error("Call rejected ({status}): {code}: {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Failed to decode reply: {0}")]
    Decode(String),
}
