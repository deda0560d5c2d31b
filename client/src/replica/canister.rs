//! Services hosted by the development replica

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::principal::Principal;

/// Errors that can occur when serving a query
#[derive(Debug, Error)]
pub enum ReplicaError {
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Sender {0} does not match its public key")]
    SenderMismatch(String),

    #[error("Invalid sender signature")]
    InvalidSignature,

    #[error("Root key cannot be DER-encoded")]
    RootKeyEncoding,
}

/// A service hosted on the replica
#[async_trait]
pub trait Canister: Send + Sync {
    /// Answer `method` for `caller`. `arg` and the reply are JSON values.
    async fn query(
        &self,
        method: &str,
        caller: &Principal,
        arg: Value,
    ) -> Result<Value, ReplicaError>;
}

/// The greeting backend: `greet(name)` and `whoami()`
#[derive(Debug, Clone, Copy, Default)]
pub struct GreetingCanister;

#[async_trait]
impl Canister for GreetingCanister {
    async fn query(
        &self,
        method: &str,
        caller: &Principal,
        arg: Value,
    ) -> Result<Value, ReplicaError> {
        match method {
            "greet" => {
                let name = arg.as_str().ok_or_else(|| {
                    ReplicaError::InvalidArgument("greet expects a text argument".to_string())
                })?;
                Ok(Value::String(format!("Hello, {}!", name)))
            }
            "whoami" => Ok(Value::String(caller.to_string())),
            other => Err(ReplicaError::MethodNotFound(other.to_string())),
        }
    }
}
