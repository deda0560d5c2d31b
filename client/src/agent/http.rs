//! HTTP agent speaking the replica's JSON query protocol

use async_trait::async_trait;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::service::{Agent, AgentFactory};
use super::types::AgentError;
use crate::identity::{Identity, ed25519_key_from_der};
use crate::principal::Principal;
use crate::protocol::{
    ErrorResponse, QueryRequest, QueryResponse, StatusResponse, reply_message, request_message,
};

/// Decode a hex-encoded DER root key
pub fn parse_root_key(hex_der: &str) -> Result<VerifyingKey, AgentError> {
    let der = hex::decode(hex_der.trim()).map_err(|e| AgentError::InvalidRootKey(e.to_string()))?;
    ed25519_key_from_der(&der)
        .ok_or_else(|| AgentError::InvalidRootKey("not a DER Ed25519 public key".to_string()))
}

/// Agent that issues signed queries to a replica over HTTP
pub struct HttpAgent {
    client: reqwest::Client,
    host: String,
    identity: Identity,
    root_key: RwLock<Option<VerifyingKey>>,
}

impl HttpAgent {
    pub fn new(
        client: reqwest::Client,
        host: impl Into<String>,
        identity: Identity,
        trusted_root_key: Option<VerifyingKey>,
    ) -> Self {
        Self {
            client,
            host: host.into().trim_end_matches('/').to_string(),
            identity,
            root_key: RwLock::new(trusted_root_key),
        }
    }

    fn query_url(&self, service_id: &str, method: &str) -> String {
        format!(
            "{}/api/v2/canister/{}/query/{}",
            self.host, service_id, method
        )
    }

    fn signed_request(&self, service_id: &str, method: &str, arg: String) -> QueryRequest {
        let message = request_message(service_id, method, &arg);
        QueryRequest {
            sender: self.identity.principal().to_string(),
            sender_pubkey: self.identity.public_key_der().map(hex::encode),
            sender_sig: self.identity.sign(&message).map(hex::encode),
            arg,
        }
    }
}

#[async_trait]
impl Agent for HttpAgent {
    fn principal(&self) -> Principal {
        self.identity.principal()
    }

    async fn fetch_root_key(&self) -> Result<(), AgentError> {
        let url = format!("{}/api/v2/status", self.host);
        let status: StatusResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let key = parse_root_key(&status.root_key)?;
        *self.root_key.write().await = Some(key);
        info!("Fetched root key from {} (replica {})", self.host, status.version);
        Ok(())
    }

    async fn has_root_key(&self) -> bool {
        self.root_key.read().await.is_some()
    }

    async fn query(&self, service_id: &str, method: &str, arg: Value) -> Result<Value, AgentError> {
        let root_key = (*self.root_key.read().await).ok_or(AgentError::UntrustedRootKey)?;

        let arg = serde_json::to_string(&arg).map_err(|e| AgentError::Decode(e.to_string()))?;
        let request = self.signed_request(service_id, method, arg);

        debug!(
            "Query {}.{} as {}",
            service_id, method, request.sender
        );

        let response = self
            .client
            .post(self.query_url(service_id, method))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (code, message) = match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => (err.code, err.error),
                Err(_) => ("unknown".to_string(), body),
            };
            return Err(AgentError::Rejected {
                status: status.as_u16(),
                code,
                message,
            });
        }

        let reply: QueryResponse = response.json().await?;
        let certificate = hex::decode(&reply.certificate)
            .ok()
            .and_then(|bytes| Signature::from_slice(&bytes).ok())
            .ok_or_else(|| AgentError::InvalidCertificate {
                method: method.to_string(),
            })?;
        root_key
            .verify(&reply_message(service_id, method, &reply.reply), &certificate)
            .map_err(|_| AgentError::InvalidCertificate {
                method: method.to_string(),
            })?;

        serde_json::from_str(&reply.reply).map_err(|e| AgentError::Decode(e.to_string()))
    }
}

/// Creates [`HttpAgent`]s sharing one HTTP connection pool
#[derive(Clone)]
pub struct HttpAgentFactory {
    client: reqwest::Client,
    host: String,
    trusted_root_key: Option<VerifyingKey>,
}

impl HttpAgentFactory {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.into(),
            trusted_root_key: None,
        }
    }

    /// Root key trusted without fetching, for non-local networks
    pub fn with_trusted_root_key(mut self, key: Option<VerifyingKey>) -> Self {
        self.trusted_root_key = key;
        self
    }
}

impl AgentFactory for HttpAgentFactory {
    fn create_agent(&self, identity: Identity) -> Arc<dyn Agent> {
        Arc::new(HttpAgent::new(
            self.client.clone(),
            self.host.clone(),
            identity,
            self.trusted_root_key,
        ))
    }
}
