use serde::{Deserialize, Serialize};

/// Reply of `GET /api/v2/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Hex-encoded DER public key the replica certifies replies with
    pub root_key: String,
    /// Replica build version
    pub version: String,
}

/// Body of `POST /api/v2/canister/{service_id}/query/{method}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Textual principal the caller claims
    pub sender: String,
    /// Hex-encoded DER public key; absent for anonymous calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_pubkey: Option<String>,
    /// Hex-encoded signature over [`request_message`]; absent for anonymous calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_sig: Option<String>,
    /// JSON-encoded argument
    pub arg: String,
}

/// Successful query reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// JSON-encoded reply value
    pub reply: String,
    /// Hex-encoded root-key signature over [`reply_message`]
    pub certificate: String,
}

/// Error body returned by the replica
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Bytes a caller signs for a query
pub fn request_message(service_id: &str, method: &str, arg: &str) -> Vec<u8> {
    domain_message(b"query", service_id, method, arg)
}

/// Bytes the replica signs for a reply
pub fn reply_message(service_id: &str, method: &str, reply: &str) -> Vec<u8> {
    domain_message(b"reply", service_id, method, reply)
}

fn domain_message(domain: &[u8], service_id: &str, method: &str, payload: &str) -> Vec<u8> {
    let mut message =
        Vec::with_capacity(domain.len() + service_id.len() + method.len() + payload.len() + 3);
    message.extend_from_slice(domain);
    message.push(0);
    message.extend_from_slice(service_id.as_bytes());
    message.push(0);
    message.extend_from_slice(method.as_bytes());
    message.push(0);
    message.extend_from_slice(payload.as_bytes());
    message
}
