//! HTTP route handlers for the development replica

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

use super::canister::{Canister, ReplicaError};
use crate::identity::{ed25519_key_from_der, ed25519_key_to_der};
use crate::principal::Principal;
use crate::protocol::{
    ErrorResponse, QueryRequest, QueryResponse, StatusResponse, reply_message, request_message,
};

/// Replica state shared by all handlers
#[derive(Clone)]
pub struct ReplicaState {
    root_key: Arc<SigningKey>,
    canisters: Arc<HashMap<String, Arc<dyn Canister>>>,
    status_requests: Arc<AtomicUsize>,
}

impl ReplicaState {
    pub fn new(root_key: SigningKey) -> Self {
        Self {
            root_key: Arc::new(root_key),
            canisters: Arc::new(HashMap::new()),
            status_requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Host `canister` under `service_id`
    pub fn with_canister(mut self, service_id: impl Into<String>, canister: Arc<dyn Canister>) -> Self {
        Arc::make_mut(&mut self.canisters).insert(service_id.into(), canister);
        self
    }

    /// Hex-encoded DER root key, as served by `/api/v2/status`
    pub fn root_key_hex(&self) -> Result<String, ReplicaError> {
        ed25519_key_to_der(&self.root_key.verifying_key())
            .map(hex::encode)
            .ok_or(ReplicaError::RootKeyEncoding)
    }

    /// Number of root-key fetches served so far
    pub fn status_requests(&self) -> usize {
        self.status_requests.load(Ordering::SeqCst)
    }
}

/// Error response for the replica API
#[derive(Debug)]
pub struct ReplicaErrorResponse {
    status: StatusCode,
    body: ErrorResponse,
}

impl From<ReplicaError> for ReplicaErrorResponse {
    fn from(e: ReplicaError) -> Self {
        let (status, code) = match &e {
            ReplicaError::ServiceNotFound(_) => (StatusCode::NOT_FOUND, "service_not_found"),
            ReplicaError::MethodNotFound(_) => (StatusCode::BAD_REQUEST, "method_not_found"),
            ReplicaError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
            ReplicaError::SenderMismatch(_) => (StatusCode::FORBIDDEN, "sender_mismatch"),
            ReplicaError::InvalidSignature => (StatusCode::FORBIDDEN, "invalid_signature"),
            ReplicaError::RootKeyEncoding => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        Self {
            status,
            body: ErrorResponse {
                error: e.to_string(),
                code: code.to_string(),
            },
        }
    }
}

impl IntoResponse for ReplicaErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Create router with replica routes
pub fn replica_routes(state: ReplicaState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v2/status", get(status))
        .route("/api/v2/canister/:service_id/query/:method", post(query))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// GET /api/v2/status - Replica root key
async fn status(
    State(state): State<ReplicaState>,
) -> Result<Json<StatusResponse>, ReplicaErrorResponse> {
    state.status_requests.fetch_add(1, Ordering::SeqCst);
    Ok(Json(StatusResponse {
        root_key: state.root_key_hex()?,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// POST /api/v2/canister/{service_id}/query/{method} - Signed query
async fn query(
    State(state): State<ReplicaState>,
    Path((service_id, method)): Path<(String, String)>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ReplicaErrorResponse> {
    let caller = authenticate(&service_id, &method, &request).inspect_err(|e| {
        warn!("Rejected query {}.{}: {}", service_id, method, e);
    })?;

    let canister = state
        .canisters
        .get(&service_id)
        .cloned()
        .ok_or_else(|| ReplicaError::ServiceNotFound(service_id.clone()))?;

    let arg = serde_json::from_str(&request.arg)
        .map_err(|e| ReplicaError::InvalidArgument(e.to_string()))?;

    debug!("Query {}.{} from {}", service_id, method, caller);
    let reply = canister.query(&method, &caller, arg).await.inspect_err(|_| {
        counter!("authapp_replica_query_errors_total").increment(1);
    })?;
    // Only methods the canister answered get their own series
    counter!("authapp_replica_queries_total", "method" => method.clone()).increment(1);
    let reply = reply.to_string();
    let certificate = state
        .root_key
        .sign(&reply_message(&service_id, &method, &reply));

    Ok(Json(QueryResponse {
        reply,
        certificate: hex::encode(certificate.to_bytes()),
    }))
}

/// Establish the caller's principal from the request's signature
fn authenticate(
    service_id: &str,
    method: &str,
    request: &QueryRequest,
) -> Result<Principal, ReplicaError> {
    match (&request.sender_pubkey, &request.sender_sig) {
        (Some(pubkey), Some(sig)) => {
            let der = hex::decode(pubkey).map_err(|_| ReplicaError::InvalidSignature)?;
            let key = ed25519_key_from_der(&der).ok_or(ReplicaError::InvalidSignature)?;

            let principal = Principal::self_authenticating(&der);
            if principal.as_text() != request.sender {
                return Err(ReplicaError::SenderMismatch(request.sender.clone()));
            }

            let signature = hex::decode(sig)
                .ok()
                .and_then(|bytes| Signature::from_slice(&bytes).ok())
                .ok_or(ReplicaError::InvalidSignature)?;
            key.verify(&request_message(service_id, method, &request.arg), &signature)
                .map_err(|_| ReplicaError::InvalidSignature)?;

            Ok(principal)
        }
        (None, None) => {
            let anonymous = Principal::anonymous();
            if anonymous.as_text() != request.sender {
                return Err(ReplicaError::SenderMismatch(request.sender.clone()));
            }
            Ok(anonymous)
        }
        _ => Err(ReplicaError::InvalidSignature),
    }
}
