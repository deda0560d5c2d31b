//! File-backed identity provider client
//!
//! The provider grants a fresh session key on every successful interactive
//! login and persists it under the storage directory, so a later process can
//! pick the session up again until it expires. The interactive part of the
//! flow (opening the provider page, waiting for the user) is delegated to an
//! [`InteractiveFlow`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::provider::{IdentityProvider, IdentityProviderFactory};
use super::types::{Identity, LoginFlow, LoginRequest, ProviderError};
use crate::principal::Principal;
use crate::session::state::now_millis;

const SESSION_FILE: &str = "session.json";

/// What the interactive flow is asked to approve
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub identity_provider_url: String,
    /// Principal the session key will sign as once approved
    pub session_principal: Principal,
    pub max_time_to_live_ms: u64,
}

/// User decision reported by an interactive flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDecision {
    Approved,
    Closed,
}

/// The user-facing half of a login: a browser window, a terminal prompt, a test script
#[async_trait]
pub trait InteractiveFlow: Send + Sync {
    async fn authorize(&self, request: &AuthorizeRequest) -> Result<FlowDecision, ProviderError>;
}

/// Persisted provider session
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSession {
    /// Hex-encoded Ed25519 secret key
    secret_key: String,
    principal: Principal,
    created_at: u64,
    expires_at: u64,
}

impl StoredSession {
    fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    fn identity(&self) -> Result<Identity, ProviderError> {
        let bytes = hex::decode(&self.secret_key)
            .map_err(|e| ProviderError::CorruptStorage(format!("secret key: {}", e)))?;
        let secret: [u8; 32] = bytes.try_into().map_err(|_| {
            ProviderError::CorruptStorage("secret key must be 32 bytes".to_string())
        })?;
        Ok(Identity::from_secret_key(secret))
    }
}

/// Identity provider client backed by a session file
pub struct LocalIdentityProvider {
    storage_path: PathBuf,
    flow: Arc<dyn InteractiveFlow>,
    session: RwLock<Option<(StoredSession, Identity)>>,
}

impl LocalIdentityProvider {
    /// Load any stored session from `storage_dir`
    ///
    /// A stored session that fails to decode is discarded rather than failing
    /// client creation.
    pub async fn load(
        storage_dir: &Path,
        flow: Arc<dyn InteractiveFlow>,
    ) -> Result<Self, ProviderError> {
        tokio::fs::create_dir_all(storage_dir).await?;
        let storage_path = storage_dir.join(SESSION_FILE);

        let session = match read_session(&storage_path).await {
            Ok(Some(stored)) => match stored.identity() {
                Ok(identity) => {
                    debug!("Loaded stored session for {}", stored.principal);
                    Some((stored, identity))
                }
                Err(e) => {
                    warn!("Discarding stored session: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Discarding stored session: {}", e);
                None
            }
        };

        Ok(Self {
            storage_path,
            flow,
            session: RwLock::new(session),
        })
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }
}

async fn read_session(path: &Path) -> Result<Option<StoredSession>, ProviderError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ProviderError::CorruptStorage(e.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_session(path: &Path, session: &StoredSession) -> Result<(), ProviderError> {
    let bytes = serde_json::to_vec_pretty(session)
        .map_err(|e| ProviderError::CorruptStorage(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn is_authenticated(&self) -> Result<bool, ProviderError> {
        let session = self.session.read().await;
        Ok(session
            .as_ref()
            .is_some_and(|(stored, _)| !stored.is_expired(now_millis())))
    }

    async fn identity(&self) -> Result<Identity, ProviderError> {
        let session = self.session.read().await;
        match session.as_ref() {
            Some((stored, identity)) if !stored.is_expired(now_millis()) => Ok(identity.clone()),
            _ => Ok(Identity::anonymous()),
        }
    }

    async fn login(&self, request: LoginRequest) -> Result<LoginFlow, ProviderError> {
        let candidate = Identity::generate();
        let ttl_ms = u64::try_from(request.max_time_to_live.as_millis()).unwrap_or(u64::MAX);
        let authorize = AuthorizeRequest {
            identity_provider_url: request.identity_provider_url,
            session_principal: candidate.principal(),
            max_time_to_live_ms: ttl_ms,
        };

        info!(
            "Opening identity provider flow at {}",
            authorize.identity_provider_url
        );

        match self.flow.authorize(&authorize).await? {
            FlowDecision::Closed => {
                info!("Identity provider flow closed by user");
                Ok(LoginFlow::Closed)
            }
            FlowDecision::Approved => {
                let secret = candidate.secret_key().ok_or_else(|| {
                    ProviderError::Flow("generated identity has no key".to_string())
                })?;
                let now = now_millis();
                let stored = StoredSession {
                    secret_key: hex::encode(secret),
                    principal: candidate.principal(),
                    created_at: now,
                    expires_at: now.saturating_add(ttl_ms),
                };

                write_session(&self.storage_path, &stored).await?;
                info!("Identity provider approved session for {}", stored.principal);
                *self.session.write().await = Some((stored, candidate));
                Ok(LoginFlow::Completed)
            }
        }
    }

    async fn logout(&self) -> Result<(), ProviderError> {
        *self.session.write().await = None;
        match tokio::fs::remove_file(&self.storage_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!("Cleared stored session at {:?}", self.storage_path);
        Ok(())
    }
}

/// Creates [`LocalIdentityProvider`] clients sharing one storage directory
pub struct LocalIdentityProviderFactory {
    storage_dir: PathBuf,
    flow: Arc<dyn InteractiveFlow>,
}

impl LocalIdentityProviderFactory {
    pub fn new(storage_dir: impl Into<PathBuf>, flow: Arc<dyn InteractiveFlow>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            flow,
        }
    }
}

#[async_trait]
impl IdentityProviderFactory for LocalIdentityProviderFactory {
    async fn create(&self) -> Result<Arc<dyn IdentityProvider>, ProviderError> {
        let provider = LocalIdentityProvider::load(&self.storage_dir, self.flow.clone()).await?;
        Ok(Arc::new(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FixedFlow {
        decision: FlowDecision,
        seen: Mutex<Vec<AuthorizeRequest>>,
    }

    impl FixedFlow {
        fn new(decision: FlowDecision) -> Arc<Self> {
            Arc::new(Self {
                decision,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl InteractiveFlow for FixedFlow {
        async fn authorize(
            &self,
            request: &AuthorizeRequest,
        ) -> Result<FlowDecision, ProviderError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.decision)
        }
    }

    fn request(ttl: Duration) -> LoginRequest {
        LoginRequest {
            identity_provider_url: "http://provider.localhost:8080".to_string(),
            max_time_to_live: ttl,
        }
    }

    #[tokio::test]
    async fn test_fresh_provider_is_anonymous() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalIdentityProvider::load(dir.path(), FixedFlow::new(FlowDecision::Approved))
            .await
            .unwrap();

        assert!(!provider.is_authenticated().await.unwrap());
        assert!(provider.identity().await.unwrap().is_anonymous());
    }

    #[tokio::test]
    async fn test_approved_login_persists_session() {
        let dir = tempfile::tempdir().unwrap();
        let flow = FixedFlow::new(FlowDecision::Approved);
        let provider = LocalIdentityProvider::load(dir.path(), flow.clone())
            .await
            .unwrap();

        let result = provider.login(request(Duration::from_secs(3600))).await.unwrap();
        assert_eq!(result, LoginFlow::Completed);
        assert!(provider.is_authenticated().await.unwrap());

        let identity = provider.identity().await.unwrap();
        let seen = flow.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].session_principal, identity.principal());
        assert_eq!(seen[0].identity_provider_url, "http://provider.localhost:8080");

        // A second client over the same storage sees the same session
        let reloaded = LocalIdentityProvider::load(dir.path(), flow).await.unwrap();
        assert!(reloaded.is_authenticated().await.unwrap());
        assert_eq!(
            reloaded.identity().await.unwrap().principal(),
            identity.principal()
        );
    }

    #[tokio::test]
    async fn test_closed_flow_leaves_provider_anonymous() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalIdentityProvider::load(dir.path(), FixedFlow::new(FlowDecision::Closed))
            .await
            .unwrap();

        let result = provider.login(request(Duration::from_secs(3600))).await.unwrap();
        assert_eq!(result, LoginFlow::Closed);
        assert!(!provider.is_authenticated().await.unwrap());
        assert!(!provider.storage_path().exists());
    }

    #[tokio::test]
    async fn test_expired_session_is_not_authenticated() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalIdentityProvider::load(dir.path(), FixedFlow::new(FlowDecision::Approved))
            .await
            .unwrap();

        provider.login(request(Duration::ZERO)).await.unwrap();
        assert!(!provider.is_authenticated().await.unwrap());
        assert!(provider.identity().await.unwrap().is_anonymous());
    }

    #[tokio::test]
    async fn test_huge_ttl_saturates_instead_of_expiring() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalIdentityProvider::load(dir.path(), FixedFlow::new(FlowDecision::Approved))
            .await
            .unwrap();

        let ttl = Duration::from_millis(u64::MAX) + Duration::from_millis(2);
        provider.login(request(ttl)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(provider.is_authenticated().await.unwrap());
        let stored = read_session(provider.storage_path()).await.unwrap().unwrap();
        assert_eq!(stored.expires_at, u64::MAX);
    }

    #[tokio::test]
    async fn test_logout_removes_stored_session() {
        let dir = tempfile::tempdir().unwrap();
        let flow = FixedFlow::new(FlowDecision::Approved);
        let provider = LocalIdentityProvider::load(dir.path(), flow.clone())
            .await
            .unwrap();

        provider.login(request(Duration::from_secs(60))).await.unwrap();
        assert!(provider.storage_path().exists());

        provider.logout().await.unwrap();
        assert!(!provider.is_authenticated().await.unwrap());
        assert!(!provider.storage_path().exists());

        // Logging out twice is harmless
        provider.logout().await.unwrap();

        let reloaded = LocalIdentityProvider::load(dir.path(), flow).await.unwrap();
        assert!(!reloaded.is_authenticated().await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_storage_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SESSION_FILE), b"{not json").unwrap();

        let provider = LocalIdentityProvider::load(dir.path(), FixedFlow::new(FlowDecision::Approved))
            .await
            .unwrap();
        assert!(!provider.is_authenticated().await.unwrap());
    }
}
