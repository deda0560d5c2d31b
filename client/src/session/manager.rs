use metrics::counter;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::agent::AgentError;
use crate::dispatcher::CallDispatcher;
use crate::identity::{
    IdentityProvider, IdentityProviderFactory, LoginFlow, LoginRequest, ProviderError,
};
use crate::network::Network;
use crate::principal::Principal;
use crate::session::state::{
    AbandonReason, CancelSignal, LoginOutcome, SessionConfig, SessionState,
};

/// Session manager errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Identity provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Identity exchange failed: {0}")]
    Exchange(#[from] AgentError),
}

/// Session manager: drives the authentication state machine
///
/// Owns the identity-provider client and re-points the [`CallDispatcher`] on
/// every transition. Transitions are serialized; a transition that fails
/// leaves both the state and the dispatcher untouched.
pub struct SessionManager {
    providers: Arc<dyn IdentityProviderFactory>,
    network: Network,
    dispatcher: Arc<CallDispatcher>,
    config: SessionConfig,
    client: RwLock<Option<Arc<dyn IdentityProvider>>>,
    state: RwLock<SessionState>,
    transition: Mutex<()>,
}

impl SessionManager {
    pub fn new(
        providers: Arc<dyn IdentityProviderFactory>,
        network: Network,
        dispatcher: Arc<CallDispatcher>,
        config: SessionConfig,
    ) -> Self {
        Self {
            providers,
            network,
            dispatcher,
            config,
            client: RwLock::new(None),
            state: RwLock::new(SessionState::Uninitialized),
            transition: Mutex::new(()),
        }
    }

    /// Build the anonymous default handle and a dispatcher around it
    pub async fn bootstrap(
        providers: Arc<dyn IdentityProviderFactory>,
        network: Network,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let default = network.anonymous_caller().await?;
        let dispatcher = Arc::new(CallDispatcher::new(default));
        Ok(Self::new(providers, network, dispatcher, config))
    }

    pub fn dispatcher(&self) -> &Arc<CallDispatcher> {
        &self.dispatcher
    }

    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_authenticated()
    }

    /// Set up the provider client and resume any prior session
    ///
    /// A no-op once initialized.
    pub async fn initialize(&self) -> Result<SessionState, SessionError> {
        let _transition = self.transition.lock().await;
        self.initialize_locked().await
    }

    async fn initialize_locked(&self) -> Result<SessionState, SessionError> {
        let current = self.state().await;
        if current.is_initialized() {
            debug!("Session already initialized ({})", current);
            return Ok(current);
        }

        let client = self.client_or_create().await?;
        let next = if client.is_authenticated().await? {
            info!("Resuming authenticated session");
            let principal = self.exchange_identity(client.as_ref()).await?;
            if principal.is_anonymous() {
                // The stored session lapsed between the two provider reads
                warn!("Stored session expired while resuming");
                SessionState::Anonymous
            } else {
                SessionState::Authenticated { principal }
            }
        } else {
            SessionState::Anonymous
        };

        Ok(self.set_state(next).await)
    }

    /// Run the interactive login
    ///
    /// Waits until the flow completes, is closed by the user, or the
    /// configured login timeout elapses.
    pub async fn login(&self) -> Result<LoginOutcome, SessionError> {
        self.login_with_cancel(CancelSignal::never()).await
    }

    /// Like [`SessionManager::login`], additionally abandoned when `cancel` fires
    pub async fn login_with_cancel(
        &self,
        cancel: CancelSignal,
    ) -> Result<LoginOutcome, SessionError> {
        let _transition = self.transition.lock().await;
        self.initialize_locked().await?;
        let client = self.client_or_create().await?;

        let request = LoginRequest {
            identity_provider_url: self.config.identity_provider_url.clone(),
            max_time_to_live: self.config.session_ttl,
        };
        info!(
            "Logging in with identity URL: {}",
            request.identity_provider_url
        );

        let login_timeout = self.config.login_timeout;
        let timeout = async move {
            match login_timeout {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };

        let flow = tokio::select! {
            flow = client.login(request) => flow?,
            _ = cancel.cancelled() => return Ok(self.abandon(AbandonReason::Cancelled)),
            _ = timeout => return Ok(self.abandon(AbandonReason::TimedOut)),
        };

        match flow {
            LoginFlow::Completed => {
                let principal = self.exchange_identity(client.as_ref()).await?;
                self.set_state(SessionState::Authenticated {
                    principal: principal.clone(),
                })
                .await;
                counter!("authapp_logins_total", "outcome" => "authenticated").increment(1);
                Ok(LoginOutcome::Authenticated(principal))
            }
            LoginFlow::Closed => Ok(self.abandon(AbandonReason::Closed)),
        }
    }

    /// End the provider session and fall back to the anonymous handle
    ///
    /// A no-op when no provider client exists yet.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let _transition = self.transition.lock().await;

        let Some(client) = self.client.read().await.clone() else {
            debug!("Logout without an identity provider client; nothing to do");
            return Ok(());
        };

        client.logout().await?;
        self.dispatcher.reset().await;
        self.set_state(SessionState::Anonymous).await;
        counter!("authapp_logouts_total").increment(1);
        Ok(())
    }

    async fn client_or_create(&self) -> Result<Arc<dyn IdentityProvider>, SessionError> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(client.clone());
        }

        let client = self.providers.create().await?;
        debug!("Created identity provider client");
        *self.client.write().await = Some(client.clone());
        Ok(client)
    }

    /// Bind the dispatcher to the provider's current identity
    async fn exchange_identity(
        &self,
        client: &dyn IdentityProvider,
    ) -> Result<Principal, SessionError> {
        let identity = client.identity().await?;
        let handle = self.network.caller_for(identity).await?;
        let principal = handle.principal().clone();
        self.dispatcher.rebind(handle).await;
        Ok(principal)
    }

    async fn set_state(&self, next: SessionState) -> SessionState {
        let mut state = self.state.write().await;
        info!("Session state {} -> {}", state.name(), next);
        *state = next.clone();
        next
    }

    fn abandon(&self, reason: AbandonReason) -> LoginOutcome {
        warn!("Login abandoned: {}", reason.as_str());
        counter!("authapp_logins_total", "outcome" => reason.as_str()).increment(1);
        LoginOutcome::Abandoned(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AgentServiceFactory;
    use crate::config::NetworkMode;
    use crate::test_utils::{
        MockAgentFactory, MockIdentityProvider, MockLogin, MockProviderFactory, init_test_logging,
    };
    use std::time::Duration;

    struct Fixture {
        manager: SessionManager,
        provider: Arc<MockIdentityProvider>,
        providers: Arc<MockProviderFactory>,
        agents: Arc<MockAgentFactory>,
    }

    async fn fixture_with(mode: NetworkMode, provider: MockIdentityProvider) -> Fixture {
        init_test_logging();
        let provider = Arc::new(provider);
        let providers = Arc::new(MockProviderFactory::new(provider.clone()));
        let agents = Arc::new(match mode {
            NetworkMode::Local => MockAgentFactory::new(),
            NetworkMode::Remote => MockAgentFactory::trusting(),
        });
        let network = Network::new(
            mode,
            "backend",
            agents.clone(),
            Arc::new(AgentServiceFactory),
        );
        let config = SessionConfig {
            identity_provider_url: "http://provider.localhost:8080".to_string(),
            login_timeout: Some(Duration::from_millis(200)),
            session_ttl: Duration::from_secs(60),
        };
        let manager = SessionManager::bootstrap(providers.clone(), network, config)
            .await
            .unwrap();
        Fixture {
            manager,
            provider,
            providers,
            agents,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(NetworkMode::Local, MockIdentityProvider::new()).await
    }

    #[tokio::test]
    async fn test_initialize_without_prior_session() {
        let f = fixture().await;
        assert_eq!(f.manager.state().await, SessionState::Uninitialized);

        let state = f.manager.initialize().await.unwrap();
        assert_eq!(state, SessionState::Anonymous);

        let dispatcher = f.manager.dispatcher();
        assert!(
            dispatcher
                .current()
                .await
                .same_binding(dispatcher.default_handle())
        );
        assert_eq!(f.manager.dispatcher().greet("Ada").await.unwrap(), "Hello, Ada!");
    }

    #[tokio::test]
    async fn test_initialize_resumes_prior_session() {
        let f = fixture_with(NetworkMode::Local, MockIdentityProvider::authenticated()).await;
        let expected = f.provider.current_principal();

        let state = f.manager.initialize().await.unwrap();
        assert_eq!(
            state,
            SessionState::Authenticated {
                principal: expected.clone()
            }
        );
        assert_eq!(f.manager.dispatcher().current().await.principal(), &expected);
        assert_eq!(
            f.manager.dispatcher().whoami().await,
            format!("Your principal is: {}", expected)
        );
    }

    #[tokio::test]
    async fn test_initialize_twice_is_noop() {
        let f = fixture().await;
        f.manager.initialize().await.unwrap();
        f.manager.initialize().await.unwrap();
        assert_eq!(f.providers.creates(), 1);
        assert_eq!(f.manager.state().await, SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_login_binds_identity_returned_at_login() {
        let f = fixture().await;
        f.manager.initialize().await.unwrap();
        let before = f.provider.current_principal();

        let outcome = f.manager.login().await.unwrap();
        let after = f.provider.current_principal();
        assert_ne!(before, after);
        assert_eq!(outcome, LoginOutcome::Authenticated(after.clone()));
        assert_eq!(
            f.manager.state().await,
            SessionState::Authenticated {
                principal: after.clone()
            }
        );
        assert_eq!(f.manager.dispatcher().current().await.principal(), &after);
        assert_eq!(
            f.manager.dispatcher().whoami().await,
            format!("Your principal is: {}", after)
        );
        assert_eq!(
            f.provider.login_urls(),
            vec!["http://provider.localhost:8080".to_string()]
        );
    }

    #[tokio::test]
    async fn test_login_initializes_first() {
        let f = fixture().await;
        let outcome = f.manager.login().await.unwrap();
        assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
        assert_eq!(f.providers.creates(), 1);
        assert!(f.manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_closed_login_leaves_state_unchanged() {
        let f = fixture().await;
        f.manager.initialize().await.unwrap();
        f.provider.set_login(MockLogin::Close);

        let outcome = f.manager.login().await.unwrap();
        assert_eq!(outcome, LoginOutcome::Abandoned(AbandonReason::Closed));
        assert_eq!(f.manager.state().await, SessionState::Anonymous);
        assert!(f.manager.dispatcher().current().await.is_anonymous());
    }

    #[tokio::test]
    async fn test_hanging_login_times_out() {
        let f = fixture().await;
        f.manager.initialize().await.unwrap();
        f.provider.set_login(MockLogin::Hang);

        let outcome = f.manager.login().await.unwrap();
        assert_eq!(outcome, LoginOutcome::Abandoned(AbandonReason::TimedOut));
        assert_eq!(f.manager.state().await, SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_hanging_login_can_be_cancelled() {
        let f = fixture().await;
        f.manager.initialize().await.unwrap();
        f.provider.set_login(MockLogin::Hang);

        let (cancel, signal) = crate::session::state::LoginCancel::new();
        cancel.cancel();
        let outcome = f.manager.login_with_cancel(signal).await.unwrap();
        assert_eq!(outcome, LoginOutcome::Abandoned(AbandonReason::Cancelled));
        assert_eq!(f.manager.state().await, SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_provider_login_failure_leaves_state_and_handle() {
        let f = fixture().await;
        f.manager.initialize().await.unwrap();
        f.provider.set_login(MockLogin::Fail);

        let result = f.manager.login().await;
        assert!(matches!(
            result,
            Err(SessionError::Provider(ProviderError::Flow(_)))
        ));
        assert_eq!(f.manager.state().await, SessionState::Anonymous);
        let dispatcher = f.manager.dispatcher();
        assert!(
            dispatcher
                .current()
                .await
                .same_binding(dispatcher.default_handle())
        );

        // The next attempt is not blocked by the failed one
        f.provider.set_login(MockLogin::Complete);
        assert!(matches!(
            f.manager.login().await.unwrap(),
            LoginOutcome::Authenticated(_)
        ));
    }

    #[tokio::test]
    async fn test_resume_with_lapsed_session_is_anonymous() {
        let f = fixture_with(NetworkMode::Local, MockIdentityProvider::lapsed()).await;

        let state = f.manager.initialize().await.unwrap();
        assert_eq!(state, SessionState::Anonymous);
        assert!(!f.manager.is_authenticated().await);
        assert!(f.manager.dispatcher().current().await.is_anonymous());
    }

    #[tokio::test]
    async fn test_exchange_failure_leaves_state_and_handle() {
        let f = fixture().await;
        f.manager.initialize().await.unwrap();
        f.agents.fail_root_key(true);

        let result = f.manager.login().await;
        assert!(matches!(result, Err(SessionError::Exchange(_))));
        assert_eq!(f.manager.state().await, SessionState::Anonymous);
        assert!(f.manager.dispatcher().current().await.is_anonymous());
    }

    #[tokio::test]
    async fn test_initialize_exchange_failure_does_not_advance() {
        let f = fixture_with(NetworkMode::Local, MockIdentityProvider::authenticated()).await;
        f.agents.fail_root_key(true);

        assert!(f.manager.initialize().await.is_err());
        assert_eq!(f.manager.state().await, SessionState::Uninitialized);

        // A retry once the network recovers succeeds
        f.agents.fail_root_key(false);
        let state = f.manager.initialize().await.unwrap();
        assert!(state.is_authenticated());
    }

    #[tokio::test]
    async fn test_provider_creation_failure_propagates() {
        let f = fixture().await;
        f.providers.fail_creates(true);

        let result = f.manager.initialize().await;
        assert!(matches!(result, Err(SessionError::Provider(_))));
        assert_eq!(f.manager.state().await, SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_logout_resets_to_default() {
        let f = fixture().await;
        f.manager.login().await.unwrap();

        f.manager.logout().await.unwrap();
        assert_eq!(f.manager.state().await, SessionState::Anonymous);
        assert_eq!(f.provider.logouts(), 1);
        let dispatcher = f.manager.dispatcher();
        assert!(
            dispatcher
                .current()
                .await
                .same_binding(dispatcher.default_handle())
        );
        assert_eq!(dispatcher.whoami().await, "Your principal is: 2vxsx-fae");
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let f = fixture().await;
        f.manager.initialize().await.unwrap();

        f.manager.logout().await.unwrap();
        f.manager.logout().await.unwrap();
        assert_eq!(f.manager.state().await, SessionState::Anonymous);
        assert!(f.manager.dispatcher().current().await.is_anonymous());
    }

    #[tokio::test]
    async fn test_logout_without_client_is_noop() {
        let f = fixture().await;
        f.manager.logout().await.unwrap();
        assert_eq!(f.providers.creates(), 0);
        assert_eq!(f.provider.logouts(), 0);
        assert_eq!(f.manager.state().await, SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_local_exchange_bootstraps_root_key() {
        let f = fixture().await;
        // One fetch for the default handle
        assert_eq!(f.agents.root_key_fetches(), 1);

        f.manager.login().await.unwrap();
        assert_eq!(f.agents.root_key_fetches(), 2);
    }

    #[tokio::test]
    async fn test_remote_exchange_never_bootstraps() {
        let f = fixture_with(NetworkMode::Remote, MockIdentityProvider::new()).await;
        f.manager.login().await.unwrap();
        f.manager.logout().await.unwrap();
        assert_eq!(f.agents.root_key_fetches(), 0);
        assert_eq!(f.manager.dispatcher().greet("Ada").await.unwrap(), "Hello, Ada!");
    }

    #[tokio::test]
    async fn test_relogin_binds_new_identity() {
        let f = fixture().await;
        let LoginOutcome::Authenticated(first) = f.manager.login().await.unwrap() else {
            panic!("first login should authenticate");
        };
        f.manager.logout().await.unwrap();
        let LoginOutcome::Authenticated(second) = f.manager.login().await.unwrap() else {
            panic!("second login should authenticate");
        };

        assert_ne!(first, second);
        assert_eq!(f.manager.dispatcher().current().await.principal(), &second);
    }
}
