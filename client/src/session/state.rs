use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;

use crate::principal::Principal;

/// Authentication state of the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Before `initialize` has completed
    Uninitialized,
    /// Calls go out under the anonymous identity
    Anonymous,
    /// Calls are signed by `principal`
    Authenticated { principal: Principal },
}

impl SessionState {
    pub fn is_initialized(&self) -> bool {
        !matches!(self, Self::Uninitialized)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Authenticated { principal } => Some(principal),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Anonymous => "anonymous",
            Self::Authenticated { .. } => "authenticated",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authenticated { principal } => write!(f, "authenticated as {}", principal),
            other => f.write_str(other.name()),
        }
    }
}

/// Why a login ended without authenticating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// The user closed the provider flow
    Closed,
    /// The caller cancelled through a [`LoginCancel`]
    Cancelled,
    /// The login timeout elapsed
    TimedOut,
}

impl AbandonReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        }
    }
}

/// Result of a login attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated(Principal),
    Abandoned(AbandonReason),
}

/// Cancels a pending login
#[derive(Debug, Clone)]
pub struct LoginCancel {
    tx: watch::Sender<bool>,
}

/// Receiving side of a [`LoginCancel`], handed to the login call
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl LoginCancel {
    pub fn new() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelSignal { rx })
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        LoginCancel::new().1
    }

    /// Resolves once cancelled. Never resolves if the sender is dropped first.
    pub async fn cancelled(mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Session configuration
pub struct SessionConfig {
    pub identity_provider_url: String,
    pub login_timeout: Option<Duration>,
    pub session_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            identity_provider_url: "http://rdmx6-jaaaa-aaaaa-aaadq-cai.localhost:8080".to_string(),
            login_timeout: Some(Duration::from_secs(5 * 60)),
            session_ttl: Duration::from_secs(8 * 60 * 60), // 8 hours
        }
    }
}

/// Get current timestamp in milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
