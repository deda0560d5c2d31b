//! Call dispatcher: routes outbound calls through the active caller handle

use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::backend::{CallError, CallerHandle};
use crate::principal::Principal;

/// Message returned by [`CallDispatcher::whoami`] when the remote call fails
pub const PRINCIPAL_ERROR_MESSAGE: &str = "Error retrieving principal";

/// Prefix of a successful [`CallDispatcher::whoami`] message
pub const PRINCIPAL_MESSAGE_PREFIX: &str = "Your principal is: ";

/// Holds exactly one active caller handle
///
/// The handle is read at the moment a call is dispatched and the lock is
/// released before the remote call is awaited. A call therefore always uses
/// the handle that was active when it was issued, and a rebind never waits
/// for in-flight calls.
pub struct CallDispatcher {
    current: RwLock<CallerHandle>,
    default: CallerHandle,
}

impl CallDispatcher {
    /// Create a dispatcher whose active and default handle is `default`
    pub fn new(default: CallerHandle) -> Self {
        Self {
            current: RwLock::new(default.clone()),
            default,
        }
    }

    /// The handle the next call will use
    pub async fn current(&self) -> CallerHandle {
        self.current.read().await.clone()
    }

    /// The unauthenticated handle restored on logout
    pub fn default_handle(&self) -> &CallerHandle {
        &self.default
    }

    /// Replace the active handle
    pub async fn rebind(&self, handle: CallerHandle) {
        let mut current = self.current.write().await;
        debug!(
            "Rebinding caller from {} to {}",
            current.principal(),
            handle.principal()
        );
        *current = handle;
    }

    /// Restore the default handle
    pub async fn reset(&self) {
        self.rebind(self.default.clone()).await;
    }

    /// Greet `name` through the active handle, returning the reply verbatim
    pub async fn greet(&self, name: &str) -> Result<String, CallError> {
        let handle = self.current().await;
        handle.greet(name).await
    }

    /// The caller's principal as seen by the remote service
    pub async fn whoami_principal(&self) -> Result<Principal, CallError> {
        let handle = self.current().await;
        handle.whoami().await
    }

    /// Display message for the caller's principal
    ///
    /// Never fails: a failed call is logged and reported as
    /// [`PRINCIPAL_ERROR_MESSAGE`].
    pub async fn whoami(&self) -> String {
        match self.whoami_principal().await {
            Ok(principal) => format!("{}{}", PRINCIPAL_MESSAGE_PREFIX, principal),
            Err(e) => {
                error!("Failed to fetch principal: {}", e);
                PRINCIPAL_ERROR_MESSAGE.to_string()
            }
        }
    }
}
