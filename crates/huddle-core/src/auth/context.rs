use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::{debug, warn};

use super::CredentialStore;
use crate::api::AuthHeader;
use crate::models::{AuthPayload, Principal};

/// Externally visible session state.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum SessionState {
    Loading,
    Authenticated(Principal),
    Anonymous,
}

impl SessionState {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            SessionState::Authenticated(principal) => Some(principal),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }
}

/// The shared mutable session resources: persisted credentials, the default
/// credential header and the published state.
///
/// Every writer replaces token, header and principal as a whole.
pub(crate) struct AuthContext {
    pub(crate) credentials: CredentialStore,
    pub(crate) header: AuthHeader,
    state: watch::Sender<SessionState>,
    disposed: AtomicBool,
}

impl AuthContext {
    pub(crate) fn new(credentials: CredentialStore) -> Self {
        let (state, _) = watch::channel(SessionState::Loading);
        Self {
            credentials,
            header: AuthHeader::new(),
            state,
            disposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    /// Adopt a freshly issued token and its principal.
    pub(crate) fn install(&self, payload: &AuthPayload) {
        if let Err(e) = self.credentials.set_token(&payload.token) {
            warn!(error = %e, "Failed to persist session token");
        }
        if self.disposed.load(Ordering::SeqCst) {
            debug!("Session disposed, not reinstalling the default header");
        } else {
            self.header.set(Some(payload.token.clone()));
        }
        self.publish(payload.user.clone());
    }

    /// Drop the default header for good; later installs leave it unset.
    pub(crate) fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.header.set(None);
    }

    /// Replace the current principal and its cached snapshot.
    pub(crate) fn publish(&self, principal: Principal) {
        if let Err(e) = self.credentials.set_cached_principal(&principal) {
            warn!(error = %e, "Failed to cache principal snapshot");
        }
        self.set_state(SessionState::Authenticated(principal));
    }

    /// Drop every trace of the session and fall back to anonymous.
    pub(crate) fn clear(&self) {
        if let Err(e) = self.credentials.clear_token() {
            warn!(error = %e, "Failed to delete session token");
        }
        if let Err(e) = self.credentials.clear_cached_principal() {
            warn!(error = %e, "Failed to delete principal snapshot");
        }
        self.header.set(None);
        self.set_state(SessionState::Anonymous);
        debug!("Local session state cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{memory_credentials, principal};

    #[test]
    fn test_starts_loading() {
        let context = AuthContext::new(memory_credentials());
        assert!(context.state().is_loading());
        assert!(!context.header.is_set());
    }

    #[test]
    fn test_install_replaces_everything() {
        let context = AuthContext::new(memory_credentials());
        let user = principal("ana", "member");
        context.install(&AuthPayload {
            token: "t1".to_string(),
            user: user.clone(),
        });

        assert_eq!(context.credentials.token().unwrap().as_deref(), Some("t1"));
        assert_eq!(context.header.get().as_deref(), Some("t1"));
        assert_eq!(context.state(), SessionState::Authenticated(user.clone()));
        let cached = context.credentials.cached_principal().unwrap().unwrap();
        assert_eq!(cached.data, user);
    }

    #[test]
    fn test_clear_resets_to_anonymous() {
        let context = AuthContext::new(memory_credentials());
        let mut watcher = context.subscribe();
        context.install(&AuthPayload {
            token: "t1".to_string(),
            user: principal("ana", "member"),
        });
        context.clear();

        assert_eq!(context.state(), SessionState::Anonymous);
        assert_eq!(*watcher.borrow_and_update(), SessionState::Anonymous);
        assert!(context.credentials.token().unwrap().is_none());
        assert!(context.credentials.cached_principal().unwrap().is_none());
        assert!(!context.header.is_set());
    }

    #[test]
    fn test_install_after_dispose_keeps_header_unset() {
        let context = AuthContext::new(memory_credentials());
        context.dispose();
        context.install(&AuthPayload {
            token: "late".to_string(),
            user: principal("ana", "member"),
        });

        assert!(!context.header.is_set());
        assert_eq!(context.credentials.token().unwrap().as_deref(), Some("late"));
    }
}
