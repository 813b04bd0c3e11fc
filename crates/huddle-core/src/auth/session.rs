use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::context::AuthContext;
use super::storage::{FileStorage, KeyringStorage, MemoryStorage, Storage};
use super::{CredentialStore, RefreshCoordinator, RetryInterceptor, SessionState};
use crate::api::{ApiClient, ApiError, RefreshError, ReqwestTransport, SignUpRequest, Transport};
use crate::config::{Config, APP_NAME};
use crate::connectivity::{ConnectivityObserver, Subscription};
use crate::models::{AccessGroup, AuthPayload, Principal};

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

pub(crate) struct SessionInner {
    pub(crate) context: Arc<AuthContext>,
    pub(crate) refresher: Arc<RefreshCoordinator>,
    pub(crate) api: ApiClient,
    pub(crate) connectivity: Arc<dyn ConnectivityObserver>,
    pub(crate) refresh_threshold: chrono::Duration,
    pub(crate) restore_watch: Mutex<Option<Subscription>>,
    pub(crate) heartbeat_task: Mutex<Option<JoinHandle<()>>>,
    pub(crate) bootstrapped: AtomicBool,
}

/// The one object the rest of the application depends on for
/// authentication: current principal, loading flag, and the sign-in/out
/// operations.
///
/// Clone is cheap and every clone refers to the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Wire up a session over explicit collaborators.
    pub fn initialize(
        config: &Config,
        transport: Arc<dyn Transport>,
        credentials: CredentialStore,
        connectivity: Arc<dyn ConnectivityObserver>,
    ) -> Self {
        let context = Arc::new(AuthContext::new(credentials));
        let refresher = Arc::new(RefreshCoordinator::new(transport.clone(), context.clone()));
        let api = ApiClient::new(RetryInterceptor::new(
            transport,
            context.clone(),
            refresher.clone(),
        ));

        Self {
            inner: Arc::new(SessionInner {
                context,
                refresher,
                api,
                connectivity,
                refresh_threshold: config.refresh_threshold(),
                restore_watch: Mutex::new(None),
                heartbeat_task: Mutex::new(None),
                bootstrapped: AtomicBool::new(false),
            }),
        }
    }

    /// Session backed by the real API and on-disk (or keychain) storage.
    pub fn from_config(
        config: &Config,
        connectivity: Arc<dyn ConnectivityObserver>,
    ) -> Result<Self> {
        let transport = ReqwestTransport::new(&config.api_base_url, config.request_timeout())
            .context("Failed to build HTTP client")?;

        let local: Arc<dyn Storage> = if config.use_keyring {
            Arc::new(KeyringStorage::new(APP_NAME))
        } else {
            let dir = config.data_dir()?;
            Arc::new(FileStorage::in_dir(&dir, SESSION_FILE))
        };
        let credentials = CredentialStore::new(local, Arc::new(MemoryStorage::new()));

        Ok(Self::initialize(
            config,
            Arc::new(transport),
            credentials,
            connectivity,
        ))
    }

    /// Run the startup pass once; later calls return the current state.
    pub async fn bootstrap(&self) -> SessionState {
        self.inner.bootstrap().await
    }

    pub fn state(&self) -> SessionState {
        self.inner.context.state()
    }

    pub fn principal(&self) -> Option<Principal> {
        self.state().principal().cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_loading()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.context.subscribe()
    }

    /// API client riding on this session's token and refresh coordinator.
    pub fn api(&self) -> ApiClient {
        self.inner.api.clone()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, ApiError> {
        let payload = self.inner.api.sign_in(email, password).await?;
        Ok(self.establish(payload))
    }

    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<Principal, ApiError> {
        let payload = self.inner.api.sign_up(request).await?;
        Ok(self.establish(payload))
    }

    /// Sign in with a Google identity credential.
    pub async fn federated_sign_in(&self, credential: &str) -> Result<Principal, ApiError> {
        let payload = self.inner.api.google_auth(credential).await?;
        Ok(self.establish(payload))
    }

    fn establish(&self, payload: AuthPayload) -> Principal {
        self.inner.context.install(&payload);
        info!(user = %payload.user.id, "Signed in");
        payload.user
    }

    /// Invalidate the server session if possible, then always clear locally.
    pub async fn sign_out(&self) {
        if self.inner.context.header.is_set() {
            if let Err(e) = self.inner.api.sign_out().await {
                warn!(error = %e, "Server-side sign-out failed");
            }
        }
        self.inner.restore_watch.lock().take();
        self.inner.context.clear();
        info!("Signed out");
    }

    /// Shallow-merge `patch` into the current principal.
    pub fn update_user_data(&self, patch: &JsonValue) -> Result<Principal> {
        let current = self
            .principal()
            .ok_or_else(|| anyhow::anyhow!("Cannot update profile: not signed in"))?;
        let updated = current.merged(patch).context("Invalid profile update")?;
        self.inner.context.publish(updated.clone());
        Ok(updated)
    }

    /// Role check against the current principal. Anonymous and loading
    /// sessions only pass `AccessGroup::All`.
    pub fn has_access(&self, group: AccessGroup) -> bool {
        match self.state() {
            SessionState::Authenticated(principal) => group.allows(&principal.role),
            _ => group == AccessGroup::All,
        }
    }

    /// Refresh now, joining a refresh already in flight.
    pub async fn refresh(&self) -> Result<Principal, RefreshError> {
        self.inner.refresher.refresh().await.map(|payload| payload.user)
    }

    /// Wait for the background heartbeat, if one is still being sent.
    /// Call before the runtime shuts down.
    pub async fn flush(&self) {
        self.inner.flush().await;
    }

    /// Release the restore watcher, the in-flight refresh and the default
    /// credential header. Persisted state is untouched, and a refresh that
    /// completes afterwards still persists its token but leaves the header
    /// unset.
    pub fn dispose(&self) {
        self.inner.restore_watch.lock().take();
        self.inner.refresher.dispose();
        self.inner.context.dispose();
    }
}
