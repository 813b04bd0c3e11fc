//! Single-flight session refresh.
//!
//! At most one refresh network call runs at any instant. Callers that arrive
//! while one is running await the same shared future and observe its final
//! outcome. The running future clears the in-flight slot itself before it
//! resolves, so a caller that arrives after a failure starts a new attempt.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::context::AuthContext;
use crate::api::client::REFRESH_PATH;
use crate::api::transport::send_with_backoff;
use crate::api::{ApiError, ApiRequest, RefreshError, Transport};
use crate::models::AuthPayload;

pub type RefreshResult = Result<AuthPayload, RefreshError>;

type SharedRefresh = Shared<BoxFuture<'static, RefreshResult>>;

struct InFlight {
    generation: u64,
    handle: SharedRefresh,
}

/// Exchanges the current token for a new one, once, for everyone.
pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    context: Arc<AuthContext>,
    in_flight: Arc<Mutex<Option<InFlight>>>,
    generation: AtomicU64,
}

impl RefreshCoordinator {
    pub(crate) fn new(transport: Arc<dyn Transport>, context: Arc<AuthContext>) -> Self {
        Self {
            transport,
            context,
            in_flight: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    /// Refresh the session, joining a refresh that is already running.
    pub async fn refresh(&self) -> RefreshResult {
        let handle = {
            let mut slot = self.in_flight.lock();
            match slot.as_ref() {
                Some(running) => {
                    debug!(generation = running.generation, "Joining in-flight refresh");
                    running.handle.clone()
                }
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(generation, "Starting session refresh");
                    let handle = Self::run(
                        self.transport.clone(),
                        self.context.clone(),
                        self.in_flight.clone(),
                        generation,
                    )
                    .boxed()
                    .shared();
                    *slot = Some(InFlight {
                        generation,
                        handle: handle.clone(),
                    });
                    handle
                }
            }
        };
        // A handle whose first caller went away is driven on by whoever awaits it next.
        handle.await
    }

    /// Whether a refresh network call is currently running.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    /// Forget any running refresh; its eventual result is not installed into
    /// a later attempt's slot.
    pub(crate) fn dispose(&self) {
        self.in_flight.lock().take();
    }

    async fn run(
        transport: Arc<dyn Transport>,
        context: Arc<AuthContext>,
        slot: Arc<Mutex<Option<InFlight>>>,
        generation: u64,
    ) -> RefreshResult {
        let mut request = ApiRequest::post(REFRESH_PATH).without_refresh();
        request.token = match context.header.get() {
            Some(token) => Some(token),
            None => context.credentials.token().unwrap_or_else(|e| {
                warn!(error = %e, "Failed to load token for refresh");
                None
            }),
        };

        let outcome = send_with_backoff(transport.as_ref(), &request)
            .await
            .and_then(|body| {
                serde_json::from_value::<AuthPayload>(body).map_err(|e| {
                    ApiError::InvalidResponse(format!("Failed to parse refresh response: {}", e))
                })
            });

        {
            let mut slot = slot.lock();
            if slot.as_ref().map(|r| r.generation) == Some(generation) {
                *slot = None;
            }
        }

        match outcome {
            Ok(payload) => {
                context.install(&payload);
                info!(generation, "Session refreshed");
                Ok(payload)
            }
            Err(e) => {
                warn!(generation, error = %e, "Session refresh failed");
                Err(RefreshError(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionState;
    use crate::testing::{auth_payload, memory_credentials, network_error, principal, MockTransport};
    use futures::future::join_all;
    use std::sync::atomic::AtomicU32;

    fn coordinator(transport: Arc<MockTransport>) -> (RefreshCoordinator, Arc<AuthContext>) {
        let context = Arc::new(AuthContext::new(memory_credentials()));
        context.header.set(Some("old".to_string()));
        (RefreshCoordinator::new(transport, context.clone()), context)
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_network_call() {
        let transport = MockTransport::new();
        let user = principal("ana", "member");
        transport.respond(REFRESH_PATH, Ok(auth_payload("new", &user)));
        let (coordinator, context) = coordinator(transport.clone());

        let results = join_all((0..5).map(|_| coordinator.refresh())).await;

        assert_eq!(transport.calls(REFRESH_PATH), 1);
        for result in results {
            assert_eq!(result.unwrap().token, "new");
        }
        assert!(!coordinator.is_in_flight());
        assert_eq!(context.header.get().as_deref(), Some("new"));
        assert_eq!(context.credentials.token().unwrap().as_deref(), Some("new"));
        assert_eq!(context.state(), SessionState::Authenticated(user));
    }

    #[tokio::test]
    async fn test_refresh_sends_current_token() {
        let transport = MockTransport::new();
        transport.respond(REFRESH_PATH, Ok(auth_payload("new", &principal("ana", "member"))));
        let (coordinator, _) = coordinator(transport.clone());

        coordinator.refresh().await.unwrap();

        let sent = transport.requests(REFRESH_PATH);
        assert_eq!(sent[0].token.as_deref(), Some("old"));
        assert!(!sent[0].allow_refresh);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_refresh_backs_off_and_succeeds() {
        let transport = MockTransport::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let payload = auth_payload("new", &principal("ana", "member"));
        transport.on(REFRESH_PATH, move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ApiError::RateLimited)
            } else {
                Ok(payload.clone())
            }
        });
        let (coordinator, context) = coordinator(transport.clone());

        assert_eq!(coordinator.refresh().await.unwrap().token, "new");
        assert_eq!(transport.calls(REFRESH_PATH), 2);
        assert_eq!(context.header.get().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_sequential_refreshes_are_independent() {
        let transport = MockTransport::new();
        transport.respond(REFRESH_PATH, Ok(auth_payload("new", &principal("ana", "member"))));
        let (coordinator, _) = coordinator(transport.clone());

        coordinator.refresh().await.unwrap();
        coordinator.refresh().await.unwrap();

        assert_eq!(transport.calls(REFRESH_PATH), 2);
    }

    #[tokio::test]
    async fn test_failure_clears_handle_and_keeps_state() {
        let transport = MockTransport::new();
        transport.respond(REFRESH_PATH, Err(network_error()));
        let (coordinator, context) = coordinator(transport.clone());

        let results = join_all((0..3).map(|_| coordinator.refresh())).await;
        for result in &results {
            let err = result.as_ref().unwrap_err();
            assert!(!err.is_auth());
        }
        assert_eq!(transport.calls(REFRESH_PATH), 1);
        assert!(!coordinator.is_in_flight());
        // Prior state is left for the caller to interpret
        assert_eq!(context.header.get().as_deref(), Some("old"));
        assert!(context.state().is_loading());

        // A later call starts a fresh attempt
        transport.respond(REFRESH_PATH, Ok(auth_payload("new", &principal("ana", "member"))));
        coordinator.refresh().await.unwrap();
        assert_eq!(transport.calls(REFRESH_PATH), 2);
    }

    #[tokio::test]
    async fn test_malformed_refresh_response() {
        let transport = MockTransport::new();
        transport.respond(REFRESH_PATH, Ok(serde_json::json!({"token": 5})));
        let (coordinator, _) = coordinator(transport.clone());

        let err = coordinator.refresh().await.unwrap_err();
        assert!(matches!(err.cause(), ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_abandoned_refresh_is_driven_by_next_caller() {
        let transport = MockTransport::new();
        transport.respond(REFRESH_PATH, Ok(auth_payload("new", &principal("ana", "member"))));
        let (coordinator, _) = coordinator(transport.clone());

        // Poll the first caller once, then drop it mid-flight
        {
            let first = coordinator.refresh();
            futures::pin_mut!(first);
            assert!(futures::poll!(first.as_mut()).is_pending());
        }
        assert!(coordinator.is_in_flight());

        let payload = coordinator.refresh().await.unwrap();
        assert_eq!(payload.token, "new");
        assert_eq!(transport.calls(REFRESH_PATH), 1);
        assert!(!coordinator.is_in_flight());
    }
}
