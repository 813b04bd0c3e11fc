//! Scripted transport and fixtures shared by the async tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};

use crate::api::{ApiError, ApiRequest, Transport};
use crate::auth::storage::MemoryStorage;
use crate::auth::CredentialStore;
use crate::models::Principal;

const ROUND_TRIP: Duration = Duration::from_millis(5);

type Handler = Arc<dyn Fn(&ApiRequest) -> Result<JsonValue, ApiError> + Send + Sync>;

/// Transport whose responses are scripted per path.
///
/// Every call is recorded, then held for a short simulated round trip, so
/// calls issued in the same tick are all in flight before any resolves.
#[derive(Default)]
pub(crate) struct MockTransport {
    routes: Mutex<HashMap<String, Handler>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn on<F>(&self, path: &str, handler: F)
    where
        F: Fn(&ApiRequest) -> Result<JsonValue, ApiError> + Send + Sync + 'static,
    {
        self.routes.lock().insert(path.to_string(), Arc::new(handler));
    }

    pub(crate) fn respond(&self, path: &str, result: Result<JsonValue, ApiError>) {
        self.on(path, move |_| result.clone());
    }

    pub(crate) fn calls(&self, path: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.path == path).count()
    }

    pub(crate) fn requests(&self, path: &str) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &ApiRequest) -> Result<JsonValue, ApiError> {
        self.requests.lock().push(request.clone());
        tokio::time::sleep(ROUND_TRIP).await;

        let handler = self.routes.lock().get(&request.path).cloned();
        match handler {
            Some(handler) => handler(request),
            None => Err(ApiError::NotFound(request.path.clone())),
        }
    }
}

pub(crate) fn principal(id: &str, role: &str) -> Principal {
    serde_json::from_value(json!({
        "id": id,
        "email": format!("{}@example.org", id),
        "name": id,
        "role": role,
        "language": "en"
    }))
    .expect("valid principal fixture")
}

pub(crate) fn auth_payload(token: &str, user: &Principal) -> JsonValue {
    json!({ "token": token, "user": user })
}

/// Credential store over fresh in-memory backends.
pub(crate) fn memory_credentials() -> CredentialStore {
    CredentialStore::new(Arc::new(MemoryStorage::new()), Arc::new(MemoryStorage::new()))
}

pub(crate) fn network_error() -> ApiError {
    ApiError::Network("connection reset".to_string())
}

pub(crate) fn rejected() -> ApiError {
    ApiError::Rejected {
        status: 401,
        message: "invalid session".to_string(),
    }
}
