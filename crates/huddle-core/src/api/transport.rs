//! The HTTP seam: request description, transport trait and the reqwest
//! implementation.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{header, Client};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use super::ApiError;

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
pub(crate) const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

/// One API call as the interceptor sees it.
#[derive(Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL, e.g. `/api/profile/profile`.
    pub path: String,
    pub body: Option<JsonValue>,
    /// Bearer credential attached to this call.
    pub token: Option<String>,
    /// Set once the call has been replayed after a refresh.
    pub retried: bool,
    /// Whether an expired-token failure may trigger a refresh and replay.
    pub allow_refresh: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            token: None,
            retried: false,
            allow_refresh: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    /// Exclude this call from expired-token refresh and replay.
    pub fn without_refresh(mut self) -> Self {
        self.allow_refresh = false;
        self
    }
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("has_body", &self.body.is_some())
            .field("has_token", &self.token.is_some())
            .field("retried", &self.retried)
            .field("allow_refresh", &self.allow_refresh)
            .finish()
    }
}

/// Sends one request and classifies the outcome.
///
/// Implementations must map "no response received" to `ApiError::Network`
/// and non-success statuses through `ApiError::from_status`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<JsonValue, ApiError>;
}

/// Send through `transport`, backing off and retrying on `RateLimited`.
pub(crate) async fn send_with_backoff(
    transport: &dyn Transport,
    request: &ApiRequest,
) -> Result<JsonValue, ApiError> {
    let mut retries = 0;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        match transport.send(request).await {
            Err(ApiError::RateLimited) => {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(path = %request.path, retry = retries, backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
            }
            other => {
                debug!(path = %request.path, ok = other.is_ok(), "API call finished");
                return other;
            }
        }
    }
}

/// Production transport on top of `reqwest`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<JsonValue, ApiError> {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Patch => self.client.patch(&url),
            Method::Delete => self.client.delete(&url),
        }
        .header(header::ACCEPT, "application/json");

        if let Some(ref token) = request.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(path = %request.path, status = %status, "API response received");

        if !status.is_success() {
            return Err(ApiError::from_status(status, &text));
        }
        if text.trim().is_empty() {
            return Ok(JsonValue::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON from {}: {}", request.path, e))
        })
    }
}

/// Process-wide default credential attached to outgoing calls.
///
/// Writers always replace the whole value.
#[derive(Default)]
pub struct AuthHeader {
    token: RwLock<Option<String>>,
}

impl AuthHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn set(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    pub fn is_set(&self) -> bool {
        self.token.read().is_some()
    }
}

impl fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_set() { "Bearer <redacted>" } else { "<none>" };
        f.debug_tuple("AuthHeader").field(&state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let transport =
            ReqwestTransport::new("https://api.example.org/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            transport.url("/api/profile/profile"),
            "https://api.example.org/api/profile/profile"
        );
        assert_eq!(
            transport.url("api/sessions/refresh"),
            "https://api.example.org/api/sessions/refresh"
        );
    }

    #[test]
    fn test_debug_output_never_contains_token() {
        let header = AuthHeader::new();
        header.set(Some("secret-token".to_string()));
        assert!(!format!("{:?}", header).contains("secret-token"));

        let mut request = ApiRequest::get("/api/profile/profile");
        request.token = Some("secret-token".to_string());
        assert!(!format!("{:?}", request).contains("secret-token"));
    }

    #[test]
    fn test_request_builders() {
        let request = ApiRequest::post("/api/auth/signin")
            .with_body(serde_json::json!({"email": "a@b.c"}))
            .without_refresh();
        assert_eq!(request.method, Method::Post);
        assert!(!request.allow_refresh);
        assert!(!request.retried);
        assert!(request.body.is_some());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // Port 9 on localhost is not expected to accept connections
        let transport =
            ReqwestTransport::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = transport
            .send(&ApiRequest::get("/api/profile/profile"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Network(_)), "got {:?}", err);
    }
}
