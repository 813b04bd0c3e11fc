//! Typed surface over the session-aware API.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use super::{ApiError, ApiRequest};
use crate::auth::RetryInterceptor;
use crate::models::{AuthPayload, Principal};

// ============================================================================
// Endpoints
// ============================================================================

pub const REFRESH_PATH: &str = "/api/sessions/refresh";
pub const LAST_ACTIVE_PATH: &str = "/api/sessions/last-active";
pub const SIGN_OUT_PATH: &str = "/api/sessions/signout";
pub const PROFILE_PATH: &str = "/api/profile/profile";
pub const SIGN_IN_PATH: &str = "/api/auth/signin";
pub const SIGN_UP_PATH: &str = "/api/auth/signup";
pub const GOOGLE_AUTH_PATH: &str = "/api/auth/google-auth";

#[derive(Debug, Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Registration form fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    /// Any additional form fields the server accepts.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Serialize)]
struct GoogleAuthRequest<'a> {
    credential: &'a str,
}

/// API client bound to a session.
/// Clone is cheap - it shares the session's transport, header and refresh
/// coordinator.
#[derive(Clone)]
pub struct ApiClient {
    interceptor: RetryInterceptor,
}

impl ApiClient {
    pub(crate) fn new(interceptor: RetryInterceptor) -> Self {
        Self { interceptor }
    }

    /// Send a raw request through the retry interceptor.
    pub async fn send(&self, request: ApiRequest) -> Result<JsonValue, ApiError> {
        self.interceptor.send(request).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let body = self.send(ApiRequest::get(path)).await?;
        Self::decode(path, body)
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = self.send(ApiRequest::post(path).with_body(Self::encode(body)?)).await?;
        Self::decode(path, body)
    }

    fn encode<B: Serialize>(body: &B) -> Result<JsonValue, ApiError> {
        serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode request: {}", e)))
    }

    fn decode<T: DeserializeOwned>(path: &str, body: JsonValue) -> Result<T, ApiError> {
        serde_json::from_value(body).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", path, e))
        })
    }

    // ===== Session endpoints =====

    /// Fetch the signed-in user's profile
    pub async fn fetch_profile(&self) -> Result<Principal, ApiError> {
        self.get(PROFILE_PATH).await
    }

    /// Record that the user was active today
    pub async fn heartbeat(&self) -> Result<(), ApiError> {
        self.send(ApiRequest::post(LAST_ACTIVE_PATH)).await?;
        debug!("Heartbeat recorded");
        Ok(())
    }

    /// Ask the server to invalidate the current session
    pub async fn sign_out(&self) -> Result<(), ApiError> {
        self.send(ApiRequest::post(SIGN_OUT_PATH).without_refresh())
            .await
            .map(|_| ())
    }

    // ===== Credential issuance =====
    // These run without a session, so an auth failure is never a refresh trigger.

    async fn issue<B: Serialize>(&self, path: &str, body: &B) -> Result<AuthPayload, ApiError> {
        let request = ApiRequest::post(path)
            .with_body(Self::encode(body)?)
            .without_refresh();
        let body = self.interceptor.send_unauthenticated(request).await?;
        Self::decode(path, body)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthPayload, ApiError> {
        self.issue(SIGN_IN_PATH, &SignInRequest { email, password }).await
    }

    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<AuthPayload, ApiError> {
        self.issue(SIGN_UP_PATH, request).await
    }

    pub async fn google_auth(&self, credential: &str) -> Result<AuthPayload, ApiError> {
        self.issue(GOOGLE_AUTH_PATH, &GoogleAuthRequest { credential })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::context::AuthContext;
    use crate::auth::RefreshCoordinator;
    use crate::testing::{auth_payload, memory_credentials, principal, MockTransport};
    use serde_json::json;
    use std::sync::Arc;

    fn client(transport: Arc<MockTransport>) -> ApiClient {
        let context = Arc::new(AuthContext::new(memory_credentials()));
        context.header.set(Some("current".to_string()));
        let refresher = Arc::new(RefreshCoordinator::new(transport.clone(), context.clone()));
        ApiClient::new(RetryInterceptor::new(transport, context, refresher))
    }

    #[tokio::test]
    async fn test_sign_in_sends_credentials_without_token() {
        let transport = MockTransport::new();
        let user = principal("ana", "member");
        transport.respond(SIGN_IN_PATH, Ok(auth_payload("issued", &user)));
        let client = client(transport.clone());

        let payload = client.sign_in("ana@example.org", "hunter2").await.unwrap();
        assert_eq!(payload.token, "issued");
        assert_eq!(payload.user, user);

        let sent = &transport.requests(SIGN_IN_PATH)[0];
        assert!(sent.token.is_none());
        assert_eq!(
            sent.body,
            Some(json!({"email": "ana@example.org", "password": "hunter2"}))
        );
    }

    #[tokio::test]
    async fn test_sign_up_flattens_extra_fields() {
        let transport = MockTransport::new();
        transport.respond(SIGN_UP_PATH, Ok(auth_payload("issued", &principal("bo", "member"))));
        let client = client(transport.clone());

        let mut extra = Map::new();
        extra.insert("language".into(), json!("de"));
        let request = SignUpRequest {
            name: "Bo".into(),
            email: "bo@example.org".into(),
            password: "pw".into(),
            extra,
        };
        client.sign_up(&request).await.unwrap();

        let body = transport.requests(SIGN_UP_PATH)[0].body.clone().unwrap();
        assert_eq!(body["language"], json!("de"));
        assert_eq!(body["name"], json!("Bo"));
    }

    #[tokio::test]
    async fn test_google_auth_posts_credential() {
        let transport = MockTransport::new();
        transport.respond(GOOGLE_AUTH_PATH, Ok(auth_payload("issued", &principal("cy", "member"))));
        let client = client(transport.clone());

        client.google_auth("google-id-token").await.unwrap();
        let body = transport.requests(GOOGLE_AUTH_PATH)[0].body.clone().unwrap();
        assert_eq!(body, json!({"credential": "google-id-token"}));
    }

    #[tokio::test]
    async fn test_profile_decode_failure_is_invalid_response() {
        let transport = MockTransport::new();
        transport.respond(PROFILE_PATH, Ok(json!({"unexpected": true})));
        let client = client(transport.clone());

        let err = client.fetch_profile().await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_heartbeat_and_sign_out_carry_token() {
        let transport = MockTransport::new();
        transport.respond(LAST_ACTIVE_PATH, Ok(JsonValue::Null));
        transport.respond(SIGN_OUT_PATH, Ok(JsonValue::Null));
        let client = client(transport.clone());

        client.heartbeat().await.unwrap();
        client.sign_out().await.unwrap();
        assert_eq!(transport.requests(LAST_ACTIVE_PATH)[0].token.as_deref(), Some("current"));
        let sign_out = &transport.requests(SIGN_OUT_PATH)[0];
        assert_eq!(sign_out.token.as_deref(), Some("current"));
        assert!(!sign_out.allow_refresh);
    }
}
