use serde_json::Value as JsonValue;
use thiserror::Error;

/// Classified failure of an API call.
///
/// The transport produces these; the session layer only ever looks at the
/// variant, never at response bodies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Session token expired")]
    TokenExpired,

    #[error("Credentials rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Coarse failure classes the session layer makes decisions on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Expired,
    Rejected,
    NetworkError,
    ServerError,
    Other,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Whether a 401 body carries the server's "token expired" flag.
    ///
    /// Accepted shapes: `{"expired": true}` and `{"code": "TOKEN_EXPIRED"}`.
    fn is_expired_body(body: &str) -> bool {
        let Ok(json) = serde_json::from_str::<JsonValue>(body) else {
            return false;
        };
        json.get("expired").and_then(JsonValue::as_bool) == Some(true)
            || json
                .get("code")
                .and_then(JsonValue::as_str)
                .map(|c| c.eq_ignore_ascii_case("TOKEN_EXPIRED"))
                .unwrap_or(false)
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 if Self::is_expired_body(body) => ApiError::TokenExpired,
            code @ (401 | 403) => ApiError::Rejected {
                status: code,
                message: truncated,
            },
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            code @ 500..=599 => ApiError::Server {
                status: code,
                message: truncated,
            },
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::TokenExpired => ErrorKind::Expired,
            ApiError::Rejected { .. } => ErrorKind::Rejected,
            ApiError::Network(_) => ErrorKind::NetworkError,
            ApiError::Server { .. } => ErrorKind::ServerError,
            ApiError::NotFound(_) | ApiError::RateLimited | ApiError::InvalidResponse(_) => {
                ErrorKind::Other
            }
        }
    }

    /// Authentication-class failures: the credential itself is the problem.
    pub fn is_auth(&self) -> bool {
        matches!(self.kind(), ErrorKind::Expired | ErrorKind::Rejected)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::from_status(status, "")
        } else {
            // No response received: connect failure, timeout, DNS, reset
            ApiError::Network(err.to_string())
        }
    }
}

/// A refresh attempt failed; wraps the classified cause.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Session refresh failed: {0}")]
pub struct RefreshError(#[source] pub ApiError);

impl RefreshError {
    pub fn cause(&self) -> &ApiError {
        &self.0
    }

    pub fn is_auth(&self) -> bool {
        self.0.is_auth()
    }
}
