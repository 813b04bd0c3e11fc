//! Reactive refresh: replay a call once after its token expired.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{info, warn};

use super::context::AuthContext;
use super::refresh::RefreshCoordinator;
use crate::api::transport::send_with_backoff;
use crate::api::{ApiError, ApiRequest, Transport};

/// Wraps every outgoing API call.
///
/// A call that fails with `ApiError::TokenExpired` joins (or starts) a
/// refresh and is re-issued exactly once with the new token. If the refresh
/// fails for any reason, local session state is cleared and the original
/// error is returned.
#[derive(Clone)]
pub struct RetryInterceptor {
    transport: Arc<dyn Transport>,
    context: Arc<AuthContext>,
    refresher: Arc<RefreshCoordinator>,
}

impl RetryInterceptor {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        context: Arc<AuthContext>,
        refresher: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            transport,
            context,
            refresher,
        }
    }

    pub async fn send(&self, mut request: ApiRequest) -> Result<JsonValue, ApiError> {
        if request.token.is_none() {
            request.token = self.context.header.get();
        }

        let original = match send_with_backoff(self.transport.as_ref(), &request).await {
            Ok(body) => return Ok(body),
            Err(e) => e,
        };

        if original != ApiError::TokenExpired || request.retried || !request.allow_refresh {
            return Err(original);
        }

        info!(path = %request.path, "Token expired, refreshing before replay");
        match self.refresher.refresh().await {
            Ok(payload) => {
                request.token = Some(payload.token);
                request.retried = true;
                send_with_backoff(self.transport.as_ref(), &request).await
            }
            Err(refresh_err) => {
                warn!(path = %request.path, error = %refresh_err, "Refresh failed, clearing session");
                self.context.clear();
                Err(original)
            }
        }
    }

    /// Send without the default credential header and without refresh.
    pub(crate) async fn send_unauthenticated(
        &self,
        request: ApiRequest,
    ) -> Result<JsonValue, ApiError> {
        send_with_backoff(self.transport.as_ref(), &request).await
    }
}
