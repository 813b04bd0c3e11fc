use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone, Utc};
use tracing::debug;

use super::storage::Storage;
use crate::cache::CachedData;
use crate::models::Principal;

/// Local key holding the session token.
pub const TOKEN_KEY: &str = "token";

/// Local key holding the epoch-millisecond time of the last heartbeat.
pub const LAST_ACTIVE_KEY: &str = "lastActiveUpdate";

/// Session-scoped key holding the last-known principal.
pub const CACHED_USER_KEY: &str = "cachedUser";

/// Persisted session state split across two backends.
///
/// `local` survives restarts (token, heartbeat marker); `session` only lives
/// as long as the current session (principal snapshot).
#[derive(Clone)]
pub struct CredentialStore {
    local: Arc<dyn Storage>,
    session: Arc<dyn Storage>,
}

impl CredentialStore {
    pub fn new(local: Arc<dyn Storage>, session: Arc<dyn Storage>) -> Self {
        Self { local, session }
    }

    pub fn token(&self) -> Result<Option<String>> {
        self.local
            .get(TOKEN_KEY)
            .map(|t| t.filter(|t| !t.is_empty()))
            .context("Failed to load session token")
    }

    pub fn set_token(&self, token: &str) -> Result<()> {
        self.local
            .set(TOKEN_KEY, token)
            .context("Failed to store session token")
    }

    pub fn clear_token(&self) -> Result<()> {
        self.local
            .remove(TOKEN_KEY)
            .context("Failed to delete session token")
    }

    /// Time of the last heartbeat, if one was recorded.
    pub fn last_active(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.local.get(LAST_ACTIVE_KEY)? else {
            return Ok(None);
        };
        match raw.trim().parse::<i64>() {
            Ok(millis) => Ok(Utc.timestamp_millis_opt(millis).single()),
            Err(e) => {
                debug!(error = %e, "Ignoring malformed heartbeat marker");
                Ok(None)
            }
        }
    }

    pub fn mark_active(&self, now: DateTime<Utc>) -> Result<()> {
        self.local
            .set(LAST_ACTIVE_KEY, &now.timestamp_millis().to_string())
            .context("Failed to store heartbeat marker")
    }

    /// Whether the heartbeat already ran on `now`'s local calendar day.
    pub fn active_today(&self, now: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .last_active()?
            .map(|last| last.with_timezone(&Local).date_naive() == now.with_timezone(&Local).date_naive())
            .unwrap_or(false))
    }

    /// The last-known principal, or `None` if absent or unreadable.
    pub fn cached_principal(&self) -> Result<Option<CachedData<Principal>>> {
        let Some(raw) = self.session.get(CACHED_USER_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(cached) => Ok(Some(cached)),
            Err(e) => {
                debug!(error = %e, "Discarding unreadable principal snapshot");
                Ok(None)
            }
        }
    }

    pub fn set_cached_principal(&self, principal: &Principal) -> Result<()> {
        let contents = serde_json::to_string(&CachedData::new(principal))?;
        self.session
            .set(CACHED_USER_KEY, &contents)
            .context("Failed to store principal snapshot")
    }

    pub fn clear_cached_principal(&self) -> Result<()> {
        self.session
            .remove(CACHED_USER_KEY)
            .context("Failed to delete principal snapshot")
    }
}
