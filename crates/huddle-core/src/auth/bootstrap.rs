//! Startup pass: decide what to do with the stored token before the rest of
//! the application sees a principal.
//!
//! - no token, or an undecodable one: anonymous, no network
//! - offline: cached principal snapshot, profile fetch deferred until
//!   connectivity returns
//! - token at or past the refresh threshold: proactive refresh
//! - otherwise: plain profile fetch
//!
//! Only an explicit authentication failure signs the user out here. Network
//! and server failures keep whatever principal is available, unless the
//! profile fetch hit an expired token and the replay's refresh failed.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::session::SessionInner;
use super::token;
use super::SessionState;

impl SessionInner {
    pub(crate) async fn bootstrap(self: &Arc<Self>) -> SessionState {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            debug!("Bootstrap already ran");
            return self.context.state();
        }

        let stored = self.context.credentials.token().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read stored token");
            None
        });
        let Some(stored) = stored else {
            debug!("No stored session");
            self.context.set_state(SessionState::Anonymous);
            return self.context.state();
        };

        let Some(issued_at) = token::issued_at(&stored) else {
            info!("Discarding undecodable session token");
            self.context.clear();
            return self.context.state();
        };
        self.context.header.set(Some(stored));

        if !self.connectivity.is_online() {
            info!("Offline at startup, using cached principal");
            self.fall_back_to_snapshot();
            self.watch_for_restore();
            return self.context.state();
        }

        let now = Utc::now();
        let established = if token::is_stale(issued_at, now, self.refresh_threshold) {
            info!(
                age_days = token::age_days(issued_at, now),
                "Session token past refresh threshold, refreshing"
            );
            match self.refresher.refresh().await {
                Ok(_) => true,
                Err(e) if e.is_auth() => {
                    warn!(error = %e, "Stored session rejected");
                    self.context.clear();
                    false
                }
                Err(e) => {
                    warn!(error = %e, "Refresh unavailable, keeping cached session");
                    self.fall_back_to_snapshot();
                    false
                }
            }
        } else {
            self.load_profile().await
        };

        if established {
            self.heartbeat();
        }
        self.context.state()
    }

    /// Fetch the profile and apply the failure policy. Returns whether a
    /// principal was established from the server.
    pub(crate) async fn load_profile(&self) -> bool {
        match self.api.fetch_profile().await {
            Ok(principal) => {
                debug!(user = %principal.id, "Profile loaded");
                self.context.publish(principal);
                true
            }
            Err(e) if e.is_auth() => {
                warn!(error = %e, "Profile fetch rejected, signing out locally");
                self.context.clear();
                false
            }
            Err(e) => {
                warn!(error = %e, "Profile fetch failed, keeping cached session");
                self.fall_back_to_snapshot();
                false
            }
        }
    }

    /// Keep the current principal, else install the cached snapshot, else
    /// report anonymous. The stored token is left alone in every case.
    fn fall_back_to_snapshot(&self) {
        if self.context.state().is_authenticated() {
            return;
        }
        let cached = self.context.credentials.cached_principal().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read principal snapshot");
            None
        });
        match cached {
            Some(cached) => {
                debug!(age = %cached.age_display(), "Using cached principal");
                self.context
                    .set_state(SessionState::Authenticated(cached.into_data()));
            }
            None => self.context.set_state(SessionState::Anonymous),
        }
    }

    /// Run the skipped profile fetch once connectivity comes back.
    fn watch_for_restore(self: &Arc<Self>) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("No async runtime, not watching for connectivity");
                return;
            }
        };
        let session = Arc::downgrade(self);
        let subscription = self.connectivity.on_restored(Box::new(move || {
            let Some(session) = session.upgrade() else {
                return;
            };
            session.restore_watch.lock().take();
            runtime.spawn(async move {
                info!("Connectivity restored, fetching profile");
                if session.load_profile().await {
                    session.heartbeat();
                }
            });
        }));
        *self.restore_watch.lock() = Some(subscription);
    }

    /// Fire the daily "still active" call without waiting for it.
    ///
    /// The marker is written only once the server accepted the call, so a
    /// heartbeat cut short by shutdown is retried on the next startup.
    pub(crate) fn heartbeat(&self) {
        match self.context.credentials.active_today(Utc::now()) {
            Ok(true) => {
                debug!("Heartbeat already sent today");
                return;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "Failed to read heartbeat marker");
                return;
            }
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                debug!("No async runtime, skipping heartbeat");
                return;
            }
        };

        let mut pending = self.heartbeat_task.lock();
        if pending.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("Heartbeat already in flight");
            return;
        }
        let api = self.api.clone();
        let credentials = self.context.credentials.clone();
        *pending = Some(runtime.spawn(async move {
            match api.heartbeat().await {
                Ok(()) => {
                    if let Err(e) = credentials.mark_active(Utc::now()) {
                        warn!(error = %e, "Failed to store heartbeat marker");
                    }
                }
                Err(e) => debug!(error = %e, "Heartbeat failed"),
            }
        }));
    }

    /// Wait for a heartbeat that is still being sent.
    pub(crate) async fn flush(&self) {
        let task = self.heartbeat_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                debug!(error = %e, "Heartbeat task did not finish");
            }
        }
    }
}
