//! Authentication module: holding, validating and renewing the session.
//!
//! This module provides:
//! - `Session`: the facade the rest of the application talks to
//! - `CredentialStore`: persisted token, heartbeat marker and principal snapshot
//! - `RefreshCoordinator`: single-flight token refresh
//! - `RetryInterceptor`: replays calls that failed on an expired token
//! - `token`: unverified token age inspection
//!
//! Tokens older than the configured threshold (14 days by default) are
//! refreshed during startup; younger ones are refreshed only when the server
//! reports them expired.

mod bootstrap;
pub(crate) mod context;
pub mod credentials;
pub mod interceptor;
pub mod refresh;
pub mod session;
pub mod storage;
pub mod token;

pub use context::SessionState;
pub use credentials::CredentialStore;
pub use interceptor::RetryInterceptor;
pub use refresh::RefreshCoordinator;
pub use session::Session;
pub use storage::{FileStorage, KeyringStorage, MemoryStorage, Storage};
