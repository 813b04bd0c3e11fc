//! Huddle core - session lifecycle for the Huddle community dashboard.
//!
//! Holds the signed session token, decides when it has gone stale, refreshes
//! it at most once at a time, and keeps a usable principal around when the
//! network is not.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod models;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, ApiError, ApiRequest, ErrorKind, RefreshError, Transport};
pub use auth::{CredentialStore, Session, SessionState};
pub use config::Config;
pub use connectivity::{AlwaysOnline, ConnectivityMonitor, ConnectivityObserver, Subscription};
pub use models::{AccessGroup, Principal, Role};
