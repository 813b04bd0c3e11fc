//! Best-effort snapshots of server data.
//!
//! The only snapshot kept today is the last-known `Principal`, used as a
//! display fallback while offline or when the API is unreachable. A snapshot
//! is never used to authorize a request.

pub mod snapshot;

pub use snapshot::CachedData;
