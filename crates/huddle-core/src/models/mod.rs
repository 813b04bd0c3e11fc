//! Data models for the authenticated session.
//!
//! - `Principal`: the signed-in user's profile as returned by the API
//! - `Role`, `AccessGroup`: role-based capability checks
//! - `AuthPayload`: the `{ token, user }` shape every credential-issuing
//!   endpoint (and the refresh endpoint) responds with

pub mod principal;

pub use principal::{AccessGroup, AuthPayload, Principal, Role};
