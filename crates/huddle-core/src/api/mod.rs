//! REST API client module for the Huddle dashboard API.
//!
//! This module provides the `ApiClient` for making calls that ride on the
//! current session, the `Transport` seam that performs the actual HTTP
//! exchange, and the classified `ApiError`.
//!
//! The API uses JWT bearer tokens obtained from the sign-in endpoints and
//! renewed through `/api/sessions/refresh`.

pub mod client;
pub mod error;
pub mod transport;

pub use client::{ApiClient, SignUpRequest};
pub use error::{ApiError, ErrorKind, RefreshError};
pub use transport::{ApiRequest, AuthHeader, Method, ReqwestTransport, Transport};
