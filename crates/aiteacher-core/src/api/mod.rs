//! REST API client module for the tutoring platform backend.
//!
//! This module provides the `ApiClient` for the authentication, profile, and
//! child-profile endpoints, and the `Transport` seam it sends through.
//!
//! The API uses bearer token authentication obtained from the
//! `/api/v1/auth/login` endpoint.

pub mod client;
pub mod error;
pub mod transport;

pub use client::ApiClient;
pub use error::{detail_message, detail_or_generic, ApiError};
pub use transport::{ApiRequest, RawResponse, ReqwestTransport, RequestBody, Transport};
