//! aiteacher-core - client session core for the AI Teacher tutoring platform.
//!
//! This crate holds everything the front ends share:
//!
//! - `auth`: token storage with lazy expiry, the outgoing credential, and the
//!   `AuthSession` that bootstraps, logs in and out, and reacts to rejected
//!   credentials
//! - `api`: REST client for the auth, profile, and child-profile endpoints
//! - `guard`: the route table and the guard in front of protected routes
//! - `config`: persisted client configuration
//! - `models`: API data types

pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthError, AuthSession, SessionState, TokenStore};
pub use config::Config;
pub use guard::{GuardDecision, Navigation, Route, RouteGuard};
pub use models::{Child, NewAccount, NewChild, User};
