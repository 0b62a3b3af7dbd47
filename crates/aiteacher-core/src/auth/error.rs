use thiserror::Error;

use super::storage::StorageError;
use crate::api::ApiError;

/// Errors surfaced by session and credential operations
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Not logged in")]
    NoToken,

    #[error("Session expired")]
    ExpiredToken,

    #[error("Malformed response from server: {0}")]
    MalformedResponse(String),

    #[error("Authentication rejected ({status}): {detail}")]
    AuthRejected { status: u16, detail: String },

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Request timed out")]
    Timeout,

    #[error("{0}")]
    ValidationFailure(String),

    #[error("Credential storage failed: {0}")]
    Storage(#[from] StorageError),

    /// A logout happened while this operation was in flight
    #[error("Operation superseded by logout")]
    Superseded,

    #[error("{0} is not available")]
    Unsupported(&'static str),

    #[error("Server error: {0}")]
    Server(String),
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::AuthRejected { status, detail } => AuthError::AuthRejected { status, detail },
            ApiError::Validation(msg) => AuthError::ValidationFailure(msg),
            ApiError::Network(msg) => AuthError::NetworkFailure(msg),
            ApiError::Timeout => AuthError::Timeout,
            ApiError::NotFound(msg) => AuthError::Server(format!("Not found: {}", msg)),
            ApiError::RateLimited => {
                AuthError::Server("Too many requests, please wait and retry".to_string())
            }
            ApiError::ServerError(msg) => AuthError::Server(msg),
            ApiError::InvalidResponse(msg) => AuthError::MalformedResponse(msg),
        }
    }
}

impl AuthError {
    /// Require a non-empty form field
    pub(crate) fn require_field(value: &str, field: &str) -> Result<(), AuthError> {
        if value.trim().is_empty() {
            return Err(AuthError::ValidationFailure(format!("{} is required", field)));
        }
        Ok(())
    }

    /// A message suitable for showing to the person at the keyboard
    pub fn user_message(&self) -> String {
        match self {
            AuthError::NoToken => "You are not logged in.".to_string(),
            AuthError::ExpiredToken => "Your session has expired. Please log in again.".to_string(),
            AuthError::MalformedResponse(_) => "Invalid response format from server".to_string(),
            AuthError::AuthRejected { status: 401, detail } if !detail.is_empty() => detail.clone(),
            AuthError::AuthRejected { .. } => {
                "Not authorized. Please log in again.".to_string()
            }
            AuthError::NetworkFailure(_) => {
                "Unable to connect to server. Check your connection.".to_string()
            }
            AuthError::Timeout => "The server took too long to respond. Try again.".to_string(),
            AuthError::ValidationFailure(msg) => msg.clone(),
            AuthError::Storage(_) => {
                "Could not save your session on this device.".to_string()
            }
            AuthError::Superseded => "Login cancelled because you logged out.".to_string(),
            AuthError::Unsupported(what) => format!("{} is not available yet.", what),
            AuthError::Server(msg) => format!("Request failed: {}", msg),
        }
    }
}
