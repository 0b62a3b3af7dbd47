use async_trait::async_trait;
use tracing::info;

use super::error::AuthError;

/// Password reset and email verification.
///
/// The backend has no endpoints for these yet, so the session delegates to
/// whatever implementation the application installs.
#[async_trait]
pub trait AccountRecovery: Send + Sync {
    /// Ask the backend to send a password reset message to `email`
    async fn request_password_reset(&self, email: &str) -> Result<(), AuthError>;

    /// Confirm an email address with the token from the verification link
    async fn verify_email(&self, token: &str) -> Result<(), AuthError>;
}

/// Installed by default: reports the operation as unsupported instead of
/// pretending it worked.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryUnavailable;

#[async_trait]
impl AccountRecovery for RecoveryUnavailable {
    async fn request_password_reset(&self, _email: &str) -> Result<(), AuthError> {
        info!("Password reset requested but no recovery backend is configured");
        Err(AuthError::Unsupported("Password reset"))
    }

    async fn verify_email(&self, _token: &str) -> Result<(), AuthError> {
        info!("Email verification requested but no recovery backend is configured");
        Err(AuthError::Unsupported("Email verification"))
    }
}
