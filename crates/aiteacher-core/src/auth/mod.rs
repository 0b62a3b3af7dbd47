//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `TokenStore`: persisted bearer token with lazy expiry
//! - `AuthHeader`: the credential attached to outgoing requests
//! - `AuthSession`: bootstrap, login/logout, and the central reaction to
//!   rejected credentials
//! - `AccountRecovery`: extension point for password reset and email
//!   verification
//!
//! Tokens live for one hour unless the caller says otherwise.

pub mod clock;
pub mod error;
pub mod header;
pub mod recovery;
pub mod session;
pub mod storage;
pub mod token_store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::AuthError;
pub use header::AuthHeader;
pub use recovery::{AccountRecovery, RecoveryUnavailable};
pub use session::{AuthSession, SessionState};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use token_store::{TokenStore, DEFAULT_TOKEN_LIFETIME};
