use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::error::AuthError;
use super::header::AuthHeader;
use super::storage::Storage;

/// Storage key for the bearer token
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Storage key for the token's absolute expiry, in epoch milliseconds
pub const TOKEN_EXPIRY_KEY: &str = "token_expiry";

/// Token lifetime when the caller does not specify one
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Durable home of the bearer token.
///
/// Expiry is checked lazily on read; nothing runs in the background. Every
/// write to storage and the matching update of the shared `AuthHeader` happen
/// under one lock, together with a generation counter that `clear()` bumps.
pub struct TokenStore {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    header: AuthHeader,
    generation: Mutex<u64>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, header: AuthHeader) -> Self {
        Self {
            storage,
            clock,
            header,
            generation: Mutex::new(0),
        }
    }

    pub fn header(&self) -> &AuthHeader {
        &self.header
    }

    /// Current generation. Changes every time the store is cleared.
    pub fn generation(&self) -> u64 {
        *self.lock()
    }

    /// Persist a token valid for `lifetime` and make it the outgoing credential
    pub fn store(&self, token: &str, lifetime: Duration) -> Result<(), AuthError> {
        let guard = self.lock();
        self.write_locked(&guard, token, lifetime)
    }

    /// Like `store`, but refuses if the store was cleared since `generation`
    /// was read. A login that started before a logout must not resurrect the
    /// session when its response finally arrives.
    pub fn store_if_current(
        &self,
        generation: u64,
        token: &str,
        lifetime: Duration,
    ) -> Result<(), AuthError> {
        let guard = self.lock();
        if *guard != generation {
            warn!(
                expected = generation,
                current = *guard,
                "Discarding token from superseded operation"
            );
            return Err(AuthError::Superseded);
        }
        self.write_locked(&guard, token, lifetime)
    }

    /// The stored token, if present and unexpired. An expired token is
    /// cleared as a side effect.
    pub fn get(&self) -> Option<String> {
        match self.require() {
            Ok(token) => Some(token),
            Err(AuthError::NoToken) | Err(AuthError::ExpiredToken) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read token, treating as logged out");
                None
            }
        }
    }

    /// Like `get`, but says why there is no token
    pub fn require(&self) -> Result<String, AuthError> {
        let mut guard = self.lock();
        let Some(token) = self.storage.get_item(AUTH_TOKEN_KEY)? else {
            return Err(AuthError::NoToken);
        };
        if self.expired_locked() {
            info!("Stored token has expired, clearing it");
            self.clear_locked(&mut guard);
            return Err(AuthError::ExpiredToken);
        }
        Ok(token)
    }

    /// True when no usable expiry is stored or the expiry has been reached
    pub fn is_expired(&self) -> bool {
        let _guard = self.lock();
        self.expired_locked()
    }

    /// Absolute expiry of the stored token, for display
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let _guard = self.lock();
        self.expiry_ms()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
    }

    /// Remove the token and its expiry, and stop sending the header. Storage
    /// failures are logged; the in-memory credential is always dropped.
    pub fn clear(&self) {
        let mut guard = self.lock();
        self.clear_locked(&mut guard);
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_locked(
        &self,
        _guard: &MutexGuard<'_, u64>,
        token: &str,
        lifetime: Duration,
    ) -> Result<(), AuthError> {
        let lifetime_ms = i64::try_from(lifetime.as_millis()).unwrap_or(i64::MAX);
        let expiry = self.clock.now_ms().saturating_add(lifetime_ms);
        let expiry_str = expiry.to_string();

        if let Err(e) = self
            .storage
            .set_items(&[(TOKEN_EXPIRY_KEY, expiry_str.as_str()), (AUTH_TOKEN_KEY, token)])
        {
            // Leave nothing behind that a later read could accept
            if let Err(cleanup) = self.storage.remove_items(&[AUTH_TOKEN_KEY, TOKEN_EXPIRY_KEY]) {
                warn!(error = %cleanup, "Failed to clean up after storage failure");
            }
            self.header.set(None);
            return Err(e.into());
        }

        self.header.set(Some(token));
        debug!(token_len = token.len(), expiry_ms = expiry, "Token stored");
        Ok(())
    }

    fn clear_locked(&self, guard: &mut MutexGuard<'_, u64>) {
        **guard += 1;
        if let Err(e) = self.storage.remove_items(&[AUTH_TOKEN_KEY, TOKEN_EXPIRY_KEY]) {
            warn!(error = %e, "Failed to remove token from storage");
        }
        self.header.set(None);
        debug!(generation = **guard, "Token cleared");
    }

    fn expiry_ms(&self) -> Option<i64> {
        match self.storage.get_item(TOKEN_EXPIRY_KEY) {
            Ok(Some(raw)) => raw.trim().parse().ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read token expiry");
                None
            }
        }
    }

    fn expired_locked(&self) -> bool {
        match self.expiry_ms() {
            Some(expiry) => self.clock.now_ms() >= expiry,
            None => true,
        }
    }
}
