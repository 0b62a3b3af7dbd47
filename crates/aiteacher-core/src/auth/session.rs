//! Session lifecycle: bootstrap, credential operations, and the single place
//! that reacts when the server rejects the current credential.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::error::AuthError;
use super::header::AuthHeader;
use super::recovery::{AccountRecovery, RecoveryUnavailable};
use super::storage::{FileStorage, Storage};
use super::token_store::{TokenStore, DEFAULT_TOKEN_LIFETIME};
use crate::api::{ApiClient, ApiError, ReqwestTransport, Transport};
use crate::config::Config;
use crate::models::{Child, NewAccount, NewChild, User};

/// How long bootstrap waits for the profile fetch before giving up
pub const DEFAULT_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(10);

/// Id given to a user synthesized from a login response without a profile
const FALLBACK_USER_ID: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Loading,
    Authenticated(User),
    Anonymous,
}

impl SessionState {
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    /// Still waiting for bootstrap to reach a verdict
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Uninitialized | SessionState::Loading)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Loading => "loading",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Anonymous => "anonymous",
        }
    }
}

type LogoutCallback = Arc<dyn Fn() + Send + Sync>;

/// One authentication context: token store, outgoing header, API client,
/// and the in-memory session state derived from them.
pub struct AuthSession {
    store: TokenStore,
    api: ApiClient,
    recovery: Box<dyn AccountRecovery>,
    state: Mutex<SessionState>,
    on_logout: Option<LogoutCallback>,
    token_lifetime: Duration,
    bootstrap_timeout: Duration,
}

impl AuthSession {
    /// Wire a session together. The token store and the API client share one
    /// `AuthHeader`.
    pub fn new(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let header = AuthHeader::new();
        Self {
            store: TokenStore::new(storage, clock, header.clone()),
            api: ApiClient::new(transport, header),
            recovery: Box::new(RecoveryUnavailable),
            state: Mutex::new(SessionState::Uninitialized),
            on_logout: None,
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            bootstrap_timeout: DEFAULT_BOOTSTRAP_TIMEOUT,
        }
    }

    /// Production wiring: token file in the cache directory, wall clock,
    /// HTTP transport to the configured backend.
    pub fn connect(config: &Config) -> anyhow::Result<Self> {
        let storage = FileStorage::new(config.token_path()?);
        debug!(path = ?storage.path(), "Token storage configured");
        let transport = ReqwestTransport::new(&config.api_base_url, config.request_timeout())?;

        Ok(Self::new(Arc::new(storage), Arc::new(SystemClock), Arc::new(transport))
            .with_token_lifetime(config.token_lifetime())
            .with_bootstrap_timeout(config.bootstrap_timeout()))
    }

    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    pub fn with_bootstrap_timeout(mut self, timeout: Duration) -> Self {
        self.bootstrap_timeout = timeout;
        self
    }

    pub fn with_recovery(mut self, recovery: impl AccountRecovery + 'static) -> Self {
        self.recovery = Box::new(recovery);
        self
    }

    /// Called whenever the server rejects the current credential and the
    /// session is torn down as a result
    pub fn with_logout_callback(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_logout = Some(Arc::new(callback));
        self
    }

    pub fn state(&self) -> SessionState {
        self.lock_state().clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.lock_state().user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock_state().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.lock_state().is_loading()
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    // =========================================================================
    // Bootstrap
    // =========================================================================

    /// Rebuild the session from the stored token.
    ///
    /// Never fails: a missing token, an unreachable server, a rejected token,
    /// or a timeout all end in `Anonymous`.
    pub async fn bootstrap(&self) -> SessionState {
        self.set_state(SessionState::Loading);

        let Some(token) = self.store.get() else {
            info!("No stored token, starting anonymous");
            self.set_state(SessionState::Anonymous);
            return SessionState::Anonymous;
        };

        self.store.header().set(Some(&token));
        let generation = self.store.generation();
        debug!("Stored token found, fetching profile");

        let fetched = match tokio::time::timeout(self.bootstrap_timeout, self.api.current_user()).await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = self.bootstrap_timeout.as_millis() as u64, "Profile fetch timed out");
                Err(ApiError::Timeout)
            }
        };

        let mut state = self.lock_state();
        match self.intercept_locked(&mut state, fetched) {
            Ok(user) if self.store.generation() == generation => {
                info!(user_id = %user.id, "Session restored");
                *state = SessionState::Authenticated(user);
            }
            Ok(_) => {
                info!("Session cleared while profile fetch was in flight");
                *state = SessionState::Anonymous;
            }
            Err(rejected @ AuthError::AuthRejected { .. }) => {
                warn!(error = %rejected, "Stored token rejected");
                drop(state);
                self.notify_logout();
                return SessionState::Anonymous;
            }
            Err(e) => {
                warn!(error = %e, "Failed to restore session, clearing token");
                self.store.clear();
                *state = SessionState::Anonymous;
            }
        }
        state.clone()
    }

    // =========================================================================
    // Credential operations
    // =========================================================================

    /// Exchange credentials for a token and start a session.
    ///
    /// A 401/403 ends the current session like on any other endpoint; other
    /// failures leave it as it was. A logout that
    /// lands while the exchange is in flight wins: the late token is dropped
    /// and `Superseded` is returned.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<User, AuthError> {
        AuthError::require_field(identifier, "Email")?;
        AuthError::require_field(secret, "Password")?;

        let generation = self.store.generation();
        info!(identifier, "Logging in");

        let body = self
            .intercept(self.api.login(identifier, secret).await)
            .map_err(|e| {
                warn!(error = %e, "Login failed");
                e
            })?;
        let grant = LoginGrant::from_response(&body, identifier)?;

        let mut state = self.lock_state();
        self.store
            .store_if_current(generation, &grant.access_token, self.token_lifetime)?;
        *state = SessionState::Authenticated(grant.user.clone());
        info!(user_id = %grant.user.id, "Login successful");
        Ok(grant.user)
    }

    /// Create an account. Does not log in: the new user verifies their email
    /// and logs in separately.
    pub async fn register(&self, account: &NewAccount) -> Result<Value, AuthError> {
        AuthError::require_field(&account.email, "Email")?;
        AuthError::require_field(&account.password, "Password")?;
        AuthError::require_field(&account.name, "Name")?;

        let body = self.intercept(self.api.register(account).await).map_err(|e| {
            warn!(error = %e, "Registration failed");
            e
        })?;
        info!(email = %account.email, "Account registered");
        Ok(body)
    }

    /// Forget the token and the user. No network call.
    pub fn logout(&self) {
        let mut state = self.lock_state();
        self.store.clear();
        *state = SessionState::Anonymous;
        info!("Logged out");
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        AuthError::require_field(email, "Email")?;
        self.recovery.request_password_reset(email).await
    }

    pub async fn verify_email(&self, token: &str) -> Result<(), AuthError> {
        AuthError::require_field(token, "Verification token")?;
        self.recovery.verify_email(token).await
    }

    // =========================================================================
    // Authenticated operations
    // =========================================================================

    /// Re-fetch the profile and update the session with it
    pub async fn refresh_profile(&self) -> Result<User, AuthError> {
        self.ensure_token()?;
        let user = self.intercept(self.api.current_user().await)?;
        let mut state = self.lock_state();
        if state.is_authenticated() {
            *state = SessionState::Authenticated(user.clone());
        }
        Ok(user)
    }

    pub async fn list_children(&self) -> Result<Vec<Child>, AuthError> {
        self.ensure_token()?;
        self.intercept(self.api.list_children().await)
    }

    pub async fn get_child(&self, child_id: &str) -> Result<Child, AuthError> {
        AuthError::require_field(child_id, "Child id")?;
        self.ensure_token()?;
        self.intercept(self.api.get_child(child_id).await)
    }

    pub async fn create_child(&self, child: &NewChild) -> Result<Child, AuthError> {
        if let Some(problem) = child.missing_field() {
            return Err(AuthError::ValidationFailure(problem.to_string()));
        }
        self.ensure_token()?;
        let created = self.intercept(self.api.create_child(child).await)?;
        info!(child_id = %created.id, "Child profile created");
        Ok(created)
    }

    /// The one place that reacts to a rejected credential.
    ///
    /// A 401/403 clears the token, ends the session, and fires the logout
    /// callback once; the original error is handed back. Everything else
    /// passes through unchanged.
    pub fn intercept<T>(&self, result: Result<T, ApiError>) -> Result<T, AuthError> {
        let mut state = self.lock_state();
        let outcome = self.intercept_locked(&mut state, result);
        drop(state);
        if matches!(outcome, Err(AuthError::AuthRejected { .. })) {
            self.notify_logout();
        }
        outcome
    }

    fn intercept_locked<T>(
        &self,
        state: &mut MutexGuard<'_, SessionState>,
        result: Result<T, ApiError>,
    ) -> Result<T, AuthError> {
        match result {
            Ok(value) => Ok(value),
            Err(ApiError::AuthRejected { status, detail }) => {
                warn!(status, "Credential rejected by server, ending session");
                self.store.clear();
                **state = SessionState::Anonymous;
                Err(AuthError::AuthRejected { status, detail })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fail fast when there is no usable token. An expired token ends the
    /// session.
    fn ensure_token(&self) -> Result<(), AuthError> {
        match self.store.require() {
            Ok(_) => Ok(()),
            Err(e @ (AuthError::NoToken | AuthError::ExpiredToken)) => {
                let mut state = self.lock_state();
                if state.is_authenticated() {
                    info!(reason = %e, "Ending session");
                    *state = SessionState::Anonymous;
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn notify_logout(&self) {
        if let Some(ref callback) = self.on_logout {
            callback();
        }
    }

    fn set_state(&self, next: SessionState) {
        *self.lock_state() = next;
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// Login response
// ============================================================================

/// The usable parts of a login response
#[derive(Debug)]
struct LoginGrant {
    access_token: String,
    user: User,
}

impl LoginGrant {
    fn from_response(body: &Value, identifier: &str) -> Result<Self, AuthError> {
        let access_token = match body.get("access_token") {
            Some(Value::String(token)) if !token.trim().is_empty() => token.clone(),
            _ => {
                warn!("Login response has no access_token");
                return Err(AuthError::MalformedResponse(
                    "login response has no access_token".to_string(),
                ));
            }
        };

        let user = match body.get("user").filter(|u| !u.is_null()) {
            Some(raw) => match serde_json::from_value::<User>(raw.clone()) {
                Ok(user) => user,
                Err(e) => {
                    warn!(error = %e, "Login response user is incomplete, synthesizing one");
                    Self::fallback_user(body, identifier)
                }
            },
            None => {
                warn!("Login response has no user, synthesizing one");
                Self::fallback_user(body, identifier)
            }
        };

        Ok(Self { access_token, user })
    }

    fn fallback_user(body: &Value, identifier: &str) -> User {
        User {
            id: Self::text_field(body, "id").unwrap_or_else(|| FALLBACK_USER_ID.to_string()),
            email: Self::text_field(body, "email").unwrap_or_else(|| identifier.to_string()),
            name: Self::text_field(body, "name")
                .unwrap_or_else(|| User::local_part(identifier).to_string()),
        }
    }

    fn text_field(body: &Value, key: &str) -> Option<String> {
        match body.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    use crate::api::transport::stub::StubTransport;
    use crate::api::RequestBody;
    use crate::auth::clock::ManualClock;
    use crate::auth::storage::MemoryStorage;

    const START_MS: i64 = 1_700_000_000_000;

    struct Harness {
        session: AuthSession,
        stub: Arc<StubTransport>,
        storage: Arc<MemoryStorage>,
        clock: Arc<ManualClock>,
        logouts: Arc<AtomicUsize>,
    }

    fn harness_with(stub: StubTransport) -> Harness {
        let stub = Arc::new(stub);
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(ManualClock::new(START_MS));
        let logouts = Arc::new(AtomicUsize::new(0));
        let counter = logouts.clone();
        let session = AuthSession::new(storage.clone(), clock.clone(), stub.clone())
            .with_logout_callback(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        Harness {
            session,
            stub,
            storage,
            clock,
            logouts,
        }
    }

    fn harness() -> Harness {
        harness_with(StubTransport::new())
    }

    fn profile() -> Value {
        json!({"id": "u1", "email": "parent@example.com", "name": "Pat Parent"})
    }

    // -------------------------------------------------------------------------
    // Bootstrap
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_bootstrap_without_token_is_anonymous_and_offline() {
        let h = harness();
        assert!(h.session.is_loading());

        let state = h.session.bootstrap().await;
        assert_eq!(state, SessionState::Anonymous);
        assert!(!h.session.is_loading());
        assert_eq!(h.stub.request_count(), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_with_valid_token_restores_user() {
        let h = harness();
        h.session.token_store().store("tok", DEFAULT_TOKEN_LIFETIME).unwrap();
        h.stub.respond(200, profile());

        let state = h.session.bootstrap().await;
        assert_eq!(state.user().map(|u| u.name.as_str()), Some("Pat Parent"));

        let requests = h.stub.requests();
        assert_eq!(requests[0].path, "/api/v1/users/me");
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn test_bootstrap_with_failing_fetch_clears_store() {
        let h = harness();
        h.session.token_store().store("tok", DEFAULT_TOKEN_LIFETIME).unwrap();
        h.stub.respond(500, json!({"detail": "boom"}));

        let state = h.session.bootstrap().await;
        assert_eq!(state, SessionState::Anonymous);
        assert!(h.storage.is_empty());
        assert_eq!(h.session.token_store().get(), None);
        assert_eq!(h.logouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_with_network_failure_clears_store() {
        let h = harness();
        h.session.token_store().store("tok", DEFAULT_TOKEN_LIFETIME).unwrap();
        h.stub.fail(ApiError::Network("connection refused".to_string()));

        assert_eq!(h.session.bootstrap().await, SessionState::Anonymous);
        assert!(h.storage.is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_with_rejected_token_fires_logout_once() {
        let h = harness();
        h.session.token_store().store("tok", DEFAULT_TOKEN_LIFETIME).unwrap();
        h.stub.respond(401, json!({"detail": "Could not validate credentials"}));

        assert_eq!(h.session.bootstrap().await, SessionState::Anonymous);
        assert!(h.storage.is_empty());
        assert_eq!(h.logouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_with_expired_token_skips_network() {
        let h = harness();
        h.session
            .token_store()
            .store("tok", Duration::from_millis(1_000))
            .unwrap();
        h.clock.advance(Duration::from_millis(1_000));

        assert_eq!(h.session.bootstrap().await, SessionState::Anonymous);
        assert_eq!(h.stub.request_count(), 0);
        assert!(h.storage.is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_times_out() {
        // The gate is never opened, so the fetch hangs
        let h = harness_with(StubTransport::gated(Arc::new(Notify::new())));
        let session = h.session.with_bootstrap_timeout(Duration::from_millis(20));
        session.token_store().store("tok", DEFAULT_TOKEN_LIFETIME).unwrap();

        assert_eq!(session.bootstrap().await, SessionState::Anonymous);
        assert_eq!(session.token_store().get(), None);
    }

    // -------------------------------------------------------------------------
    // Login
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_login_without_user_synthesizes_from_identifier() {
        let h = harness();
        h.stub.respond(200, json!({"access_token": "abc"}));

        let user = h.session.login("kid@example.com", "pw").await.unwrap();
        assert_eq!(
            user,
            User {
                id: "unknown".to_string(),
                email: "kid@example.com".to_string(),
                name: "kid".to_string(),
            }
        );
        assert_eq!(h.session.current_user(), Some(user));
        assert_eq!(h.session.token_store().get().as_deref(), Some("abc"));
        assert_eq!(
            h.session.token_store().header().bearer().as_deref(),
            Some("Bearer abc")
        );
    }

    #[tokio::test]
    async fn test_login_uses_top_level_fields_before_identifier() {
        let h = harness();
        h.stub.respond(200, json!({"access_token": "abc", "id": 42, "name": "Kid"}));

        let user = h.session.login("kid@example.com", "pw").await.unwrap();
        assert_eq!(user.id, "42");
        assert_eq!(user.name, "Kid");
        assert_eq!(user.email, "kid@example.com");
    }

    #[tokio::test]
    async fn test_login_with_user_uses_it_verbatim() {
        let h = harness();
        h.stub.respond(
            200,
            json!({"access_token": "abc", "token_type": "bearer", "user": profile()}),
        );

        let user = h.session.login("parent@example.com", "pw").await.unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.name, "Pat Parent");
        assert!(h.session.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_without_token_is_malformed() {
        let h = harness();
        h.stub.respond(200, json!({"user": profile()}));
        h.stub.respond(200, json!({"access_token": ""}));

        let err = h.session.login("parent@example.com", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedResponse(_)));
        let err = h.session.login("parent@example.com", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedResponse(_)));

        assert!(h.storage.is_empty());
        assert_eq!(h.session.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_rejected_login_ends_existing_session() {
        let h = harness();
        h.stub.respond(200, json!({"access_token": "first", "user": profile()}));
        h.session.login("parent@example.com", "pw").await.unwrap();

        h.stub.respond(401, json!({"detail": "Incorrect email or password"}));
        let err = h.session.login("other@example.com", "bad").await.unwrap_err();
        assert_eq!(err.user_message(), "Incorrect email or password");

        assert_eq!(h.session.state(), SessionState::Anonymous);
        assert_eq!(h.session.token_store().get(), None);
        assert!(h.storage.is_empty());
        assert!(!h.session.token_store().header().is_set());
        assert_eq!(h.logouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_auth_login_failure_keeps_session() {
        let h = harness();
        h.stub.respond(200, json!({"access_token": "first", "user": profile()}));
        h.session.login("parent@example.com", "pw").await.unwrap();

        h.stub.respond(400, json!({"detail": "Inactive user"}));
        let err = h.session.login("other@example.com", "pw").await.unwrap_err();
        assert_eq!(err.user_message(), "Inactive user");

        assert_eq!(h.session.current_user().map(|u| u.id), Some("u1".to_string()));
        assert_eq!(h.session.token_store().get().as_deref(), Some("first"));
        assert_eq!(h.logouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rate_limited_login_is_sent_once() {
        let h = harness();
        h.stub.respond(429, json!({"detail": "Too many requests"}));
        h.stub.respond(200, json!({"access_token": "abc", "user": profile()}));

        let err = h.session.login("parent@example.com", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::Server(_)));
        assert_eq!(h.stub.request_count(), 1);
        assert!(h.storage.is_empty());
        assert_eq!(h.logouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_login_requires_fields() {
        let h = harness();
        let err = h.session.login("", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::ValidationFailure(_)));
        let err = h.session.login("kid@example.com", "").await.unwrap_err();
        assert_eq!(err.to_string(), "Password is required");
        assert_eq!(h.stub.request_count(), 0);
    }

    #[tokio::test]
    async fn test_logout_supersedes_in_flight_login() {
        let gate = Arc::new(Notify::new());
        let h = harness_with(StubTransport::gated(gate.clone()));
        h.stub.respond(200, json!({"access_token": "late"}));

        let (login, ()) = tokio::join!(h.session.login("kid@example.com", "pw"), async {
            h.stub.received.notified().await;
            h.session.logout();
            gate.notify_one();
        });

        assert!(matches!(login, Err(AuthError::Superseded)));
        assert_eq!(h.session.state(), SessionState::Anonymous);
        assert_eq!(h.session.token_store().get(), None);
        assert!(!h.session.token_store().header().is_set());
    }

    #[tokio::test]
    async fn test_login_token_expires_after_configured_lifetime() {
        let h = harness();
        let session = h.session.with_token_lifetime(Duration::from_secs(60));
        h.stub.respond(200, json!({"access_token": "abc"}));
        session.login("kid@example.com", "pw").await.unwrap();

        h.clock.advance(Duration::from_secs(60));
        assert_eq!(session.token_store().get(), None);
    }

    // -------------------------------------------------------------------------
    // Register / logout / recovery
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_register_does_not_start_session() {
        let h = harness();
        h.stub.respond(201, json!({"id": "u2", "email": "new@example.com", "name": "New"}));

        let body = h
            .session
            .register(&NewAccount::new("new@example.com", "password123", "New"))
            .await
            .unwrap();
        assert_eq!(body["id"], "u2");
        assert!(h.storage.is_empty());
        assert!(!h.session.is_authenticated());
        assert!(matches!(h.stub.requests()[0].body, RequestBody::Json(_)));
    }

    #[tokio::test]
    async fn test_register_surfaces_server_detail() {
        let h = harness();
        h.stub.respond(400, json!({"detail": "A user with this email already exists"}));

        let err = h
            .session
            .register(&NewAccount::new("dup@example.com", "password123", "Dup"))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "A user with this email already exists");
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let h = harness();
        h.stub.respond(200, json!({"access_token": "abc", "user": profile()}));
        h.session.login("parent@example.com", "pw").await.unwrap();

        h.session.logout();
        h.session.logout();
        assert_eq!(h.session.state(), SessionState::Anonymous);
        assert!(h.storage.is_empty());
        assert!(!h.session.token_store().header().is_set());
        assert_eq!(h.logouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_recovery_unavailable_by_default() {
        let h = harness();
        let err = h.session.reset_password("kid@example.com").await.unwrap_err();
        assert!(matches!(err, AuthError::Unsupported("Password reset")));
        let err = h.session.verify_email("token").await.unwrap_err();
        assert!(matches!(err, AuthError::Unsupported("Email verification")));
        let err = h.session.verify_email("").await.unwrap_err();
        assert!(matches!(err, AuthError::ValidationFailure(_)));
    }

    #[tokio::test]
    async fn test_installed_recovery_is_used() {
        struct Recorder(Arc<AtomicUsize>);

        #[async_trait]
        impl AccountRecovery for Recorder {
            async fn request_password_reset(&self, _email: &str) -> Result<(), AuthError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            async fn verify_email(&self, _token: &str) -> Result<(), AuthError> {
                self.0.fetch_add(10, Ordering::SeqCst);
                Ok(())
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let session = harness().session.with_recovery(Recorder(calls.clone()));
        session.reset_password("kid@example.com").await.unwrap();
        session.verify_email("t").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 11);
    }

    // -------------------------------------------------------------------------
    // Interception
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_unauthorized_from_any_endpoint_forces_logout_once() {
        let h = harness();
        h.stub.respond(200, json!({"access_token": "abc", "user": profile()}));
        h.session.login("parent@example.com", "pw").await.unwrap();

        h.stub.respond(401, json!({"detail": "Token expired"}));
        let err = h.session.list_children().await.unwrap_err();

        assert!(matches!(err, AuthError::AuthRejected { status: 401, .. }));
        assert_eq!(h.logouts.load(Ordering::SeqCst), 1);
        assert_eq!(h.session.state(), SessionState::Anonymous);
        assert!(h.storage.is_empty());
        // The failed request is not retried
        assert_eq!(h.stub.request_count(), 2);
    }

    #[tokio::test]
    async fn test_forbidden_also_forces_logout() {
        let h = harness();
        h.session.token_store().store("tok", DEFAULT_TOKEN_LIFETIME).unwrap();
        h.stub.respond(403, json!({"detail": "Not enough permissions"}));

        let err = h.session.get_child("c1").await.unwrap_err();
        assert!(matches!(err, AuthError::AuthRejected { status: 403, .. }));
        assert_eq!(h.logouts.load(Ordering::SeqCst), 1);
        assert_eq!(h.session.token_store().get(), None);
    }

    #[tokio::test]
    async fn test_non_auth_errors_pass_through() {
        let h = harness();
        h.session.token_store().store("tok", DEFAULT_TOKEN_LIFETIME).unwrap();
        h.stub.respond(404, json!({"detail": "Child profile not found"}));

        let err = h.session.get_child("missing").await.unwrap_err();
        assert!(matches!(err, AuthError::Server(_)));
        assert_eq!(h.logouts.load(Ordering::SeqCst), 0);
        assert_eq!(h.session.token_store().get().as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_authenticated_call_without_token_fails_fast() {
        let h = harness();
        let err = h.session.list_children().await.unwrap_err();
        assert!(matches!(err, AuthError::NoToken));
        assert_eq!(h.stub.request_count(), 0);
        assert_eq!(h.logouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_token_ends_session() {
        let h = harness();
        h.stub.respond(200, json!({"access_token": "abc", "user": profile()}));
        h.session.login("parent@example.com", "pw").await.unwrap();

        h.clock.advance(DEFAULT_TOKEN_LIFETIME);
        let err = h.session.list_children().await.unwrap_err();
        assert!(matches!(err, AuthError::ExpiredToken));
        assert_eq!(h.session.state(), SessionState::Anonymous);
    }

    // -------------------------------------------------------------------------
    // Children
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_child_validates_before_sending() {
        let h = harness();
        h.session.token_store().store("tok", DEFAULT_TOKEN_LIFETIME).unwrap();

        let err = h
            .session
            .create_child(&NewChild::new("Ada", "3rd grade", vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "At least one subject must be specified");
        assert_eq!(h.stub.request_count(), 0);
    }

    #[tokio::test]
    async fn test_create_child_posts_with_bearer() {
        let h = harness();
        h.session.token_store().store("tok", DEFAULT_TOKEN_LIFETIME).unwrap();
        h.stub.respond(
            201,
            json!({"id": "c1", "name": "Ada", "grade": "3rd grade", "subjects": ["Math"], "parent_id": "u1"}),
        );

        let child = h
            .session
            .create_child(&NewChild::new("Ada", "3rd grade", vec!["Math".to_string()]))
            .await
            .unwrap();
        assert_eq!(child.id, "c1");

        let request = &h.stub.requests()[0];
        assert_eq!(request.path, "/api/v1/children/");
        assert_eq!(request.authorization.as_deref(), Some("Bearer tok"));
    }

    #[test]
    fn test_session_state_helpers() {
        assert!(SessionState::Uninitialized.is_loading());
        assert!(SessionState::Loading.is_loading());
        assert!(!SessionState::Anonymous.is_loading());
        assert_eq!(SessionState::Anonymous.label(), "anonymous");
        assert_eq!(SessionState::Anonymous.user(), None);
    }
}
