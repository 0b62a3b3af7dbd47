use std::sync::{Arc, RwLock};

/// The credential attached to every outgoing request made through one
/// session context.
///
/// Clones share the same slot: the `TokenStore` writes it, the `ApiClient`
/// reads it at dispatch time. Last write wins.
#[derive(Debug, Clone, Default)]
pub struct AuthHeader {
    token: Arc<RwLock<Option<String>>>,
}

impl AuthHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear the bearer token
    pub fn set(&self, token: Option<&str>) {
        let mut slot = self.token.write().unwrap_or_else(|e| e.into_inner());
        *slot = token.map(str::to_string);
    }

    /// The `Authorization` header value, if a token is set
    pub fn bearer(&self) -> Option<String> {
        let slot = self.token.read().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().map(|t| format!("Bearer {}", t))
    }

    pub fn is_set(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}
