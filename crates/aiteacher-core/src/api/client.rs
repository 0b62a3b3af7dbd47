//! API client for the tutoring platform REST backend.
//!
//! Every request picks up the session's current `Authorization` value at
//! dispatch time, overriding anything the caller set. Responses come back as
//! tagged results: a 401/403 from any endpoint is `ApiError::AuthRejected`,
//! which the session layer reacts to in one place.

use std::sync::Arc;

use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::transport::{ApiRequest, RawResponse, RequestBody, Transport};
use super::ApiError;
use crate::auth::AuthHeader;
use crate::models::{Child, NewAccount, NewChild, User};

// ============================================================================
// Constants
// ============================================================================

const LOGIN_PATH: &str = "/api/v1/auth/login";
const REGISTER_PATH: &str = "/api/v1/auth/register";
const CURRENT_USER_PATH: &str = "/api/v1/users/me";
const CHILDREN_PATH: &str = "/api/v1/children/";

#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    header: AuthHeader,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, header: AuthHeader) -> Self {
        Self { transport, header }
    }

    pub fn header(&self) -> &AuthHeader {
        &self.header
    }

    /// Exchange credentials for a token. The body is returned untouched; the
    /// session layer decides whether it carries a usable token.
    pub async fn login(&self, username: &str, password: &str) -> Result<Value, ApiError> {
        let form = vec![
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
        ];
        self.request(Method::POST, LOGIN_PATH, RequestBody::Form(form))
            .await
    }

    /// Create an account. Returns the server's body for display.
    pub async fn register(&self, account: &NewAccount) -> Result<Value, ApiError> {
        self.post(REGISTER_PATH, account).await
    }

    /// Profile of the user the current token belongs to
    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.get(CURRENT_USER_PATH).await
    }

    // ===== Children =====

    pub async fn list_children(&self) -> Result<Vec<Child>, ApiError> {
        self.get(CHILDREN_PATH).await
    }

    pub async fn get_child(&self, child_id: &str) -> Result<Child, ApiError> {
        self.get(&child_path(child_id)?).await
    }

    pub async fn create_child(&self, child: &NewChild) -> Result<Child, ApiError> {
        self.post(CHILDREN_PATH, child).await
    }

    // ===== Plumbing =====

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::GET, path, RequestBody::Empty).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let json = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode request: {}", e)))?;
        self.request(Method::POST, path, RequestBody::Json(json))
            .await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> Result<T, ApiError> {
        let response = self.send(ApiRequest::new(method, path).with_body(body)).await?;
        serde_json::from_str(&response.body).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", path, e))
        })
    }

    /// Attach the current credential, send once, and classify the status.
    /// Nothing is retried, so a credential form is never sent twice.
    pub async fn send(&self, mut request: ApiRequest) -> Result<RawResponse, ApiError> {
        request.authorization = self.header.bearer();
        debug!(
            method = %request.method,
            path = %request.path,
            authorized = request.authorization.is_some(),
            "Sending request"
        );

        let path = request.path.clone();
        let response = self.transport.send(request).await?;
        if response.is_success() {
            return Ok(response);
        }

        let err = ApiError::from_status(response.status, &response.body);
        warn!(path = %path, status = response.status, error = %err, "Request failed");
        Err(err)
    }
}

/// Path of one child profile. Ids are UUID-like; anything that could leave
/// the `/children/` segment is refused before a request is made.
fn child_path(child_id: &str) -> Result<String, ApiError> {
    let valid = !child_id.is_empty()
        && child_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ApiError::Validation(format!("Invalid child id: {:?}", child_id)));
    }
    Ok(format!("{}{}", CHILDREN_PATH, child_id))
}
