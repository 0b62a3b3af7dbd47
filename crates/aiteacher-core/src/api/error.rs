use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication rejected ({status}): {detail}")]
    AuthRejected { status: u16, detail: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("{0}")]
    Validation(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Fallback when the server's error body has no recognizable `detail`
const GENERIC_FAILURE_MESSAGE: &str = "Request failed";

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Classify a non-success response. The server's `detail` field wins over
    /// the raw body when it can be flattened into a message.
    pub fn from_status(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<Value>(body).unwrap_or(Value::Null);
        let message = detail_message(&parsed).unwrap_or_else(|| Self::truncate_body(body));
        match status {
            401 | 403 => ApiError::AuthRejected {
                status,
                detail: message,
            },
            404 => ApiError::NotFound(message),
            400 | 422 => ApiError::Validation(detail_or_generic(&parsed)),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(message),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, ApiError::AuthRejected { .. })
    }
}

/// Flatten a FastAPI-style error body into one displayable line.
///
/// - `detail` as a list: each item's `msg` joined with ", "
/// - `detail` as an object: `"Validation error: " + msg`
/// - `detail` as a string: returned as-is
///
/// Returns `None` when the shape is not recognized.
pub fn detail_message(body: &Value) -> Option<String> {
    match body.get("detail")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .map(|item| match item.get("msg") {
                    Some(Value::String(msg)) => msg.clone(),
                    _ => "Validation error".to_string(),
                })
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Object(obj) => {
            let msg = match obj.get("msg") {
                Some(Value::String(msg)) => msg.clone(),
                _ => Value::Object(obj.clone()).to_string(),
            };
            Some(format!("Validation error: {}", msg))
        }
        _ => None,
    }
}

/// `detail_message`, falling back to a generic message
pub fn detail_or_generic(body: &Value) -> String {
    detail_message(body).unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string())
}
