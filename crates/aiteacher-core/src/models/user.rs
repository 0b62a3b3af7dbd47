use serde::{Deserialize, Serialize};

/// Identity of the logged-in parent account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
}

impl User {
    /// Text before the `@` of an email-like identifier
    pub fn local_part(identifier: &str) -> &str {
        identifier.split('@').next().unwrap_or(identifier)
    }

    /// Greeting name, falling back to the email's local part
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            Self::local_part(&self.email)
        } else {
            &self.name
        }
    }
}

/// Registration payload
#[derive(Debug, Clone, Serialize)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl NewAccount {
    pub fn new(email: impl Into<String>, password: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            name: name.into(),
        }
    }
}
