use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "aiteacher";

/// Remembered login passwords in the OS keychain.
///
/// Entries are scoped to one API server, so a parent with accounts on a
/// staging and a production backend keeps both passwords apart.
pub struct CredentialStore {
    server: String,
}

impl CredentialStore {
    pub fn for_server(api_base_url: &str) -> Self {
        Self {
            server: api_base_url.trim().trim_end_matches('/').to_lowercase(),
        }
    }

    /// Keychain account name for an email on this server
    fn account(&self, email: &str) -> String {
        format!("{}|{}", email.trim().to_lowercase(), self.server)
    }

    fn entry(&self, email: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &self.account(email)).context("Failed to create keyring entry")
    }

    pub fn remember(&self, email: &str, password: &str) -> Result<()> {
        self.entry(email)?
            .set_password(password)
            .context("Failed to store password in keychain")
    }

    pub fn recall(&self, email: &str) -> Option<String> {
        self.entry(email).ok()?.get_password().ok()
    }

    /// Drop the remembered password. Forgetting an unknown entry is not an error.
    pub fn forget(&self, email: &str) -> Result<()> {
        match self.entry(email)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credential from keychain"),
        }
    }
}
