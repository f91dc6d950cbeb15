use anyhow::{Context, Result};
use keyring::Entry;
use tracing::debug;

/// Keychain service name for saved logins
const SERVICE_NAME: &str = "dojofinder";

/// OS-keychain storage for the "remember me" login flow.
///
/// Only the login password lives here; session tokens are persisted by
/// [`SessionStore`](super::SessionStore).
pub struct CredentialStore;

impl CredentialStore {
    /// Save the password for an account email in the OS keychain.
    pub fn remember(email: &str, password: &str) -> Result<()> {
        let entry =
            Entry::new(SERVICE_NAME, email).context("Failed to create keychain entry")?;
        entry
            .set_password(password)
            .context("Failed to store password in keychain")?;
        Ok(())
    }

    /// Password previously saved for this email, if any. Keychain errors
    /// read as "nothing saved".
    pub fn saved_password(email: &str) -> Option<String> {
        let entry = Entry::new(SERVICE_NAME, email).ok()?;
        entry.get_password().ok()
    }

    /// Forget any saved password for this email. Missing entries are fine.
    pub fn forget(email: &str) {
        let Ok(entry) = Entry::new(SERVICE_NAME, email) else {
            return;
        };
        if let Err(e) = entry.delete_credential() {
            debug!(error = %e, "No saved credential removed from keychain");
        }
    }
}
