use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::User;

/// Session file name inside the data directory
const SESSION_FILE: &str = "session.json";

/// On-disk record pairing the bearer token with the cached user.
/// A record without either field never parses, so the pair is all-or-nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRecord {
    token: String,
    user: User,
    saved_at: DateTime<Utc>,
}

/// Durable storage for at most one (token, user) pair.
///
/// Reads never fail observably: a missing, unreadable, or corrupt session
/// file reads as "no session". Writes replace the whole record atomically
/// via a temp-file rename, so a reader sees either the old pair or the new
/// one, never a token without its user.
pub struct SessionStore {
    data_dir: PathBuf,
}

impl SessionStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Current bearer token, if a session is stored.
    pub fn get_token(&self) -> Option<String> {
        self.read_record().map(|r| r.token)
    }

    /// Cached user record for the stored session.
    pub fn get_user(&self) -> Option<User> {
        self.read_record().map(|r| r.user)
    }

    /// Persist a (token, user) pair, replacing any previous session.
    pub fn save(&self, token: &str, user: &User) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir).context("Failed to create data directory")?;

        let record = SessionRecord {
            token: token.to_string(),
            user: user.clone(),
            saved_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&record)?;

        // Write-then-rename keeps the stored pair consistent under crashes.
        let tmp = self.data_dir.join(format!("{}.tmp", SESSION_FILE));
        std::fs::write(&tmp, contents).context("Failed to write session file")?;
        std::fs::rename(&tmp, self.session_path()).context("Failed to replace session file")?;
        Ok(())
    }

    /// Remove the stored session. Calling this when nothing is stored is
    /// not an error.
    pub fn clear(&self) {
        let path = self.session_path();
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(error = %e, "Failed to remove session file");
            }
        }
    }

    fn read_record(&self) -> Option<SessionRecord> {
        let path = self.session_path();
        if !path.exists() {
            return None;
        }
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!(error = %e, "Failed to read session file");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(error = %e, "Stored session is not parseable, ignoring it");
                None
            }
        }
    }

    fn session_path(&self) -> PathBuf {
        self.data_dir.join(SESSION_FILE)
    }
}
