//! Session lifecycle: login, logout, token refresh, and the process-wide
//! authentication state.
//!
//! `SessionManager` is the single source of truth for "is the user logged
//! in". It owns the [`SessionStore`] and talks to the `/auth/*` endpoints
//! with its own plain HTTP client; the directory client's 401 recovery
//! reaches back into it through the [`TokenRefresher`] trait.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::auth::SessionStore;
use crate::models::User;

/// HTTP request timeout in seconds, applied uniformly to auth calls.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Process-wide authentication state. Exactly one value at a time;
/// transitions never interleave.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Loading,
    Authenticated(User),
    Unauthenticated,
}

/// Errors surfaced to callers of the session operations. Every variant
/// carries a human-readable message.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("{0}")]
    Unknown(String),
}

/// Refresh hook consumed by the API client's 401 recovery path.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Attempt to obtain a fresh token, persisting it on success. Returns
    /// `None` when the session could not be recovered (the session is ended
    /// before returning).
    async fn refresh_token(&self) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: Option<String>,
    user: Option<User>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

pub struct SessionManager {
    client: Client,
    base_url: String,
    store: Arc<SessionStore>,
    state: RwLock<SessionState>,
    last_error: RwLock<Option<String>>,
    /// Serializes the mutating operations (bootstrap/login/logout/refresh).
    ops: Mutex<()>,
}

impl SessionManager {
    pub fn new(base_url: impl Into<String>, store: Arc<SessionStore>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            store,
            state: RwLock::new(SessionState::Loading),
            last_error: RwLock::new(None),
            ops: Mutex::new(()),
        })
    }

    /// Current state snapshot.
    pub async fn current_state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(*self.state.read().await, SessionState::Authenticated(_))
    }

    pub async fn current_user(&self) -> Option<User> {
        match &*self.state.read().await {
            SessionState::Authenticated(user) => Some(user.clone()),
            _ => None,
        }
    }

    /// Most recent operation error, kept for display until cleared.
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    pub async fn clear_error(&self) {
        *self.last_error.write().await = None;
    }

    /// Restore the session from storage at startup. Always lands in a
    /// non-`Loading` state; a stored token without its user record is
    /// treated as corrupt and cleared.
    pub async fn bootstrap(&self) -> SessionState {
        let _guard = self.ops.lock().await;

        let next = match self.store.get_token() {
            Some(_) => match self.store.get_user() {
                Some(user) => {
                    debug!(user = %user.username, "Restored session from storage");
                    SessionState::Authenticated(user)
                }
                None => {
                    warn!("Stored token has no user record, clearing session");
                    self.store.clear();
                    SessionState::Unauthenticated
                }
            },
            None => SessionState::Unauthenticated,
        };

        *self.state.write().await = next.clone();
        next
    }

    /// Authenticate with email and password. On success the (token, user)
    /// pair is persisted and the state becomes `Authenticated`; on failure
    /// state and storage stay untouched and the error is also recorded in
    /// the last-error slot.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, SessionError> {
        let _guard = self.ops.lock().await;
        self.set_error(None).await;

        match self.do_login(email, password).await {
            Ok(user) => {
                *self.state.write().await = SessionState::Authenticated(user.clone());
                info!(email, "Login succeeded");
                Ok(user)
            }
            Err(e) => {
                self.set_error(Some(e.to_string())).await;
                Err(e)
            }
        }
    }

    async fn do_login(&self, email: &str, password: &str) -> Result<User, SessionError> {
        let url = format!("{}/auth/login", self.base_url);
        let body = serde_json::json!({ "email": email, "password": password });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::Network(format!("Login request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::classify_failure(status, &text, "Login failed"));
        }

        let parsed: LoginResponse = response.json().await.map_err(|e| {
            SessionError::MalformedResponse(format!("Unreadable login response: {}", e))
        })?;
        let (token, user) = match (parsed.access_token, parsed.user) {
            (Some(token), Some(user)) if !token.is_empty() => (token, user),
            _ => {
                return Err(SessionError::MalformedResponse(
                    "Login response is missing the access token or user".to_string(),
                ))
            }
        };

        // A storage failure degrades to an in-memory-only session.
        if let Err(e) = self.store.save(&token, &user) {
            warn!(error = %e, "Failed to persist session");
        }
        Ok(user)
    }

    /// Create an account. Does not authenticate: the server may require
    /// email verification before the first login.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Value, SessionError> {
        let url = format!("{}/auth/register", self.base_url);
        let body = serde_json::json!({
            "username": username,
            "email": email,
            "password": password,
        });
        self.post_for_value(&url, &body, "Registration failed").await
    }

    /// Request a password-reset email. Returns the server's raw response;
    /// session state is untouched.
    pub async fn forgot_password(&self, email: &str) -> Result<Value, SessionError> {
        let url = format!("{}/auth/forgot-password", self.base_url);
        let body = serde_json::json!({ "email": email });
        self.post_for_value(&url, &body, "Password reset request failed")
            .await
    }

    /// End the session. The server call is best-effort; local state and
    /// storage are always cleared. Safe to call when already logged out.
    pub async fn logout(&self) {
        let _guard = self.ops.lock().await;
        self.do_logout().await;
    }

    async fn do_logout(&self) {
        if let Some(token) = self.store.get_token() {
            let url = format!("{}/auth/logout", self.base_url);
            match self.client.post(&url).bearer_auth(&token).send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = %response.status(), "Server rejected logout, clearing local session anyway");
                }
                Ok(_) => debug!("Server acknowledged logout"),
                Err(e) => {
                    warn!(error = %e, "Server logout failed, clearing local session anyway");
                }
            }
        }
        self.store.clear();
        *self.state.write().await = SessionState::Unauthenticated;
    }

    /// Exchange the current token for a fresh one. Any failure ends the
    /// session so an invalid token never lingers in storage.
    pub async fn refresh(&self) -> Option<String> {
        let _guard = self.ops.lock().await;

        match self.do_refresh().await {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(error = %e, "Token refresh failed, ending session");
                self.do_logout().await;
                None
            }
        }
    }

    async fn do_refresh(&self) -> Result<String, SessionError> {
        let current = self
            .store
            .get_token()
            .ok_or_else(|| SessionError::Unknown("No token to refresh".to_string()))?;

        let url = format!("{}/auth/refresh-token", self.base_url);
        // The server accepts the access token in the refresh_token field;
        // there is no separate refresh credential.
        let body = serde_json::json!({ "refresh_token": current });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::Network(format!("Refresh request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::classify_failure(status, &text, "Token refresh rejected"));
        }

        let parsed: RefreshResponse = response.json().await.map_err(|e| {
            SessionError::MalformedResponse(format!("Unreadable refresh response: {}", e))
        })?;
        let token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                SessionError::MalformedResponse(
                    "Refresh response is missing the access token".to_string(),
                )
            })?;

        let user = self.store.get_user().ok_or_else(|| {
            SessionError::Unknown("No user record for the refreshed session".to_string())
        })?;
        if let Err(e) = self.store.save(&token, &user) {
            warn!(error = %e, "Failed to persist refreshed token");
        }
        Ok(token)
    }

    async fn post_for_value(
        &self,
        url: &str,
        body: &Value,
        context: &str,
    ) -> Result<Value, SessionError> {
        self.set_error(None).await;

        let result = self.do_post_for_value(url, body, context).await;
        if let Err(ref e) = result {
            self.set_error(Some(e.to_string())).await;
        }
        result
    }

    async fn do_post_for_value(
        &self,
        url: &str,
        body: &Value,
        context: &str,
    ) -> Result<Value, SessionError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| SessionError::Network(format!("{}: {}", context, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SessionError::Network(format!("{}: {}", context, e)))?;
        if !status.is_success() {
            return Err(Self::classify_failure(status, &text, context));
        }

        // Endpoints with nothing to report return an empty body.
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            SessionError::MalformedResponse(format!("{}: unreadable response: {}", context, e))
        })
    }

    /// Map a non-2xx auth response to the caller-facing taxonomy, preferring
    /// the server's own message when the body carries one.
    fn classify_failure(status: StatusCode, body: &str, context: &str) -> SessionError {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| format!("{} (status {})", context, status));

        match status.as_u16() {
            400 | 401 | 403 => SessionError::InvalidCredentials(message),
            _ => SessionError::Unknown(message),
        }
    }

    async fn set_error(&self, message: Option<String>) {
        *self.last_error.write().await = message;
    }
}

#[async_trait]
impl TokenRefresher for SessionManager {
    async fn refresh_token(&self) -> Option<String> {
        self.refresh().await
    }
}
