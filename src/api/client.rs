//! HTTP client for the DojoFinder directory API.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! requests against the school and student endpoints. The stored bearer
//! token is attached to every outgoing request; a 401 response triggers a
//! single refresh-and-retry through the injected
//! [`TokenRefresher`](crate::auth::TokenRefresher) before the failure is
//! surfaced.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::auth::{SessionStore, TokenRefresher};
use crate::models::{NewSchool, School, SchoolUpdate, Student, StudentProgress};

use super::ApiError;

/// HTTP request timeout in seconds, applied uniformly to directory calls.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// API client for the school directory.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: Arc<SessionStore>,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl ApiClient {
    /// Create a client without a refresh hook; a 401 is surfaced directly.
    pub fn new(base_url: impl Into<String>, store: Arc<SessionStore>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            store,
            refresher: None,
        })
    }

    /// Attach the refresh hook used for one-shot 401 recovery.
    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Dispatch a request with bearer attachment and one-shot 401 recovery.
    ///
    /// The current token is read from the session store at dispatch time; an
    /// absent token sends the request unauthenticated and lets the server
    /// decide. The first 401 triggers a refresh and exactly one re-dispatch
    /// with the fresh token; the retried result propagates verbatim, so a
    /// second 401 can never trigger another refresh for this request.
    async fn dispatch<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let url = self.url(path);
        let mut fresh_token: Option<String> = None;
        let mut retried = false;

        loop {
            let token = fresh_token.clone().or_else(|| self.store.get_token());

            let mut request = self.client.request(method.clone(), &url);
            if let Some(ref token) = token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !retried {
                retried = true;
                if let Some(ref refresher) = self.refresher {
                    debug!(%url, "Request rejected as unauthenticated, attempting token refresh");
                    if let Some(token) = refresher.refresh_token().await {
                        fresh_token = Some(token);
                        continue;
                    }
                }
                // No refresh hook, or the refresh already ended the session:
                // surface the original 401.
                return Err(ApiError::Unauthorized);
            }

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(ApiError::from_status(status, &text));
            }

            return Ok(response);
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.dispatch(Method::GET, path, None::<&Value>).await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response body: {}", e)))
    }

    // ===== Schools =====

    /// Fetch the full school directory
    pub async fn fetch_schools(&self) -> Result<Vec<School>, ApiError> {
        self.get_json("/schools").await
    }

    /// Fetch a single school by id
    pub async fn fetch_school(&self, id: &str) -> Result<School, ApiError> {
        self.get_json(&format!("/schools/{}", id)).await
    }

    /// Create a new school listing
    pub async fn create_school(&self, school: &NewSchool) -> Result<School, ApiError> {
        let response = self.dispatch(Method::POST, "/schools", Some(school)).await?;
        Self::decode(response).await
    }

    /// Update an existing school listing
    pub async fn update_school(
        &self,
        id: &str,
        update: &SchoolUpdate,
    ) -> Result<School, ApiError> {
        let response = self
            .dispatch(Method::PUT, &format!("/schools/{}", id), Some(update))
            .await?;
        Self::decode(response).await
    }

    /// Delete a school listing
    pub async fn delete_school(&self, id: &str) -> Result<(), ApiError> {
        self.dispatch(Method::DELETE, &format!("/schools/{}", id), None::<&Value>)
            .await?;
        Ok(())
    }

    /// Attach an instructor to a school
    pub async fn add_instructor(
        &self,
        school_id: &str,
        instructor_id: &str,
    ) -> Result<School, ApiError> {
        let path = format!("/schools/{}/instructors/{}", school_id, instructor_id);
        let response = self.dispatch(Method::PUT, &path, None::<&Value>).await?;
        Self::decode(response).await
    }

    /// Enroll a student at a school
    pub async fn add_student(
        &self,
        school_id: &str,
        student_id: &str,
    ) -> Result<School, ApiError> {
        let path = format!("/schools/{}/students/{}", school_id, student_id);
        let response = self.dispatch(Method::PUT, &path, None::<&Value>).await?;
        Self::decode(response).await
    }

    /// Fetch schools near a coordinate. `max_distance_m` is in meters,
    /// matching the server's `maxDistance` query parameter.
    pub async fn fetch_nearby_schools(
        &self,
        latitude: f64,
        longitude: f64,
        max_distance_m: u32,
    ) -> Result<Vec<School>, ApiError> {
        let path = format!(
            "/schools/nearby?latitude={}&longitude={}&maxDistance={}",
            latitude, longitude, max_distance_m
        );
        self.get_json(&path).await
    }

    // ===== Students =====

    /// Fetch a student profile
    pub async fn fetch_student(&self, student_id: &str) -> Result<Student, ApiError> {
        self.get_json(&format!("/api/students/{}", student_id)).await
    }

    /// Fetch a student's advancement progress
    pub async fn fetch_student_progress(
        &self,
        student_id: &str,
    ) -> Result<StudentProgress, ApiError> {
        self.get_json(&format!("/api/progress/student/{}", student_id))
            .await
    }

    /// Fetch the aggregate dashboard for a student
    pub async fn fetch_student_dashboard(&self, student_id: &str) -> Result<Value, ApiError> {
        self.get_json(&format!("/api/progress/dashboard/{}", student_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::auth::SessionManager;
    use crate::testutil::{http_response, temp_store, test_user, TestServer};

    /// Scripted refresher: hands out the configured token (persisting it
    /// like the real session manager does) and counts invocations.
    struct ScriptedRefresher {
        store: Arc<SessionStore>,
        next_token: Option<String>,
        calls: AtomicUsize,
    }

    impl ScriptedRefresher {
        fn new(store: Arc<SessionStore>, next_token: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                store,
                next_token: next_token.map(String::from),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for ScriptedRefresher {
        async fn refresh_token(&self) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.next_token {
                Some(ref token) => {
                    self.store.save(token, &test_user("1")).unwrap();
                    Some(token.clone())
                }
                None => {
                    self.store.clear();
                    None
                }
            }
        }
    }

    fn client_for(server: &TestServer, store: Arc<SessionStore>) -> ApiClient {
        ApiClient::new(server.base_url.clone(), store).expect("Failed to build client")
    }

    fn bearer_of(request: &str) -> Option<String> {
        request
            .to_ascii_lowercase()
            .lines()
            .find_map(|line| line.strip_prefix("authorization: bearer ").map(String::from))
    }

    #[tokio::test]
    async fn test_attaches_stored_bearer_token() {
        let (store, _dir) = temp_store();
        store.save("T", &test_user("1")).unwrap();
        let server = TestServer::spawn(vec![http_response(200, "[]")]).await;
        let client = client_for(&server, store);

        let schools = client.fetch_schools().await.expect("request failed");
        assert!(schools.is_empty());

        let requests = server.requests().await;
        assert_eq!(bearer_of(&requests[0]).as_deref(), Some("t"));
    }

    #[tokio::test]
    async fn test_dispatches_without_token_when_absent() {
        let (store, _dir) = temp_store();
        let server = TestServer::spawn(vec![http_response(200, "[]")]).await;
        let client = client_for(&server, store);

        client.fetch_schools().await.expect("request failed");
        let requests = server.requests().await;
        assert_eq!(bearer_of(&requests[0]), None);
    }

    #[tokio::test]
    async fn test_retries_once_with_refreshed_token() {
        let (store, _dir) = temp_store();
        store.save("T1", &test_user("1")).unwrap();
        let server = TestServer::spawn(vec![
            http_response(401, ""),
            http_response(200, "[]"),
        ])
        .await;
        let refresher = ScriptedRefresher::new(store.clone(), Some("T2"));
        let client = client_for(&server, store.clone()).with_refresher(refresher.clone());

        let schools = client.fetch_schools().await.expect("retried request failed");
        assert!(schools.is_empty());
        assert_eq!(refresher.calls(), 1);
        assert_eq!(store.get_token().as_deref(), Some("T2"));

        let requests = server.requests().await;
        assert_eq!(requests.len(), 2);
        assert_eq!(bearer_of(&requests[0]).as_deref(), Some("t1"));
        assert_eq!(bearer_of(&requests[1]).as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn test_at_most_one_retry_per_request() {
        let (store, _dir) = temp_store();
        store.save("T1", &test_user("1")).unwrap();
        let server = TestServer::spawn(vec![
            http_response(401, ""),
            http_response(401, ""),
        ])
        .await;
        let refresher = ScriptedRefresher::new(store.clone(), Some("T2"));
        let client = client_for(&server, store).with_refresher(refresher.clone());

        let err = client.fetch_schools().await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        // The second 401 does not trigger another refresh.
        assert_eq!(refresher.calls(), 1);
        assert_eq!(server.requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_surfaces_original_401() {
        let (store, _dir) = temp_store();
        store.save("T1", &test_user("1")).unwrap();
        let server = TestServer::spawn(vec![http_response(401, "")]).await;
        let refresher = ScriptedRefresher::new(store.clone(), None);
        let client = client_for(&server, store.clone()).with_refresher(refresher.clone());

        let err = client.fetch_schools().await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert_eq!(refresher.calls(), 1);
        assert_eq!(server.requests().await.len(), 1);
        assert_eq!(store.get_token(), None);
    }

    #[tokio::test]
    async fn test_401_without_refresher_is_surfaced() {
        let (store, _dir) = temp_store();
        let server = TestServer::spawn(vec![http_response(401, "")]).await;
        let client = client_for(&server, store);

        let err = client.fetch_schools().await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert_eq!(server.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_non_401_errors_pass_through() {
        let (store, _dir) = temp_store();
        store.save("T", &test_user("1")).unwrap();
        let server = TestServer::spawn(vec![http_response(404, "no such school")]).await;
        let refresher = ScriptedRefresher::new(store.clone(), Some("T2"));
        let client = client_for(&server, store).with_refresher(refresher.clone());

        let err = client.fetch_school("missing").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn test_create_school_posts_payload() {
        let (store, _dir) = temp_store();
        store.save("T", &test_user("1")).unwrap();
        let created = r#"{"_id": "65f0a1", "name": "Golden Tiger Dojang"}"#;
        let server = TestServer::spawn(vec![http_response(201, created)]).await;
        let client = client_for(&server, store);

        let school = client
            .create_school(&crate::models::NewSchool {
                name: "Golden Tiger Dojang".to_string(),
                address: "12 Rue des Arts, Paris".to_string(),
                description: String::new(),
                images: Vec::new(),
                contact_number: None,
                schedule: None,
                martial_arts: None,
                location: None,
            })
            .await
            .expect("create failed");
        assert_eq!(school.id, "65f0a1");

        let requests = server.requests().await;
        assert!(requests[0].starts_with("POST /schools"));
        assert!(requests[0].contains(r#""name":"Golden Tiger Dojang""#));
        // Unset optional fields stay out of the payload.
        assert!(!requests[0].contains("contactNumber"));
    }

    #[tokio::test]
    async fn test_update_and_membership_endpoints() {
        let (store, _dir) = temp_store();
        store.save("T", &test_user("1")).unwrap();
        let school = r#"{"_id": "65f0a1", "name": "Golden Tiger Dojang"}"#;
        let server = TestServer::spawn(vec![
            http_response(200, school),
            http_response(200, school),
            http_response(200, ""),
        ])
        .await;
        let client = client_for(&server, store);

        let update = crate::models::SchoolUpdate {
            description: Some("Now with judo".to_string()),
            ..Default::default()
        };
        client
            .update_school("65f0a1", &update)
            .await
            .expect("update failed");
        client
            .add_instructor("65f0a1", "i9")
            .await
            .expect("add instructor failed");
        client.delete_school("65f0a1").await.expect("delete failed");

        let requests = server.requests().await;
        assert!(requests[0].starts_with("PUT /schools/65f0a1 "));
        assert!(requests[0].contains(r#"{"description":"Now with judo"}"#));
        assert!(requests[1].starts_with("PUT /schools/65f0a1/instructors/i9 "));
        assert!(requests[2].starts_with("DELETE /schools/65f0a1 "));
    }

    #[tokio::test]
    async fn test_student_endpoints_use_api_prefix() {
        let (store, _dir) = temp_store();
        let server = TestServer::spawn(vec![
            http_response(200, r#"{"_id": "s1", "firstName": "Kim"}"#),
            http_response(200, r#"{"currentBelt": "Blue"}"#),
            http_response(200, r#"{"attendance": 12}"#),
        ])
        .await;
        let client = client_for(&server, store);

        let student = client.fetch_student("s1").await.expect("profile failed");
        assert_eq!(student.full_name(), "Kim");
        let progress = client
            .fetch_student_progress("s1")
            .await
            .expect("progress failed");
        assert_eq!(progress.current_belt.as_deref(), Some("Blue"));
        let dashboard = client
            .fetch_student_dashboard("s1")
            .await
            .expect("dashboard failed");
        assert_eq!(dashboard["attendance"], 12);

        let requests = server.requests().await;
        assert!(requests[0].starts_with("GET /api/students/s1 "));
        assert!(requests[1].starts_with("GET /api/progress/student/s1 "));
        assert!(requests[2].starts_with("GET /api/progress/dashboard/s1 "));
    }

    #[tokio::test]
    async fn test_nearby_query_parameters() {
        let (store, _dir) = temp_store();
        let server = TestServer::spawn(vec![http_response(200, "[]")]).await;
        let client = client_for(&server, store);

        client
            .fetch_nearby_schools(48.8566, 2.3522, 10000)
            .await
            .expect("request failed");
        let requests = server.requests().await;
        assert!(requests[0]
            .starts_with("GET /schools/nearby?latitude=48.8566&longitude=2.3522&maxDistance=10000"));
    }

    // End-to-end recovery through the real session manager.

    #[tokio::test]
    async fn test_recovery_with_real_session_manager() {
        let (store, _dir) = temp_store();
        store.save("T1", &test_user("1")).unwrap();
        let server = TestServer::spawn(vec![
            http_response(401, ""),
            http_response(200, r#"{"access_token":"T2"}"#),
            http_response(200, "[]"),
        ])
        .await;
        let manager = Arc::new(
            SessionManager::new(server.base_url.clone(), store.clone())
                .expect("Failed to build session manager"),
        );
        let client = client_for(&server, store.clone()).with_refresher(manager);

        let schools = client.fetch_schools().await.expect("recovered request failed");
        assert!(schools.is_empty());
        assert_eq!(store.get_token().as_deref(), Some("T2"));

        let requests = server.requests().await;
        assert_eq!(requests.len(), 3);
        assert!(requests[1].starts_with("POST /auth/refresh-token"));
        assert_eq!(bearer_of(&requests[2]).as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn test_rejected_refresh_logs_out_through_real_session_manager() {
        let (store, _dir) = temp_store();
        store.save("T1", &test_user("1")).unwrap();
        let server = TestServer::spawn(vec![
            http_response(401, ""),
            http_response(401, ""),
            // Best-effort logout issued by the failed refresh.
            http_response(200, ""),
        ])
        .await;
        let manager = Arc::new(
            SessionManager::new(server.base_url.clone(), store.clone())
                .expect("Failed to build session manager"),
        );
        let client = client_for(&server, store.clone()).with_refresher(manager.clone());

        let err = client.fetch_schools().await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert_eq!(store.get_token(), None);
        assert_eq!(store.get_user(), None);
        assert_eq!(
            manager.current_state().await,
            crate::auth::SessionState::Unauthenticated
        );
        assert_eq!(server.requests().await.len(), 3);
    }
}
