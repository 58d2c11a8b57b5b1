//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with a mock task dispatcher and, optionally, a mock session introspector,
//! so the gates and the pipeline can be exercised without external services.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use reelforge_core::testing::{MockDispatcher, MockSessionIntrospector};
use reelforge_core::{load_config_from_str, SessionIntrospector};
use reelforge_server::state::AppState;

/// Passcode accepted by the fixture.
pub const PASSCODE: &str = "open-sesame";

/// Unlock key accepted by the fixture.
pub const UNLOCK_KEY: &str = "master-unlock-key";

/// Client IP sent with every request unless overridden.
pub const CLIENT_IP: &str = "10.0.0.1";

/// User acting on requests unless overridden.
pub const USER: &str = "user-1";

/// Test fixture for E2E testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_brand_creation() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post("/api/v1/brands", json!({ "name": "Acme" })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Shared state behind the router
    pub state: Arc<AppState>,
    /// Mock dispatcher - control agent task outcomes
    pub dispatcher: Arc<MockDispatcher>,
    /// Temporary directory for the test database and dashboard files
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Configuration for test fixture.
#[derive(Clone)]
pub struct TestConfig {
    /// Body of the `[auth]` table
    pub auth: String,
    /// Extra TOML appended to the generated config
    pub extra_toml: String,
    /// API budget per client per minute
    pub api_limit: u32,
    /// Passcode attempts per client per window
    pub passcode_limit: u32,
    /// Passcode secret; `None` leaves the gate unconfigured
    pub passcode_secret: Option<String>,
    /// Retries allowed per failed task
    pub max_task_retries: u32,
    /// Replaces the configured session introspector when set
    pub session: Option<Arc<MockSessionIntrospector>>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            auth: r#"method = "none""#.to_string(),
            extra_toml: String::new(),
            api_limit: 1000,
            passcode_limit: 5,
            passcode_secret: Some(PASSCODE.to_string()),
            max_task_retries: 3,
            session: None,
        }
    }
}

impl TestConfig {
    /// Token auth with `token-1` for user-1 and `token-2` for user-2.
    pub fn with_token_auth() -> Self {
        Self {
            auth: r#"method = "token"
users = [
    { user_id = "user-1", email = "one@example.com", token = "token-1" },
    { user_id = "user-2", token = "token-2" },
]"#
            .to_string(),
            ..Self::default()
        }
    }

    pub fn with_session(session: Arc<MockSessionIntrospector>) -> Self {
        Self {
            session: Some(session),
            ..Self::default()
        }
    }
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub fn new() -> Self {
        Self::with_config(TestConfig::default())
    }

    /// Create a test fixture with custom configuration.
    pub fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let dashboard_dir = temp_dir.path().join("dashboard");
        std::fs::create_dir_all(&dashboard_dir).expect("Failed to create dashboard dir");
        std::fs::write(
            dashboard_dir.join("index.html"),
            "<!doctype html><title>Reelforge</title>",
        )
        .expect("Failed to write index.html");

        let toml = format!(
            r#"
[auth]
{auth}

[server]
host = "127.0.0.1"
port = 8080
dashboard_dir = "{dashboard}"

[database]
path = "{db}"

[passcode]
{passcode}

[rate_limit.api]
max_requests = {api_limit}
window_secs = 60

[rate_limit.passcode]
max_requests = {passcode_limit}
window_secs = 900

[orchestrator]
timeout_sweep_secs = 0
max_task_retries = {max_task_retries}

[unlock]
master_key = "{UNLOCK_KEY}"

{extra}
"#,
            auth = test_config.auth,
            dashboard = dashboard_dir.display(),
            db = db_path.display(),
            passcode = test_config
                .passcode_secret
                .map(|secret| format!("secret = \"{secret}\""))
                .unwrap_or_default(),
            api_limit = test_config.api_limit,
            passcode_limit = test_config.passcode_limit,
            max_task_retries = test_config.max_task_retries,
            extra = test_config.extra_toml,
        );
        let config = load_config_from_str(&toml).expect("Failed to parse test config");

        let dispatcher = Arc::new(MockDispatcher::new());
        let mut state = AppState::from_config(config, Arc::clone(&dispatcher) as _)
            .expect("Failed to create app state");
        if let Some(session) = test_config.session {
            state = state.with_session_introspector(session as Arc<dyn SessionIntrospector>);
        }
        let state = Arc::new(state);

        let router = reelforge_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            state,
            dispatcher,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, &[]).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), &[]).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body), &[]).await
    }

    /// Send a PATCH request with JSON body.
    pub async fn patch(&self, path: &str, body: Value) -> TestResponse {
        self.request("PATCH", path, Some(body), &[]).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None, &[]).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .header("X-Forwarded-For", CLIENT_IP)
            .header("X-Dev-User", USER)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Send a request with extra headers.
    ///
    /// `X-Forwarded-For` and `X-Dev-User` default to [`CLIENT_IP`] and
    /// [`USER`] unless given in `headers`.
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);

        let has = |name: &str| headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name));
        if !has("x-forwarded-for") {
            builder = builder.header("X-Forwarded-For", CLIENT_IP);
        }
        if !has("x-dev-user") {
            builder = builder.header("X-Dev-User", USER);
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json_body) = body {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(builder.body(body).unwrap()).await
    }

    /// Send a prepared request.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_bytes).into_owned()))
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Create a brand for [`USER`] and return its id.
    pub async fn create_brand(&self, name: &str) -> String {
        let response = self
            .post("/api/v1/brands", serde_json::json!({ "name": name }))
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body["id"].as_str().unwrap().to_string()
    }

    /// Poll a request until `done` holds for its detail view.
    pub async fn wait_for_request<F>(&self, id: &str, done: F) -> Value
    where
        F: Fn(&Value) -> bool,
    {
        let path = format!("/api/v1/requests/{id}");
        for _ in 0..100 {
            let response = self.get(&path).await;
            if response.status == StatusCode::OK && done(&response.body) {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("Request {id} did not reach the expected state");
    }

    /// Wait until no request is being driven by the orchestrator.
    pub async fn wait_until_idle(&self) {
        for _ in 0..100 {
            if self.state.orchestrator().status().await.processing == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Orchestrator did not settle");
    }

    /// Submit an image request for `brand_id` and return its id.
    pub async fn create_image_request(&self, brand_id: &str, title: &str) -> String {
        let response = self
            .post(
                "/api/v1/requests",
                serde_json::json!({
                    "brand_id": brand_id,
                    "title": title,
                    "type": "image",
                    "requirements": { "prompt": "A lighthouse at dawn" },
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body["id"].as_str().unwrap().to_string()
    }
}
