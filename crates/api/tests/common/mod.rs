//! Common test utilities for integration tests.
//!
//! The router is wired to an in-memory store, so these tests need no
//! database. Jobs run on the real dispatcher with item delays disabled.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use domain::models::BatchJob;
use domain::services::InMemoryStore;
use expense_tracker_api::{
    app::{create_app, AppState},
    config::Config,
    middleware::{init_metrics, UserAuth},
};
use serde_json::Value;
use shared::jwt::JwtConfig;
use tower::ServiceExt;

pub use expense_tracker_api::routes::expense_batches::CSV_FILE_FIELD;

pub const MULTIPART_BOUNDARY: &str = "expense-tracker-test-boundary";

/// Test configuration with a fixed JWT secret and no per-item delay.
pub fn test_config() -> Config {
    Config::load_for_test(&[]).expect("Failed to build test config")
}

pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub state: AppState,
    pub router: Router,
    jwt: JwtConfig,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        init_metrics().expect("Failed to install metrics recorder");

        let store = Arc::new(InMemoryStore::new());
        let jwt = UserAuth::create_jwt_config(&config.jwt).expect("Invalid JWT config");
        let state = AppState::new(config, jwt.clone(), store.clone(), store.clone());
        let router = create_app(state.clone());

        Self {
            store,
            state,
            router,
            jwt,
        }
    }

    /// Bearer token for `user_id`.
    pub fn token_for(&self, user_id: i64) -> String {
        let (token, _jti) = self
            .jwt
            .generate_access_token(user_id)
            .expect("Failed to sign token");
        token
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Polls the store until the job reaches a terminal status.
    pub async fn wait_for_terminal(&self, job_id: i64) -> BatchJob {
        for _ in 0..300 {
            if let Some(job) = self.store.job(job_id).filter(|j| j.status.is_terminal()) {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not reach a terminal status", job_id);
    }
}

/// Helper to create a JSON request, optionally authenticated.
pub fn json_request(method: Method, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

/// Helper to create a GET request, optionally authenticated.
pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

/// Multipart upload with a single file part named `field`.
pub fn multipart_request(uri: &str, token: &str, field: &str, contents: &str) -> Request<Body> {
    let body = format!(
        "--{b}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"expenses.csv\"\r\n\
         Content-Type: text/csv\r\n\
         \r\n\
         {contents}\r\n\
         --{b}--\r\n",
        b = MULTIPART_BOUNDARY,
        field = field,
        contents = contents,
    );

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
        )
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(body))
        .unwrap()
}

/// Helper to parse JSON response body.
pub async fn parse_response_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

/// Asserts the status and returns the parsed body.
pub async fn expect_json(response: Response, status: StatusCode) -> Value {
    assert_eq!(response.status(), status);
    parse_response_body(response).await
}
