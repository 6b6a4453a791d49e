//! Common test utilities for API integration tests
//!
//! Builds the real router over the in-memory store, a recording mailer and
//! an in-memory file store, and drives it through `tower::Service::call`.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use propdesk_api::{
    app::{build_router, AppState},
    config::Config,
};
use propdesk_shared::{
    auth::password::hash_password,
    email::MockEmailSender,
    files::MemoryFileStore,
    models::user::{NewUser, Role, TenantAssignment, User},
    store::{memory::MemoryStore, Store},
};
use serde_json::Value;
use tower::Service as _;

pub const PASSWORD: &str = "password123";

pub struct TestContext {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub mailer: MockEmailSender,
    pub files: MemoryFileStore,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// Session token from the `Set-Cookie` header
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|v| v.strip_prefix("propdesk_session="))
            .and_then(|v| v.split(';').next())
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    }
}

/// How a request authenticates
#[derive(Clone, Copy)]
pub enum Auth<'a> {
    None,
    Cookie(&'a str),
    Bearer(&'a str),
}

impl TestContext {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let mailer = MockEmailSender::new();
        let files = MemoryFileStore::new();

        let state = AppState::assemble(
            Config::for_tests(),
            store.clone(),
            Arc::new(mailer.clone()),
            Arc::new(files.clone()),
        )
        .expect("valid test config");

        Self {
            app: build_router(state),
            store,
            mailer,
            files,
        }
    }

    pub async fn send(&self, method: Method, uri: &str, auth: Auth<'_>, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        builder = match auth {
            Auth::None => builder,
            Auth::Cookie(token) => builder.header(header::COOKIE, format!("propdesk_session={}", token)),
            Auth::Bearer(token) => builder.header(header::AUTHORIZATION, format!("Bearer {}", token)),
        };

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.call(request).await
    }

    pub async fn call(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().call(request).await.unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, headers, body }
    }

    pub async fn get(&self, uri: &str, auth: Auth<'_>) -> TestResponse {
        self.send(Method::GET, uri, auth, None).await
    }

    pub async fn post(&self, uri: &str, auth: Auth<'_>, body: Value) -> TestResponse {
        self.send(Method::POST, uri, auth, Some(body)).await
    }

    /// Verified account straight in the store
    pub async fn seed_user(&self, name: &str, role: Role, assignment: Option<TenantAssignment>) -> User {
        self.store
            .create_user(NewUser {
                username: name.to_string(),
                email: format!("{}@example.com", name),
                password_hash: hash_password(PASSWORD).expect("hash"),
                role,
                is_verified: true,
                assignment,
                ..NewUser::default()
            })
            .await
            .expect("create user")
    }

    /// Password login; returns the session cookie value
    pub async fn login(&self, login: &str) -> String {
        let response = self
            .post(
                "/v1/auth/login",
                Auth::None,
                serde_json::json!({"login": login, "password": PASSWORD}),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {}", response.body);
        response.session_cookie().expect("session cookie")
    }

    /// Seeds a verified user and logs them in
    pub async fn session_for(&self, name: &str, role: Role, assignment: Option<TenantAssignment>) -> (User, String) {
        let user = self.seed_user(name, role, assignment).await;
        let cookie = self.login(name).await;
        (user, cookie)
    }

    /// Code from the latest OTP email to `to`
    pub fn otp(&self, to: &str) -> String {
        let message = self.mailer.last_to(to).expect("otp email");
        token_after(&message.html_body, "<strong>").expect("code in email")
    }

    pub fn activation_token(&self, to: &str) -> String {
        let message = self.mailer.last_to(to).expect("activation email");
        token_after(&message.html_body, "/v1/activate/").expect("token in link")
    }

    pub fn vendor_token(&self, to: &str) -> String {
        let message = self.mailer.last_to(to).expect("assignment email");
        token_after(&message.html_body, "token=").expect("token in link")
    }
}

fn token_after(body: &str, marker: &str) -> Option<String> {
    let start = body.find(marker)? + marker.len();
    let token: String = body[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    (!token.is_empty()).then_some(token)
}

pub fn id_of(body: &Value) -> String {
    body["id"].as_str().expect("id in body").to_string()
}
