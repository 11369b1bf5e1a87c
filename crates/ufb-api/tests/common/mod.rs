#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use serde_json::{Value, json};
use tower::ServiceExt;

use ufb_api::mailer::Mailer;
use ufb_api::{ApiConfig, AppState};
use ufb_db::Database;
use ufb_types::models::CodeType;

pub const SUPER_EMAIL: &str = "admin@example.com";
pub const PASSWORD: &str = "password1234";

/// Keeps every code "sent" so tests can read it back.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, CodeType, String)>>,
}

impl RecordingMailer {
    pub fn last_code(&self, to: &str, code_type: CodeType) -> String {
        self.sent
            .lock()
            .expect("mailer lock")
            .iter()
            .rev()
            .find(|(email, kind, _)| email == to && *kind == code_type)
            .map(|(_, _, code)| code.clone())
            .expect("no code sent")
    }
}

impl Mailer for RecordingMailer {
    fn send_code(&self, to: &str, code_type: CodeType, code: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .expect("mailer lock")
            .push((to.to_string(), code_type, code.to_string()));
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub mailer: Arc<RecordingMailer>,
}

pub fn config(upstream: &str) -> ApiConfig {
    ApiConfig {
        jwt_secret: "integration-test-secret-0123456789".into(),
        access_token_ttl: chrono::Duration::minutes(60),
        refresh_token_ttl: chrono::Duration::days(30),
        session_upstream_url: upstream.to_string(),
        secure_cookies: false,
    }
}

pub fn app_with_upstream(upstream: &str) -> TestApp {
    let db = Database::open_in_memory().expect("open db");
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState::new(db, config(upstream), mailer.clone()).expect("state");
    TestApp {
        router: ufb_api::router(state),
        mailer,
    }
}

pub fn app() -> TestApp {
    app_with_upstream("http://127.0.0.1:9")
}

pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub async fn body_json(resp: Response) -> Value {
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.expect("body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("json body")
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> Response {
        self.router.clone().oneshot(req).await.expect("oneshot")
    }

    pub async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let resp = self.send(request(method, uri, token, body)).await;
        let status = resp.status();
        (status, body_json(resp).await)
    }

    /// Set the service up and return the SUPER user's access token.
    pub async fn setup(&self) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/api/service/setup",
                None,
                Some(json!({
                    "name": "ufb",
                    "timezoneOffset": "+09:00",
                    "email": SUPER_EMAIL,
                    "password": PASSWORD,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["accessToken"].as_str().expect("access token").to_string()
    }

    /// Sign a GENERAL user up through the email code flow and return its
    /// access token.
    pub async fn sign_up(&self, email: &str) -> String {
        let (status, _) = self
            .call("POST", "/api/auth/email/code", None, Some(json!({ "email": email })))
            .await;
        assert_eq!(status, StatusCode::OK);

        let code = self.mailer.last_code(email, CodeType::EmailVerification);
        let (status, _) = self
            .call(
                "POST",
                "/api/auth/email/code/verify",
                None,
                Some(json!({ "email": email, "code": code })),
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = self
            .call(
                "POST",
                "/api/auth/signUp/email",
                None,
                Some(json!({ "email": email, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["accessToken"].as_str().expect("access token").to_string()
    }

    pub async fn user_id(&self, token: &str) -> String {
        let (status, body) = self.call("GET", "/api/users/me", Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
        body["id"].as_str().expect("id").to_string()
    }
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind upstream");
    let addr = listener.local_addr().expect("upstream addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("upstream server");
    });
    format!("http://{}", addr)
}
