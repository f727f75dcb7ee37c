#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use informes::{
    app::build_app,
    auth::{password::hash_password, repo_types::NewUser, roles::Role},
    mail::{Email, Mailer},
    state::AppState,
};

/// Keeps every message; fails on demand.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Email>>,
    pub fail: AtomicBool,
}

impl RecordingMailer {
    pub fn last(&self) -> Option<Email> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("relay unavailable");
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::in_memory(mailer.clone());
        Self {
            router: build_app(state.clone()),
            state,
            mailer,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> Response {
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        Response {
            status,
            headers,
            body,
        }
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(json) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => req.body(Body::empty()),
        };
        self.send(req.unwrap()).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response {
        self.call(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Response {
        self.call(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> Response {
        self.call(Method::PUT, uri, token, Some(body)).await
    }

    /// Registers a plain user and returns the session token.
    pub async fn register(&self, email: &str, password: &str) -> String {
        let res = self
            .post(
                "/api/auth/register",
                None,
                serde_json::json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "{:?}", res.body);
        token_of(&res)
    }

    pub async fn login(&self, email: &str, password: &str) -> Response {
        self.post(
            "/api/auth/login",
            None,
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Inserts an account of any role directly and logs it in.
    pub async fn seed(&self, role: Role, email: &str) -> String {
        self.state
            .store
            .insert_user(NewUser {
                email: email.to_string(),
                password_hash: hash_password("123456").unwrap(),
                role,
            })
            .await
            .unwrap();
        let res = self.login(email, "123456").await;
        assert_eq!(res.status, StatusCode::OK, "{:?}", res.body);
        token_of(&res)
    }

    /// Creates the caller's business and returns its id.
    pub async fn create_business(&self, token: &str, tax_id: &str, name: &str) -> String {
        let res = self
            .post(
                "/api/business",
                Some(token),
                serde_json::json!({ "taxId": tax_id, "businessName": name }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{:?}", res.body);
        res.body["data"]["id"].as_str().unwrap().to_string()
    }

    pub async fn create_report(&self, token: &str, year: &str, month: &str) -> Response {
        self.post(
            "/api/reports",
            Some(token),
            serde_json::json!({
                "period": { "year": year, "month": month },
                "productsList": [{
                    "productName": "Yerba mate",
                    "eanCode": "7790387000109",
                    "price": 350.5,
                    "unit": "kg",
                    "quantityProduced": 1200,
                    "quantitySold": 950
                }]
            }),
        )
        .await
    }
}

pub fn token_of(res: &Response) -> String {
    res.body["token"].as_str().unwrap().to_string()
}

pub fn set_cookie(res: &Response) -> String {
    res.headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
