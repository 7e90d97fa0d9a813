//! Common test utilities for API tests
//!
//! Every test builds its own router over empty in-memory repositories and
//! the mock payment provider, so tests are independent and need no
//! database or network.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::Duration;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use tourbook_api::{
    app::{build_router, AppState},
    config::Config,
};
use tourbook_shared::{
    auth::{jwt, password},
    models::{
        tour::{CreateTour, Difficulty, Tour},
        user::{CreateUser, Role, User},
    },
    payments::mock::MockPaymentProvider,
    repository::Repositories,
};
use tower::ServiceExt;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const TEST_PASSWORD: &str = "Test1234!";
pub const PUBLIC_URL: &str = "http://tours.test";

/// Test context containing all necessary resources
pub struct TestContext {
    pub app: Router,
    pub repos: Repositories,
    pub payments: Arc<MockPaymentProvider>,
    pub config: Config,
}

/// Status, headers and JSON body (`Null` when empty)
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Argon2 is slow on purpose; hash the shared test password once
fn test_password_hash() -> String {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| password::hash_password(TEST_PASSWORD).unwrap())
        .clone()
}

pub fn test_config() -> Config {
    Config::from_vars(|key| {
        let value = match key {
            "DATABASE_URL" => "postgres://unused/tourbook_test",
            "JWT_SECRET" => "test-secret-key-at-least-32-bytes-long",
            "STRIPE_SECRET_KEY" => "sk_test_unused",
            "STRIPE_WEBHOOK_SECRET" => WEBHOOK_SECRET,
            "PUBLIC_URL" => PUBLIC_URL,
            _ => return None,
        };
        Some(value.to_string())
    })
    .unwrap()
}

impl TestContext {
    pub fn new() -> Self {
        let config = test_config();
        let repos = Repositories::in_memory();
        let payments = Arc::new(MockPaymentProvider::new(WEBHOOK_SECRET));

        let state = AppState::new(repos.clone(), payments.clone(), config.clone());
        let app = build_router(state);

        Self {
            app,
            repos,
            payments,
            config,
        }
    }

    /// Sends a request through the router
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// JSON request with an optional bearer token
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::PATCH, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Delivers a webhook body with an optional signature header
    pub async fn post_webhook(&self, body: Vec<u8>, signature: Option<String>) -> TestResponse {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/webhook-checkout")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header("stripe-signature", signature);
        }

        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    /// Session token for `user`
    pub fn token_for(&self, user: &User) -> String {
        let claims = jwt::Claims::new(user.id, Duration::days(1));
        jwt::create_token(&claims, &self.config.jwt.secret).unwrap()
    }

    /// Inserts a user with [`TEST_PASSWORD`] and returns it with a token
    pub async fn create_user(&self, name: &str, email: &str, role: Role) -> (User, String) {
        let user = self
            .repos
            .users
            .insert(CreateUser {
                name: name.to_string(),
                email: email.to_string(),
                photo: None,
                role,
                password_hash: test_password_hash(),
            })
            .await
            .unwrap();
        let token = self.token_for(&user);
        (user, token)
    }

    pub async fn create_tour(&self, name: &str, price: f64) -> Tour {
        self.repos.tours.insert(tour_input(name, price)).await.unwrap()
    }
}

pub fn tour_input(name: &str, price: f64) -> CreateTour {
    CreateTour {
        name: name.to_string(),
        duration: 7,
        max_group_size: 15,
        difficulty: Difficulty::Medium,
        ratings_average: None,
        price,
        price_discount: None,
        summary: "Exploring the jaw-dropping US east coast by foot and by boat".to_string(),
        description: None,
        image_cover: "tour-2-cover.jpg".to_string(),
        images: vec![],
        start_dates: vec![],
        guides: vec![],
        secret_tour: None,
    }
}

/// JSON body for creating a tour through the API
pub fn tour_body(name: &str, price: f64) -> Value {
    json!({
        "name": name,
        "duration": 5,
        "max_group_size": 25,
        "difficulty": "easy",
        "price": price,
        "summary": "Breathtaking hike through the Canadian Banff National Park",
        "image_cover": "tour-1-cover.jpg",
    })
}
