#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use catering_service::{
    api::{create_router, AppState},
    auth::AuthConfig,
    db::{self, DbPool},
};
use chrono::Duration;
use serde_json::Value;
use shared::{Actor, Role};
use tower::ServiceExt;

pub const SECRET: &str = "integration-test-secret";

/// Router over a pool that never connects. Good for anything rejected before
/// the handler touches the database.
pub fn offline_app() -> Router {
    let pool = db::lazy_pool("postgres://nobody@127.0.0.1:1/none");
    create_router(AppState::new(pool, AuthConfig::new(SECRET)))
}

/// Migrated database from `DATABASE_URL`, or `None` when it is not set.
pub async fn database() -> Option<(Router, DbPool, String)> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("skip (no DATABASE_URL)");
            return None;
        }
    };
    db::run_migrations(&url).expect("migrations");
    let pool = db::build_pool(&url, 4).await.expect("pool");
    let app = create_router(AppState::new(pool.clone(), AuthConfig::new(SECRET)));
    Some((app, pool, url))
}

pub fn actor(role: Role) -> Actor {
    Actor {
        email: format!("{:?}@example.com", role).to_lowercase(),
        role,
        branches: vec!["downtown".to_string()],
        station_assignment: None,
    }
}

pub fn token_for(actor: &Actor) -> String {
    AuthConfig::new(SECRET)
        .issue("test-user", actor, Duration::hours(1))
        .expect("token")
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
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

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}
