//! Helpers for driving the router in tests.

use crate::{build_router, AppState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use std::sync::Arc;
use tower::ServiceExt;
use tracker_core::config::AppConfig;
use tracker_core::Database;

/// Router over a fresh in-memory database.
pub fn test_router(auth_enabled: bool) -> (Router, AppState) {
    let mut config = AppConfig::default();
    config.auth.enabled = auth_enabled;
    config.auth.password_cost = tracker_core::users::MIN_PASSWORD_COST;
    let db = Arc::new(Database::in_memory().expect("in-memory database"));
    let state = AppState::new(config, db);
    (build_router(state.clone()), state)
}

/// JSON request; `Value::Null` means no body.
pub fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    if body.is_null() {
        builder.body(Body::empty()).unwrap()
    } else {
        builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}

/// Send a request and decode the JSON response (Null for an empty body).
pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, body)
}
