#![cfg(feature = "axum")]

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt; // for oneshot
use tower_http::cors::CorsLayer;

use common::{PASSWORD, create_test_app};
use ui_analyzer::AxumIntegration;

async fn create_test_router() -> axum::Router {
    let (app, _) = create_test_app().await;
    Arc::new(app).axum_router().layer(CorsLayer::permissive())
}

async fn call(
    router: &axum::Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_health_endpoint() {
    let router = create_test_router().await;
    let (status, body) = call(&router, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_register_then_fetch_profile_over_http() {
    let router = create_test_router().await;

    let (status, body) = call(
        &router,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "email": "http@example.com", "password": PASSWORD, "name": "Http User" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = call(&router, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "http@example.com");

    let usage_path = "/api/subscriptions/usage";
    let (status, body) = call(&router, Method::GET, usage_path, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["monthlyLimit"], 3);
}

#[tokio::test]
async fn test_missing_token_is_401_json() {
    let router = create_test_router().await;
    let (status, body) = call(&router, Method::GET, "/api/users/analytics", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Access token required");
}

#[tokio::test]
async fn test_validation_error_lists_fields() {
    let router = create_test_router().await;
    let (status, body) = call(
        &router,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "email": "nope", "password": "1", "name": "Ok Name" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|d| d["field"].as_str())
        .collect();
    assert!(fields.contains(&"email"));
    assert!(fields.contains(&"password"));
}

#[tokio::test]
async fn test_path_parameter_is_percent_decoded() {
    let router = create_test_router().await;
    let (status, body) = call(
        &router,
        Method::GET,
        "/api/users/check-email/someone%40example.com",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "someone@example.com");
    assert_eq!(body["available"], true);
}

#[tokio::test]
async fn test_unknown_route_falls_back_to_json_404() {
    let router = create_test_router().await;
    let (status, body) = call(&router, Method::GET, "/api/does-not-exist", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Route not found");
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let router = create_test_router().await;
    let padding = "x".repeat(11 * 1024 * 1024);
    let (status, _) = call(
        &router,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "big@example.com", "password": padding })),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}
