#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use ui_analyzer::adapters::MemoryDatabaseAdapter;
use ui_analyzer::plugins::{AuthPlugin, PaymentsPlugin, SubscriptionsPlugin, UsersPlugin};
use ui_analyzer::{
    AppBuilder, AppConfig, AppRequest, Argon2Config, DemoGateway, HttpMethod, UiAnalyzer,
};

pub const TEST_SECRET: &str = "test-secret-key-that-is-at-least-32-characters-long";
pub const WEBHOOK_SECRET: &str = "whsec_integration_secret";
pub const PASSWORD: &str = "password123";

pub type TestApp = UiAnalyzer<MemoryDatabaseAdapter>;

/// Config with cheap Argon2 parameters and a webhook secret.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::new(TEST_SECRET)
        .frontend_url("http://localhost:3000")
        .webhook_secret(WEBHOOK_SECRET);
    config.password.argon2_config = Argon2Config {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
    };
    config
}

/// Fully wired app on the memory adapter, with a handle to its demo gateway.
pub async fn create_test_app() -> (TestApp, Arc<DemoGateway>) {
    create_test_app_with_config(test_config()).await
}

pub async fn create_test_app_with_config(config: AppConfig) -> (TestApp, Arc<DemoGateway>) {
    let gateway = Arc::new(DemoGateway::new("http://localhost:3000/payment/demo"));
    let app = AppBuilder::new(config)
        .database(MemoryDatabaseAdapter::new())
        .shared_gateway(gateway.clone())
        .plugin(AuthPlugin::new())
        .plugin(SubscriptionsPlugin::new())
        .plugin(PaymentsPlugin::new())
        .plugin(UsersPlugin::new())
        .build()
        .await
        .expect("Failed to create test app");
    (app, gateway)
}

pub fn request(
    method: HttpMethod,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> AppRequest {
    let mut headers = HashMap::new();
    if let Some(token) = token {
        headers.insert("authorization".to_string(), format!("Bearer {}", token));
    }
    if body.is_some() {
        headers.insert("content-type".to_string(), "application/json".to_string());
    }
    AppRequest::from_parts(
        method,
        path.to_string(),
        headers,
        body.map(|b| b.to_string().into_bytes()),
        HashMap::new(),
    )
}

/// Send a request and return `(status, json body)`.
pub async fn send(app: &TestApp, req: AppRequest) -> (u16, Value) {
    let response = app.handle_request(req).await.expect("request failed");
    let body = if response.body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&response.body).expect("response is not JSON")
    };
    (response.status, body)
}

pub async fn get(app: &TestApp, path: &str, token: &str) -> (u16, Value) {
    send(app, request(HttpMethod::Get, path, Some(token), None)).await
}

pub async fn post(app: &TestApp, path: &str, token: Option<&str>, body: Value) -> (u16, Value) {
    send(app, request(HttpMethod::Post, path, token, Some(body))).await
}

/// Register a user and return `(user id, token)`.
pub async fn register(app: &TestApp, email: &str) -> (String, String) {
    let (status, body) = post(
        app,
        "/api/auth/register",
        None,
        json!({ "email": email, "password": PASSWORD, "name": "Test User" }),
    )
    .await;
    assert_eq!(status, 201, "registration failed: {body}");
    (
        body["user"]["id"].as_str().unwrap().to_string(),
        body["token"].as_str().unwrap().to_string(),
    )
}

/// Start a checkout for `plan` and return the create-payment response body.
pub async fn checkout(app: &TestApp, token: &str, plan: &str) -> Value {
    let (status, body) = post(
        app,
        "/api/payments/create-payment",
        Some(token),
        json!({
            "plan": plan,
            "currency": "TRY",
            "customerInfo": { "name": "Test User", "phone": "+905551234567" }
        }),
    )
    .await;
    assert_eq!(status, 200, "checkout failed: {body}");
    body
}
