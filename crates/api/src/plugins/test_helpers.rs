use std::collections::HashMap;
use std::sync::Arc;

use ui_analyzer_core::adapters::{MemoryDatabaseAdapter, UserOps};
use ui_analyzer_core::password::hash_password;
use ui_analyzer_core::{
    AppConfig, AppContext, AppRequest, AppResponse, Argon2Config, CreateUser, DemoGateway,
    HttpMethod, User,
};

pub(crate) const TEST_SECRET: &str = "test-secret-key-at-least-32-chars-long";
pub(crate) const TEST_PASSWORD: &str = "password123";

pub(crate) type TestContext = AppContext<MemoryDatabaseAdapter>;

/// Config with cheap Argon2 parameters.
pub(crate) fn test_config() -> AppConfig {
    let mut config = AppConfig::new(TEST_SECRET);
    config.password.argon2_config = Argon2Config {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
    };
    config
}

pub(crate) fn create_test_context() -> (TestContext, Arc<DemoGateway>) {
    create_test_context_with_config(test_config())
}

pub(crate) fn create_test_context_with_config(
    config: AppConfig,
) -> (TestContext, Arc<DemoGateway>) {
    let gateway = Arc::new(DemoGateway::default());
    let ctx = AppContext::new(
        Arc::new(config),
        Arc::new(MemoryDatabaseAdapter::new()),
        gateway.clone(),
    );
    (ctx, gateway)
}

pub(crate) async fn create_user(ctx: &TestContext, email: &str, name: &str) -> User {
    let password_hash = hash_password(TEST_PASSWORD, &ctx.config.password.argon2_config).unwrap();
    ctx.database
        .create_user(CreateUser {
            id: None,
            email: email.to_string(),
            name: name.to_string(),
            password_hash,
        })
        .await
        .unwrap()
}

/// A user plus a valid bearer token for them.
pub(crate) async fn create_user_with_token(ctx: &TestContext, email: &str) -> (User, String) {
    let user = create_user(ctx, email, "Test User").await;
    let token = ctx.tokens.issue(&user.id, &user.email).unwrap();
    (user, token)
}

pub(crate) fn create_request(
    method: HttpMethod,
    path: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
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

pub(crate) fn json_body(response: &AppResponse) -> serde_json::Value {
    serde_json::from_slice(&response.body).unwrap()
}
