use super::*;
use crate::plugins::test_helpers::{self, TEST_PASSWORD};
use chrono::Duration;
use serde_json::json;
use ui_analyzer_core::adapters::{SubscriptionOps, UserOps};
use ui_analyzer_core::{AppError, Plan};

fn register_body(email: &str) -> serde_json::Value {
    json!({ "email": email, "password": TEST_PASSWORD, "name": "Jane Doe" })
}

#[tokio::test]
async fn test_register_success() {
    let (ctx, _) = test_helpers::create_test_context();
    let req = test_helpers::create_request(
        HttpMethod::Post,
        "/auth/register",
        None,
        Some(register_body("  Jane@Example.com ")),
    );

    let response = AuthPlugin::new().handle_register(&req, &ctx).await.unwrap();
    assert_eq!(response.status, 201);

    let body = test_helpers::json_body(&response);
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["email"], "jane@example.com");
    assert_eq!(body["user"]["plan"], "free");
    assert_eq!(body["user"]["usage"]["monthlyAnalyses"], 0);
    assert!(body["user"].get("passwordHash").is_none());

    let claims = ctx.tokens.verify(body["token"].as_str().unwrap()).unwrap();
    assert_eq!(claims.email, "jane@example.com");
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let (ctx, _) = test_helpers::create_test_context();
    test_helpers::create_user(&ctx, "jane@example.com", "Jane").await;

    let req = test_helpers::create_request(
        HttpMethod::Post,
        "/auth/register",
        None,
        Some(register_body("JANE@example.com")),
    );
    let err = AuthPlugin::new().handle_register(&req, &ctx).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert_eq!(err.to_string(), "User with this email already exists");
}

#[tokio::test]
async fn test_register_validation() {
    let (ctx, _) = test_helpers::create_test_context();
    let plugin = AuthPlugin::new();

    for body in [
        json!({ "email": "not-an-email", "password": TEST_PASSWORD, "name": "Jane" }),
        json!({ "email": "a@example.com", "password": "12345", "name": "Jane" }),
        json!({ "email": "a@example.com", "password": TEST_PASSWORD, "name": " J " }),
    ] {
        let req = test_helpers::create_request(
            HttpMethod::Post,
            "/auth/register",
            None,
            Some(body),
        );
        let err = plugin.handle_register(&req, &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "got {err:?}");
    }
}

#[tokio::test]
async fn test_login_success_updates_last_login() {
    let (ctx, _) = test_helpers::create_test_context();
    let user = test_helpers::create_user(&ctx, "jane@example.com", "Jane").await;
    assert!(user.last_login.is_none());

    let req = test_helpers::create_request(
        HttpMethod::Post,
        "/auth/login",
        None,
        Some(json!({ "email": "Jane@Example.com", "password": TEST_PASSWORD })),
    );
    let response = AuthPlugin::new().handle_login(&req, &ctx).await.unwrap();
    assert_eq!(response.status, 200);

    let body = test_helpers::json_body(&response);
    assert_eq!(body["user"]["subscription"]["plan"], "free");
    assert_eq!(body["user"]["subscription"]["status"], "active");
    assert!(body["user"]["subscription"]["endDate"].is_null());

    let stored = ctx.database.get_user_by_id(&user.id).await.unwrap().unwrap();
    assert!(stored.last_login.is_some());
}

#[tokio::test]
async fn test_login_bad_credentials() {
    let (ctx, _) = test_helpers::create_test_context();
    test_helpers::create_user(&ctx, "jane@example.com", "Jane").await;
    let plugin = AuthPlugin::new();

    for body in [
        json!({ "email": "jane@example.com", "password": "wrong-password" }),
        json!({ "email": "nobody@example.com", "password": TEST_PASSWORD }),
    ] {
        let req = test_helpers::create_request(HttpMethod::Post, "/auth/login", None, Some(body));
        let err = plugin.handle_login(&req, &ctx).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
        assert_eq!(err.to_string(), "Invalid email or password");
    }
}

#[tokio::test]
async fn test_me_requires_token() {
    let (ctx, _) = test_helpers::create_test_context();
    let req = test_helpers::create_request(HttpMethod::Get, "/auth/me", None, None);
    let err = AuthPlugin::new().handle_me(&req, &ctx).await.unwrap_err();
    assert!(matches!(err, AppError::MissingToken));

    let req = test_helpers::create_request(HttpMethod::Get, "/auth/me", Some("garbage"), None);
    let err = AuthPlugin::new().handle_me(&req, &ctx).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidToken));
}

#[tokio::test]
async fn test_me_rejects_expired_token() {
    let (ctx, _) = test_helpers::create_test_context();
    let user = test_helpers::create_user(&ctx, "jane@example.com", "Jane").await;
    let token = ctx
        .tokens
        .issue_at(&user.id, &user.email, chrono::Utc::now() - Duration::days(8))
        .unwrap();

    let req = test_helpers::create_request(HttpMethod::Get, "/auth/me", Some(&token), None);
    let err = AuthPlugin::new().handle_me(&req, &ctx).await.unwrap_err();
    assert!(matches!(err, AppError::TokenExpired));
}

#[tokio::test]
async fn test_me_returns_profile() {
    let (ctx, _) = test_helpers::create_test_context();
    let (_user, token) = test_helpers::create_user_with_token(&ctx, "jane@example.com").await;

    let req = test_helpers::create_request(HttpMethod::Get, "/auth/me", Some(&token), None);
    let response = AuthPlugin::new().handle_me(&req, &ctx).await.unwrap();
    let body = test_helpers::json_body(&response);
    assert_eq!(body["email"], "jane@example.com");
    assert_eq!(body["settings"]["emailNotifications"], true);
    assert_eq!(body["subscription"]["plan"], "free");
}

#[tokio::test]
async fn test_update_profile_email_taken() {
    let (ctx, _) = test_helpers::create_test_context();
    test_helpers::create_user(&ctx, "taken@example.com", "Other").await;
    let (_user, token) = test_helpers::create_user_with_token(&ctx, "jane@example.com").await;
    let plugin = AuthPlugin::new();

    let req = test_helpers::create_request(
        HttpMethod::Put,
        "/auth/profile",
        Some(&token),
        Some(json!({ "email": "Taken@example.com" })),
    );
    let err = plugin.handle_update_profile(&req, &ctx).await.unwrap_err();
    assert_eq!(err.to_string(), "Email is already in use");

    let req = test_helpers::create_request(
        HttpMethod::Put,
        "/auth/profile",
        Some(&token),
        Some(json!({ "name": "Janet", "email": "janet@example.com" })),
    );
    let body = test_helpers::json_body(&plugin.handle_update_profile(&req, &ctx).await.unwrap());
    assert_eq!(body["user"]["name"], "Janet");
    assert_eq!(body["user"]["email"], "janet@example.com");
}

#[tokio::test]
async fn test_update_settings_hides_key() {
    let (ctx, _) = test_helpers::create_test_context();
    let (user, token) = test_helpers::create_user_with_token(&ctx, "jane@example.com").await;

    let req = test_helpers::create_request(
        HttpMethod::Put,
        "/auth/settings",
        Some(&token),
        Some(json!({ "apiKey": "sk-test", "emailNotifications": false })),
    );
    let response = AuthPlugin::new().handle_update_settings(&req, &ctx).await.unwrap();
    let body = test_helpers::json_body(&response);
    assert_eq!(body["settings"]["hasApiKey"], true);
    assert_eq!(body["settings"]["emailNotifications"], false);
    assert!(!String::from_utf8_lossy(&response.body).contains("sk-test"));

    let stored = ctx.database.get_user_by_id(&user.id).await.unwrap().unwrap();
    assert_eq!(stored.settings.api_key.as_deref(), Some("sk-test"));
}

#[tokio::test]
async fn test_change_password() {
    let (ctx, _) = test_helpers::create_test_context();
    let (_user, token) = test_helpers::create_user_with_token(&ctx, "jane@example.com").await;
    let plugin = AuthPlugin::new();

    let req = test_helpers::create_request(
        HttpMethod::Put,
        "/auth/password",
        Some(&token),
        Some(json!({ "currentPassword": "wrong", "newPassword": "new-password" })),
    );
    let err = plugin.handle_change_password(&req, &ctx).await.unwrap_err();
    assert_eq!(err.to_string(), "Current password is incorrect");

    let req = test_helpers::create_request(
        HttpMethod::Put,
        "/auth/password",
        Some(&token),
        Some(json!({ "currentPassword": TEST_PASSWORD, "newPassword": "new-password" })),
    );
    plugin.handle_change_password(&req, &ctx).await.unwrap();

    let req = test_helpers::create_request(
        HttpMethod::Post,
        "/auth/login",
        None,
        Some(json!({ "email": "jane@example.com", "password": "new-password" })),
    );
    assert!(plugin.handle_login(&req, &ctx).await.is_ok());
}

#[tokio::test]
async fn test_delete_account_soft_deletes() {
    let (ctx, _) = test_helpers::create_test_context();
    let (user, token) = test_helpers::create_user_with_token(&ctx, "jane@example.com").await;

    // An activated yearly purchase gets cancelled with the account.
    let started = ctx
        .ledger()
        .start_purchase(
            &user,
            ui_analyzer_core::PurchaseRequest {
                plan: ui_analyzer_core::PaidPlan::Yearly,
                currency: ui_analyzer_core::Currency::Usd,
                customer: Default::default(),
            },
        )
        .await
        .unwrap();
    ctx.ledger().verify_purchase(&started.session_handle).await.unwrap();

    let req = test_helpers::create_request(HttpMethod::Delete, "/auth/account", Some(&token), None);
    let plugin = AuthPlugin::new();
    plugin.handle_delete_account(&req, &ctx).await.unwrap();

    let stored = ctx.database.get_user_by_id(&user.id).await.unwrap().unwrap();
    assert!(!stored.is_active);
    assert!(stored.email.starts_with("deleted_"));
    assert!(stored.email.ends_with("_jane@example.com"));
    assert_eq!(stored.plan, Plan::Yearly);

    let sub = ctx
        .database
        .get_subscription_by_id(&started.subscription.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.status, ui_analyzer_core::SubscriptionStatus::Cancelled);

    // The old token no longer authenticates.
    let req = test_helpers::create_request(HttpMethod::Get, "/auth/me", Some(&token), None);
    let err = plugin.handle_me(&req, &ctx).await.unwrap_err();
    assert!(matches!(err, AppError::InactiveAccount));

    // The email is free again.
    let req = test_helpers::create_request(
        HttpMethod::Post,
        "/auth/register",
        None,
        Some(register_body("jane@example.com")),
    );
    assert_eq!(plugin.handle_register(&req, &ctx).await.unwrap().status, 201);
}

#[tokio::test]
async fn test_refresh_issues_new_token() {
    let (ctx, _) = test_helpers::create_test_context();
    let (user, token) = test_helpers::create_user_with_token(&ctx, "jane@example.com").await;

    let req = test_helpers::create_request(HttpMethod::Post, "/auth/refresh", Some(&token), None);
    let response = AuthPlugin::new().handle_refresh(&req, &ctx).await.unwrap();
    let body = test_helpers::json_body(&response);
    let claims = ctx.tokens.verify(body["token"].as_str().unwrap()).unwrap();
    assert_eq!(claims.id, user.id);
}

#[tokio::test]
async fn test_unmatched_route_passes_through() {
    let (ctx, _) = test_helpers::create_test_context();
    let req = test_helpers::create_request(HttpMethod::Get, "/auth/unknown", None, None);
    let result = ApiPlugin::on_request(&AuthPlugin::new(), &req, &ctx).await.unwrap();
    assert!(result.is_none());
}
