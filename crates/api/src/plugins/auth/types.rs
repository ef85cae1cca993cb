use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use ui_analyzer_core::{Plan, SubscriptionSummary, Usage, User};

pub(crate) fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().chars().count() < 2 {
        let mut err = ValidationError::new("length");
        err.message = Some("Name must be at least 2 characters".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct RegisterRequest {
    #[validate(email(message = "Please provide a valid email"))]
    pub(crate) email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub(crate) password: String,
    #[validate(custom(function = "validate_name"))]
    pub(crate) name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct LoginRequest {
    #[validate(email(message = "Please provide a valid email"))]
    pub(crate) email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub(crate) password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct UpdateProfileRequest {
    #[validate(custom(function = "validate_name"))]
    pub(crate) name: Option<String>,
    #[validate(email(message = "Please provide a valid email"))]
    pub(crate) email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateSettingsRequest {
    /// An empty string clears the stored key.
    #[serde(alias = "openaiApiKey")]
    pub(crate) api_key: Option<String>,
    pub(crate) email_notifications: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub(crate) current_password: String,
    pub(crate) new_password: String,
}

/// User fields returned by register and login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthUserView {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) name: String,
    pub(crate) plan: Plan,
    pub(crate) usage: Usage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) subscription: Option<SubscriptionSummary>,
    pub(crate) created_at: DateTime<Utc>,
}

impl AuthUserView {
    pub(crate) fn new(user: &User, subscription: Option<SubscriptionSummary>) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            plan: user.plan,
            usage: user.usage.clone(),
            subscription,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TokenResponse {
    pub(crate) success: bool,
    pub(crate) token: String,
    pub(crate) user: AuthUserView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NotificationSettings {
    pub(crate) email_notifications: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MeResponse {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) name: String,
    pub(crate) plan: Plan,
    pub(crate) usage: Usage,
    pub(crate) subscription: SubscriptionSummary,
    pub(crate) settings: NotificationSettings,
    pub(crate) created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProfileView {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProfileResponse {
    pub(crate) success: bool,
    pub(crate) user: ProfileView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SettingsView {
    pub(crate) email_notifications: bool,
    pub(crate) has_api_key: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SettingsResponse {
    pub(crate) success: bool,
    pub(crate) settings: SettingsView,
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshResponse {
    pub(crate) success: bool,
    pub(crate) token: String,
}
