use chrono::Utc;

use ui_analyzer_core::adapters::{DatabaseAdapter, UserFetch, fetch_user};
use ui_analyzer_core::password::{hash_password, validate_password, verify_password};
use ui_analyzer_core::{AppContext, AppError, AppResult, Claims, CreateUser, UpdateUser, User};

use super::types::*;
use crate::plugins::helpers::{SuccessMessage, normalize_email};

pub(crate) async fn register_core<DB: DatabaseAdapter>(
    body: &RegisterRequest,
    ctx: &AppContext<DB>,
) -> AppResult<TokenResponse> {
    validate_password(&body.password, &ctx.config.password)?;

    let email = normalize_email(&body.email);
    if ctx.database.get_user_by_email(&email).await?.is_some() {
        return Err(AppError::bad_request("User with this email already exists"));
    }

    let password_hash = hash_password(&body.password, &ctx.config.password.argon2_config)?;
    let user = ctx
        .database
        .create_user(CreateUser {
            id: None,
            email,
            name: body.name.trim().to_string(),
            password_hash,
        })
        .await?;

    let token = ctx.tokens.issue(&user.id, &user.email)?;
    tracing::info!(user_id = %user.id, "User registered");

    Ok(TokenResponse {
        success: true,
        token,
        user: AuthUserView::new(&user, None),
    })
}

pub(crate) async fn login_core<DB: DatabaseAdapter>(
    body: &LoginRequest,
    ctx: &AppContext<DB>,
) -> AppResult<TokenResponse> {
    let email = normalize_email(&body.email);
    let user = match ctx.database.get_user_by_email(&email).await? {
        Some(user) if user.is_active => user,
        _ => return Err(AppError::InvalidCredentials),
    };

    if !verify_password(&body.password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Password mismatch");
        return Err(AppError::InvalidCredentials);
    }

    ctx.database.mark_login(&user.id, Utc::now()).await?;
    let record = fetch_user(ctx.database.as_ref(), &user.id, UserFetch::WithSubscription)
        .await?
        .ok_or(AppError::UserNotFound)?;

    let token = ctx.tokens.issue(&record.user.id, &record.user.email)?;
    let summary = record.user.subscription_summary(record.subscription.as_ref());

    Ok(TokenResponse {
        success: true,
        token,
        user: AuthUserView::new(&record.user, Some(summary)),
    })
}

pub(crate) async fn me_core<DB: DatabaseAdapter>(
    user: &User,
    ctx: &AppContext<DB>,
) -> AppResult<MeResponse> {
    ctx.database.refresh_monthly_usage(&user.id, Utc::now()).await?;
    let record = fetch_user(ctx.database.as_ref(), &user.id, UserFetch::WithSubscription)
        .await?
        .ok_or(AppError::UserNotFound)?;
    let user = record.user;

    Ok(MeResponse {
        subscription: user.subscription_summary(record.subscription.as_ref()),
        settings: NotificationSettings {
            email_notifications: user.settings.email_notifications,
        },
        id: user.id,
        email: user.email,
        name: user.name,
        plan: user.plan,
        usage: user.usage,
        created_at: user.created_at,
    })
}

pub(crate) async fn update_profile_core<DB: DatabaseAdapter>(
    body: &UpdateProfileRequest,
    user: &User,
    ctx: &AppContext<DB>,
) -> AppResult<ProfileResponse> {
    let mut update = UpdateUser {
        name: body.name.as_deref().map(|n| n.trim().to_string()),
        ..Default::default()
    };

    if let Some(email) = body.email.as_deref().map(normalize_email)
        && email != user.email
    {
        if ctx.database.get_user_by_email(&email).await?.is_some() {
            return Err(AppError::bad_request("Email is already in use"));
        }
        update.email = Some(email);
    }

    let user = ctx.database.update_user(&user.id, update).await?;
    Ok(ProfileResponse {
        success: true,
        user: ProfileView {
            id: user.id,
            email: user.email,
            name: user.name,
        },
    })
}

pub(crate) async fn update_settings_core<DB: DatabaseAdapter>(
    body: &UpdateSettingsRequest,
    user: &User,
    ctx: &AppContext<DB>,
) -> AppResult<SettingsResponse> {
    let update = UpdateUser {
        api_key: body
            .api_key
            .as_ref()
            .map(|key| Some(key.trim().to_string()).filter(|k| !k.is_empty())),
        email_notifications: body.email_notifications,
        ..Default::default()
    };

    let user = ctx.database.update_user(&user.id, update).await?;
    Ok(SettingsResponse {
        success: true,
        settings: SettingsView {
            email_notifications: user.settings.email_notifications,
            has_api_key: user.has_api_key(),
        },
    })
}

pub(crate) async fn change_password_core<DB: DatabaseAdapter>(
    body: &ChangePasswordRequest,
    user: &User,
    ctx: &AppContext<DB>,
) -> AppResult<SuccessMessage> {
    validate_password(&body.new_password, &ctx.config.password).map_err(|_| {
        AppError::validation(
            "newPassword",
            format!(
                "New password must be at least {} characters",
                ctx.config.password.min_length
            ),
        )
    })?;

    if !verify_password(&body.current_password, &user.password_hash)? {
        return Err(AppError::bad_request("Current password is incorrect"));
    }

    let password_hash = hash_password(&body.new_password, &ctx.config.password.argon2_config)?;
    ctx.database
        .update_user(
            &user.id,
            UpdateUser {
                password_hash: Some(password_hash),
                ..Default::default()
            },
        )
        .await?;

    Ok(SuccessMessage::new("Password updated successfully"))
}

/// Soft delete: deactivate, free up the email, cancel active subscriptions.
pub(crate) async fn delete_account_core<DB: DatabaseAdapter>(
    user: &User,
    ctx: &AppContext<DB>,
) -> AppResult<SuccessMessage> {
    let cancelled = ctx.database.cancel_user_subscriptions(&user.id).await?;

    ctx.database
        .update_user(
            &user.id,
            UpdateUser {
                is_active: Some(false),
                email: Some(format!(
                    "deleted_{}_{}",
                    Utc::now().timestamp_millis(),
                    user.email
                )),
                ..Default::default()
            },
        )
        .await?;

    tracing::info!(user_id = %user.id, cancelled, "Account deleted");
    Ok(SuccessMessage::new("Account deleted successfully"))
}

pub(crate) fn refresh_core<DB: DatabaseAdapter>(
    claims: &Claims,
    ctx: &AppContext<DB>,
) -> AppResult<RefreshResponse> {
    Ok(RefreshResponse {
        success: true,
        token: ctx.tokens.refresh(claims)?,
    })
}
