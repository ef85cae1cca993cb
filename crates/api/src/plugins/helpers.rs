//! Shared helpers for plugin implementations.

use chrono::{DateTime, Utc};
use serde::Serialize;

use ui_analyzer_core::adapters::DatabaseAdapter;
use ui_analyzer_core::{AppContext, AppError, AppRequest, AppResult, Claims, Plan, User};

/// Resolve the caller from an `Authorization: Bearer <token>` header.
///
/// The token must verify and name a user that still exists and is active.
pub async fn get_authenticated_user<DB: DatabaseAdapter>(
    req: &AppRequest,
    ctx: &AppContext<DB>,
) -> AppResult<(User, Claims)> {
    let token = req.bearer_token().ok_or(AppError::MissingToken)?;
    let claims = ctx.tokens.verify(token)?;

    match ctx.database.get_user_by_id(&claims.id).await? {
        Some(user) if user.is_active => Ok((user, claims)),
        _ => Err(AppError::InactiveAccount),
    }
}

/// Trimmed, lower-cased email used for storage and lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// The segment after `prefix` when it is a single non-empty path segment.
pub fn path_param<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    path.strip_prefix(prefix)
        .filter(|rest| !rest.is_empty() && !rest.contains('/'))
}

/// Whole days elapsed since `since`.
pub fn days_since(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - since).num_days().max(0)
}

/// Monthly analysis limit as shown to clients. `None` for paid plans.
pub fn monthly_limit<DB: DatabaseAdapter>(ctx: &AppContext<DB>, plan: Plan) -> Option<u32> {
    match plan {
        Plan::Free => Some(ctx.config.entitlement.free_monthly_analyses),
        _ => None,
    }
}

/// `{ "success": true, "message": ... }`
#[derive(Debug, Serialize)]
pub struct SuccessMessage {
    pub success: bool,
    pub message: String,
}

impl SuccessMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Foo@Example.COM "), "foo@example.com");
    }

    #[test]
    fn test_path_param() {
        assert_eq!(path_param("/payments/status/abc", "/payments/status/"), Some("abc"));
        assert_eq!(path_param("/payments/status/", "/payments/status/"), None);
        assert_eq!(path_param("/payments/status/a/b", "/payments/status/"), None);
        assert_eq!(path_param("/other/abc", "/payments/status/"), None);
    }
}
