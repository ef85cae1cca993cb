//! Per-user analytics, preferences and data export under `/users`.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use ui_analyzer_core::adapters::{DatabaseAdapter, UserFetch, fetch_user};
use ui_analyzer_core::{
    ApiPlugin, ApiRoute, AppContext, AppError, AppRequest, AppResponse, AppResult, HttpMethod,
    Language, Plan, SubscriptionStatus, Theme, UpdateUser, Usage, UsageKind, User,
    validate_request_body,
};

use super::helpers::{
    days_since, get_authenticated_user, monthly_limit, normalize_email, path_param,
};

const CHECK_EMAIL_PREFIX: &str = "/users/check-email/";

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SaveAnalysisRequest {
    #[validate(range(min = 1, message = "imageCount must be at least 1"))]
    pub(crate) image_count: u64,
    pub(crate) image_names: Vec<serde_json::Value>,
    pub(crate) results: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdatePreferencesRequest {
    pub(crate) email_notifications: Option<bool>,
    pub(crate) theme: Option<Theme>,
    pub(crate) language: Option<Language>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UsageAnalytics {
    pub(crate) total_analyses: u64,
    pub(crate) monthly_analyses: u64,
    pub(crate) images_analyzed: u64,
    pub(crate) reports_downloaded: u64,
    pub(crate) avg_analyses_per_day: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccountAnalytics {
    pub(crate) days_since_joined: i64,
    pub(crate) plan: Plan,
    pub(crate) status: &'static str,
    pub(crate) last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LimitAnalytics {
    pub(crate) monthly_limit: Option<u32>,
    pub(crate) monthly_progress: u64,
    pub(crate) can_analyze: bool,
    pub(crate) ms_until_reset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnalyticsResponse {
    pub(crate) usage: UsageAnalytics,
    pub(crate) account: AccountAnalytics,
    pub(crate) limits: LimitAnalytics,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SaveAnalysisResponse {
    pub(crate) success: bool,
    pub(crate) analysis_id: String,
    pub(crate) usage: Usage,
    pub(crate) can_analyze: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Preferences {
    pub(crate) email_notifications: bool,
    pub(crate) theme: Theme,
    pub(crate) language: Language,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PreferencesView {
    #[serde(flatten)]
    pub(crate) preferences: Preferences,
    pub(crate) has_api_key: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdatePreferencesResponse {
    pub(crate) success: bool,
    pub(crate) preferences: Preferences,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExportProfile {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) name: String,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExportSubscription {
    pub(crate) plan: Plan,
    pub(crate) status: SubscriptionStatus,
    pub(crate) start_date: Option<DateTime<Utc>>,
    pub(crate) end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExportData {
    pub(crate) profile: ExportProfile,
    pub(crate) subscription: ExportSubscription,
    pub(crate) usage: Usage,
    pub(crate) settings: Preferences,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExportResponse {
    pub(crate) export_date: DateTime<Utc>,
    pub(crate) data: ExportData,
}

#[derive(Debug, Serialize)]
pub(crate) struct EmailAvailability {
    pub(crate) available: bool,
    pub(crate) email: String,
}

fn preferences_of(user: &User) -> Preferences {
    Preferences {
        email_notifications: user.settings.email_notifications,
        theme: user.settings.theme,
        language: user.settings.language,
    }
}

/// Milliseconds from `now` until midnight UTC on the first of the month after `last_reset`.
pub(crate) fn ms_until_reset(last_reset: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let (year, month) = match last_reset.month() {
        12 => (last_reset.year() + 1, 1),
        m => (last_reset.year(), m + 1),
    };
    match Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single() {
        Some(next_reset) => (next_reset - now).num_milliseconds().max(0),
        None => 0,
    }
}

// ---------------------------------------------------------------------------
// Core functions
// ---------------------------------------------------------------------------

pub(crate) async fn analytics_core<DB: DatabaseAdapter>(
    user: &User,
    ctx: &AppContext<DB>,
) -> AppResult<AnalyticsResponse> {
    let now = Utc::now();
    let entitlement = ctx.entitlement().check(&user.id, now).await?;
    let user = entitlement.user;
    let days = days_since(user.created_at, now);
    let usage = &user.usage;
    let limit = monthly_limit(ctx, user.plan);

    let avg_analyses_per_day = if days > 0 {
        (usage.total_analyses as f64 / days as f64 * 100.0).round() / 100.0
    } else {
        0.0
    };
    let monthly_progress = match limit {
        Some(0) => 100,
        Some(limit) => (usage.monthly_analyses as f64 / f64::from(limit) * 100.0).round() as u64,
        None => 100,
    };

    Ok(AnalyticsResponse {
        usage: UsageAnalytics {
            total_analyses: usage.total_analyses,
            monthly_analyses: usage.monthly_analyses,
            images_analyzed: usage.images_analyzed,
            reports_downloaded: usage.reports_downloaded,
            avg_analyses_per_day,
        },
        account: AccountAnalytics {
            days_since_joined: days,
            plan: user.plan,
            status: if user.is_active { "active" } else { "inactive" },
            last_login: user.last_login,
        },
        limits: LimitAnalytics {
            monthly_limit: limit,
            monthly_progress,
            can_analyze: entitlement.can_analyze,
            ms_until_reset: limit.map(|_| ms_until_reset(usage.last_reset_date, now)),
        },
    })
}

pub(crate) async fn save_analysis_core<DB: DatabaseAdapter>(
    body: &SaveAnalysisRequest,
    user: &User,
    ctx: &AppContext<DB>,
) -> AppResult<SaveAnalysisResponse> {
    let entitlement = ctx.entitlement();
    entitlement.consume(&user.id, UsageKind::Analysis, 1).await?;
    let recorded = entitlement
        .record_usage(&user.id, UsageKind::Images, body.image_count)
        .await?;

    let analysis_id = format!("analysis_{}", Utc::now().timestamp_millis());
    tracing::info!(
        user_id = %user.id,
        analysis_id = %analysis_id,
        image_count = body.image_count,
        image_names = body.image_names.len(),
        result_keys = body.results.len(),
        "Analysis saved"
    );

    Ok(SaveAnalysisResponse {
        success: true,
        analysis_id,
        usage: recorded.usage,
        can_analyze: recorded.can_analyze,
    })
}

pub(crate) async fn update_preferences_core<DB: DatabaseAdapter>(
    body: &UpdatePreferencesRequest,
    user: &User,
    ctx: &AppContext<DB>,
) -> AppResult<UpdatePreferencesResponse> {
    let user = ctx
        .database
        .update_user(
            &user.id,
            UpdateUser {
                email_notifications: body.email_notifications,
                theme: body.theme,
                language: body.language,
                ..Default::default()
            },
        )
        .await?;

    Ok(UpdatePreferencesResponse {
        success: true,
        preferences: preferences_of(&user),
    })
}

pub(crate) async fn export_core<DB: DatabaseAdapter>(
    user: &User,
    ctx: &AppContext<DB>,
) -> AppResult<ExportResponse> {
    let record = fetch_user(ctx.database.as_ref(), &user.id, UserFetch::WithSubscription)
        .await?
        .ok_or(AppError::UserNotFound)?;
    let user = record.user;
    let summary = user.subscription_summary(record.subscription.as_ref());

    Ok(ExportResponse {
        export_date: Utc::now(),
        data: ExportData {
            subscription: ExportSubscription {
                plan: summary.plan,
                status: summary.status,
                start_date: record.subscription.as_ref().map(|s| s.start_date),
                end_date: summary.end_date,
            },
            settings: preferences_of(&user),
            profile: ExportProfile {
                id: user.id,
                email: user.email,
                name: user.name,
                created_at: user.created_at,
                last_login: user.last_login,
            },
            usage: user.usage,
        },
    })
}

pub(crate) async fn check_email_core<DB: DatabaseAdapter>(
    email: &str,
    ctx: &AppContext<DB>,
) -> AppResult<EmailAvailability> {
    let email = normalize_email(email);
    let taken = ctx
        .database
        .get_user_by_email(&email)
        .await?
        .is_some_and(|user| user.is_active);
    Ok(EmailAvailability {
        available: !taken,
        email,
    })
}

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

pub struct UsersPlugin;

impl UsersPlugin {
    pub fn new() -> Self {
        Self
    }

    async fn handle_analytics<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _) = get_authenticated_user(req, ctx).await?;
        let response = analytics_core(&user, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }

    async fn handle_save_analysis<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _) = get_authenticated_user(req, ctx).await?;
        let body: SaveAnalysisRequest = validate_request_body(req)?;
        let response = save_analysis_core(&body, &user, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }

    async fn handle_get_preferences<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _) = get_authenticated_user(req, ctx).await?;
        let response = PreferencesView {
            preferences: preferences_of(&user),
            has_api_key: user.has_api_key(),
        };
        Ok(AppResponse::json(200, &response)?)
    }

    async fn handle_update_preferences<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _) = get_authenticated_user(req, ctx).await?;
        let body: UpdatePreferencesRequest = validate_request_body(req)?;
        let response = update_preferences_core(&body, &user, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }

    async fn handle_export<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _) = get_authenticated_user(req, ctx).await?;
        let response = export_core(&user, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }
}

impl Default for UsersPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<DB: DatabaseAdapter> ApiPlugin<DB> for UsersPlugin {
    fn name(&self) -> &'static str {
        "users"
    }

    fn routes(&self) -> Vec<ApiRoute> {
        vec![
            ApiRoute::get("/users/analytics", "getAnalytics"),
            ApiRoute::post("/users/save-analysis", "saveAnalysis"),
            ApiRoute::get("/users/preferences", "getPreferences"),
            ApiRoute::put("/users/preferences", "updatePreferences"),
            ApiRoute::get("/users/export", "exportUserData"),
            ApiRoute::get("/users/check-email/{email}", "checkEmail"),
        ]
    }

    async fn on_request(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<Option<AppResponse>> {
        match (req.method(), req.path()) {
            (HttpMethod::Get, "/users/analytics") => {
                Ok(Some(self.handle_analytics(req, ctx).await?))
            }
            (HttpMethod::Post, "/users/save-analysis") => {
                Ok(Some(self.handle_save_analysis(req, ctx).await?))
            }
            (HttpMethod::Get, "/users/preferences") => {
                Ok(Some(self.handle_get_preferences(req, ctx).await?))
            }
            (HttpMethod::Put, "/users/preferences") => {
                Ok(Some(self.handle_update_preferences(req, ctx).await?))
            }
            (HttpMethod::Get, "/users/export") => Ok(Some(self.handle_export(req, ctx).await?)),
            (HttpMethod::Get, path) => match path_param(path, CHECK_EMAIL_PREFIX) {
                Some(email) => {
                    let response = check_email_core(email, ctx).await?;
                    Ok(Some(AppResponse::json(200, &response)?))
                }
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }
}
