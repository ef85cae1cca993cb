//! Plan, usage and subscription history endpoints under `/subscriptions`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use ui_analyzer_core::adapters::DatabaseAdapter;
use ui_analyzer_core::{
    ApiPlugin, ApiRoute, AppContext, AppRequest, AppResponse, AppResult, Currency, HttpMethod,
    PaidPlan, Plan, Subscription, SubscriptionStatus, Usage, UsageKind, User,
    validate_request_body,
};

use super::helpers::{SuccessMessage, days_since, get_authenticated_user, monthly_limit};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TrackUsageRequest {
    #[serde(rename = "type")]
    pub(crate) kind: UsageKind,
    #[validate(range(min = 1, message = "Count must be a positive integer"))]
    pub(crate) count: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubscriptionDetails {
    pub(crate) plan: Plan,
    pub(crate) status: SubscriptionStatus,
    pub(crate) start_date: Option<DateTime<Utc>>,
    pub(crate) end_date: Option<DateTime<Utc>>,
    pub(crate) usage: Usage,
    pub(crate) can_analyze: bool,
    pub(crate) subscription: Option<Subscription>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TrackUsageResponse {
    pub(crate) success: bool,
    pub(crate) usage: Usage,
    pub(crate) can_analyze: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UsageStats {
    pub(crate) total_analyses: u64,
    pub(crate) monthly_analyses: u64,
    pub(crate) images_analyzed: u64,
    pub(crate) reports_downloaded: u64,
    pub(crate) days_since_joined: i64,
    pub(crate) monthly_limit: Option<u32>,
    pub(crate) can_analyze: bool,
    pub(crate) last_reset_date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HistoryEntry {
    pub(crate) id: String,
    pub(crate) plan: PaidPlan,
    pub(crate) status: SubscriptionStatus,
    pub(crate) amount: f64,
    pub(crate) currency: Currency,
    pub(crate) start_date: DateTime<Utc>,
    pub(crate) end_date: Option<DateTime<Utc>>,
    pub(crate) payment_provider: String,
    pub(crate) created_at: DateTime<Utc>,
}

impl From<Subscription> for HistoryEntry {
    fn from(sub: Subscription) -> Self {
        Self {
            amount: major_units(sub.amount_minor),
            id: sub.id,
            plan: sub.plan,
            status: sub.status,
            currency: sub.currency,
            start_date: sub.start_date,
            end_date: sub.end_date,
            payment_provider: sub.provider,
            created_at: sub.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Recommendation {
    pub(crate) savings: String,
    pub(crate) features: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Recommendations {
    pub(crate) yearly: Option<Recommendation>,
    pub(crate) lifetime: Option<Recommendation>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpgradeOptions {
    pub(crate) can_upgrade_to_yearly: bool,
    pub(crate) can_upgrade_to_lifetime: bool,
    pub(crate) current_plan: Plan,
    pub(crate) recommendations: Recommendations,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResetUsageResponse {
    #[serde(flatten)]
    pub(crate) message: SuccessMessage,
    pub(crate) usage: Usage,
}

fn major_units(amount_minor: u64) -> f64 {
    amount_minor as f64 / 100.0
}

// ---------------------------------------------------------------------------
// Core functions
// ---------------------------------------------------------------------------

pub(crate) async fn subscription_details_core<DB: DatabaseAdapter>(
    user: &User,
    ctx: &AppContext<DB>,
) -> AppResult<SubscriptionDetails> {
    let entitlement = ctx.entitlement().check(&user.id, Utc::now()).await?;
    let user = entitlement.user;
    let subscription = match user.subscription_id.as_deref() {
        Some(id) => ctx.database.get_subscription_by_id(id).await?,
        None => None,
    };
    let summary = user.subscription_summary(subscription.as_ref());

    Ok(SubscriptionDetails {
        plan: summary.plan,
        status: summary.status,
        start_date: subscription.as_ref().map(|s| s.start_date),
        end_date: summary.end_date,
        usage: user.usage,
        can_analyze: entitlement.can_analyze,
        subscription,
    })
}

pub(crate) async fn track_usage_core<DB: DatabaseAdapter>(
    body: &TrackUsageRequest,
    user: &User,
    ctx: &AppContext<DB>,
) -> AppResult<TrackUsageResponse> {
    let count = body.count.unwrap_or(1);
    let recorded = ctx.entitlement().consume(&user.id, body.kind, count).await?;
    Ok(TrackUsageResponse {
        success: true,
        usage: recorded.usage,
        can_analyze: recorded.can_analyze,
    })
}

pub(crate) async fn usage_stats_core<DB: DatabaseAdapter>(
    user: &User,
    ctx: &AppContext<DB>,
) -> AppResult<UsageStats> {
    let now = Utc::now();
    let entitlement = ctx.entitlement().check(&user.id, now).await?;
    let user = entitlement.user;

    Ok(UsageStats {
        total_analyses: user.usage.total_analyses,
        monthly_analyses: user.usage.monthly_analyses,
        images_analyzed: user.usage.images_analyzed,
        reports_downloaded: user.usage.reports_downloaded,
        days_since_joined: days_since(user.created_at, now),
        monthly_limit: monthly_limit(ctx, user.plan),
        can_analyze: entitlement.can_analyze,
        last_reset_date: user.usage.last_reset_date,
    })
}

pub(crate) async fn history_core<DB: DatabaseAdapter>(
    user: &User,
    ctx: &AppContext<DB>,
) -> AppResult<Vec<HistoryEntry>> {
    let subscriptions = ctx.ledger().history(&user.id).await?;
    Ok(subscriptions.into_iter().map(HistoryEntry::from).collect())
}

pub(crate) fn upgrade_options(user: &User) -> UpgradeOptions {
    let can_upgrade_to_yearly = user.plan == Plan::Free;
    let can_upgrade_to_lifetime = user.plan != Plan::Lifetime;

    UpgradeOptions {
        can_upgrade_to_yearly,
        can_upgrade_to_lifetime,
        current_plan: user.plan,
        recommendations: Recommendations {
            yearly: can_upgrade_to_yearly.then(|| Recommendation {
                savings: "Save $14/year compared to monthly".to_string(),
                features: vec!["Unlimited analyses", "Priority support", "Export features"],
            }),
            lifetime: can_upgrade_to_lifetime.then(|| Recommendation {
                savings: if user.plan == Plan::Yearly {
                    "Pay once, save $10 every year after year 2".to_string()
                } else {
                    "Best value - never pay again".to_string()
                },
                features: vec![
                    "Everything in yearly",
                    "Lifetime access",
                    "All future updates",
                ],
            }),
        },
    }
}

pub(crate) async fn reset_usage_core<DB: DatabaseAdapter>(
    user: &User,
    ctx: &AppContext<DB>,
) -> AppResult<ResetUsageResponse> {
    let user = ctx.database.reset_monthly_usage(&user.id, Utc::now()).await?;
    Ok(ResetUsageResponse {
        message: SuccessMessage::new("Monthly usage reset successfully"),
        usage: user.usage,
    })
}

/// Public plan catalogue built from the pricing and entitlement settings.
pub(crate) fn plans_catalogue<DB: DatabaseAdapter>(ctx: &AppContext<DB>) -> serde_json::Value {
    let pricing = &ctx.config.pricing;
    let price = |plan, currency| {
        pricing
            .amount_for(plan, currency)
            .map(major_units)
    };
    let yearly_usd = price(PaidPlan::Yearly, Currency::Usd);

    serde_json::json!({
        "free": {
            "name": "Free",
            "price": 0,
            "currency": "USD",
            "period": "forever",
            "features": {
                "analyses": ctx.config.entitlement.free_monthly_analyses,
                "period": "month",
                "aiAnalysis": false,
                "multipleImages": false,
                "export": false,
                "support": "community",
            },
        },
        "yearly": {
            "name": "Pro Yearly",
            "price": yearly_usd,
            "priceTRY": price(PaidPlan::Yearly, Currency::Try),
            "currency": "USD",
            "period": "year",
            "monthlyEquivalent": yearly_usd.map(|p| (p / 12.0 * 100.0).round() / 100.0),
            "features": {
                "analyses": "unlimited",
                "period": "month",
                "aiAnalysis": true,
                "multipleImages": true,
                "export": true,
                "support": "priority",
            },
        },
        "lifetime": {
            "name": "Lifetime Access",
            "price": price(PaidPlan::Lifetime, Currency::Usd),
            "priceTRY": price(PaidPlan::Lifetime, Currency::Try),
            "currency": "USD",
            "period": "lifetime",
            "features": {
                "analyses": "unlimited",
                "period": "forever",
                "aiAnalysis": true,
                "multipleImages": true,
                "export": true,
                "support": "priority",
                "futureUpdates": true,
            },
        },
    })
}

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

pub struct SubscriptionsPlugin;

impl SubscriptionsPlugin {
    pub fn new() -> Self {
        Self
    }

    async fn handle_me<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _) = get_authenticated_user(req, ctx).await?;
        let response = subscription_details_core(&user, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }

    async fn handle_track_usage<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _) = get_authenticated_user(req, ctx).await?;
        let body: TrackUsageRequest = validate_request_body(req)?;
        let response = track_usage_core(&body, &user, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }

    async fn handle_usage<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _) = get_authenticated_user(req, ctx).await?;
        let response = usage_stats_core(&user, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }

    async fn handle_history<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _) = get_authenticated_user(req, ctx).await?;
        let response = history_core(&user, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }

    async fn handle_can_upgrade<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _) = get_authenticated_user(req, ctx).await?;
        Ok(AppResponse::json(200, &upgrade_options(&user))?)
    }

    async fn handle_reset_usage<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _) = get_authenticated_user(req, ctx).await?;
        let response = reset_usage_core(&user, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }
}

impl Default for SubscriptionsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<DB: DatabaseAdapter> ApiPlugin<DB> for SubscriptionsPlugin {
    fn name(&self) -> &'static str {
        "subscriptions"
    }

    fn routes(&self) -> Vec<ApiRoute> {
        vec![
            ApiRoute::get("/subscriptions/me", "getSubscription"),
            ApiRoute::post("/subscriptions/track-usage", "trackUsage"),
            ApiRoute::get("/subscriptions/usage", "getUsage"),
            ApiRoute::get("/subscriptions/history", "getSubscriptionHistory"),
            ApiRoute::get("/subscriptions/can-upgrade", "canUpgrade"),
            ApiRoute::post("/subscriptions/reset-usage", "resetUsage"),
            ApiRoute::get("/subscriptions/plans", "listPlans"),
        ]
    }

    async fn on_request(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<Option<AppResponse>> {
        match (req.method(), req.path()) {
            (HttpMethod::Get, "/subscriptions/me") => Ok(Some(self.handle_me(req, ctx).await?)),
            (HttpMethod::Post, "/subscriptions/track-usage") => {
                Ok(Some(self.handle_track_usage(req, ctx).await?))
            }
            (HttpMethod::Get, "/subscriptions/usage") => {
                Ok(Some(self.handle_usage(req, ctx).await?))
            }
            (HttpMethod::Get, "/subscriptions/history") => {
                Ok(Some(self.handle_history(req, ctx).await?))
            }
            (HttpMethod::Get, "/subscriptions/can-upgrade") => {
                Ok(Some(self.handle_can_upgrade(req, ctx).await?))
            }
            (HttpMethod::Post, "/subscriptions/reset-usage") if ctx.config.enable_usage_reset => {
                Ok(Some(self.handle_reset_usage(req, ctx).await?))
            }
            (HttpMethod::Get, "/subscriptions/plans") => {
                Ok(Some(AppResponse::json(200, &plans_catalogue(ctx))?))
            }
            _ => Ok(None),
        }
    }
}
