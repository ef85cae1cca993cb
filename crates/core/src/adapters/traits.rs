use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppResult;
use crate::types::{
    CreateSubscription, CreateUser, Subscription, SubscriptionChanges, SubscriptionStatus,
    UpdateUser, Usage, UsageKind, User,
};

/// A counter increment requested by the entitlement engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageChange {
    pub kind: UsageKind,
    pub count: u64,
    /// Refuse the change when `monthly_analyses` has already reached this value.
    pub monthly_cap: Option<u64>,
}

/// Result of [`UserOps::apply_usage`].
#[derive(Debug, Clone, PartialEq)]
pub enum UsageOutcome {
    /// Counters after the increment.
    Applied(Usage),
    /// Cap already reached. Counters are unchanged apart from a monthly reset.
    LimitReached(Usage),
}

/// User persistence operations.
///
/// Every method that touches usage counters applies the monthly reset first
/// and is atomic with respect to other usage writes for the same user.
#[async_trait]
pub trait UserOps: Send + Sync + 'static {
    /// Fails with a 400 when the email is already taken.
    async fn create_user(&self, user: CreateUser) -> AppResult<User>;
    async fn get_user_by_id(&self, id: &str) -> AppResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn update_user(&self, id: &str, update: UpdateUser) -> AppResult<User>;
    /// Zero the monthly counter if `now` is in a later calendar month than the last reset.
    async fn refresh_monthly_usage(&self, id: &str, now: DateTime<Utc>) -> AppResult<User>;
    async fn apply_usage(
        &self,
        id: &str,
        change: UsageChange,
        now: DateTime<Utc>,
    ) -> AppResult<UsageOutcome>;
    /// Unconditionally zero the monthly counter.
    async fn reset_monthly_usage(&self, id: &str, now: DateTime<Utc>) -> AppResult<User>;
    async fn mark_login(&self, id: &str, now: DateTime<Utc>) -> AppResult<User>;
}

/// Subscription persistence operations.
#[async_trait]
pub trait SubscriptionOps: Send + Sync + 'static {
    /// Fails with a conflict when the payment token is already recorded.
    async fn create_subscription(&self, subscription: CreateSubscription)
    -> AppResult<Subscription>;
    async fn get_subscription_by_id(&self, id: &str) -> AppResult<Option<Subscription>>;
    async fn get_subscription_by_payment_token(
        &self,
        token: &str,
    ) -> AppResult<Option<Subscription>>;
    /// Newest first.
    async fn list_user_subscriptions(&self, user_id: &str) -> AppResult<Vec<Subscription>>;
    /// Compare-and-set on status.
    ///
    /// Returns `Ok(None)` without writing when the stored status is not
    /// `expected`, and a not-found error when the subscription is missing.
    async fn transition_subscription(
        &self,
        id: &str,
        expected: SubscriptionStatus,
        next: SubscriptionStatus,
        changes: SubscriptionChanges,
    ) -> AppResult<Option<Subscription>>;
    /// Cancel every `active` subscription of a user. Returns how many changed.
    async fn cancel_user_subscriptions(&self, user_id: &str) -> AppResult<usize>;
    /// Record a provider callback as processed.
    ///
    /// Returns `false` when `event_id` was already recorded.
    async fn claim_webhook_event(&self, event_id: &str, now: DateTime<Utc>) -> AppResult<bool>;
    /// Forget a claimed callback so a redelivery is processed again.
    async fn release_webhook_event(&self, event_id: &str) -> AppResult<()>;
}
