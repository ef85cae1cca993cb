use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::types::{
    CreateSubscription, CreateUser, Subscription, SubscriptionChanges, SubscriptionStatus,
    UpdateUser, User,
};

use super::traits::{SubscriptionOps, UsageChange, UsageOutcome, UserOps};

type Record<T> = Arc<Mutex<T>>;

/// In-memory database adapter for tests and single-process development.
///
/// Each user lives behind its own lock, so usage writes for one user never
/// wait on another.
#[derive(Clone, Default)]
pub struct MemoryDatabaseAdapter {
    users: Arc<RwLock<HashMap<String, Record<User>>>>,
    email_index: Arc<Mutex<HashMap<String, String>>>,
    subscriptions: Arc<RwLock<HashMap<String, Subscription>>>,
    token_index: Arc<RwLock<HashMap<String, String>>>,
    webhook_events: Arc<Mutex<HashSet<String>>>,
}

impl MemoryDatabaseAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    async fn user_record(&self, id: &str) -> AppResult<Record<User>> {
        self.users
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(AppError::UserNotFound)
    }
}

#[async_trait]
impl UserOps for MemoryDatabaseAdapter {
    async fn create_user(&self, create_user: CreateUser) -> AppResult<User> {
        let mut email_index = self.email_index.lock().await;

        if email_index.contains_key(&create_user.email) {
            return Err(AppError::bad_request("User already exists with this email"));
        }

        let id = create_user
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let user = User::from_create(id.clone(), &create_user, Utc::now());

        email_index.insert(user.email.clone(), id.clone());
        self.users
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(user.clone())));

        Ok(user)
    }

    async fn get_user_by_id(&self, id: &str) -> AppResult<Option<User>> {
        let record = self.users.read().await.get(id).cloned();
        match record {
            Some(record) => Ok(Some(record.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let id = self.email_index.lock().await.get(email).cloned();
        match id {
            Some(id) => self.get_user_by_id(&id).await,
            None => Ok(None),
        }
    }

    async fn update_user(&self, id: &str, update: UpdateUser) -> AppResult<User> {
        let record = self.user_record(id).await?;
        let mut email_index = self.email_index.lock().await;
        let mut user = record.lock().await;

        if let Some(new_email) = &update.email
            && *new_email != user.email
        {
            if email_index.contains_key(new_email) {
                return Err(AppError::bad_request("Email already in use"));
            }
            email_index.remove(&user.email);
            email_index.insert(new_email.clone(), id.to_string());
        }

        user.apply_update(&update, Utc::now());
        Ok(user.clone())
    }

    async fn refresh_monthly_usage(&self, id: &str, now: DateTime<Utc>) -> AppResult<User> {
        let record = self.user_record(id).await?;
        let mut user = record.lock().await;
        if user.usage.reset_if_new_month(now) {
            user.updated_at = now;
        }
        Ok(user.clone())
    }

    async fn apply_usage(
        &self,
        id: &str,
        change: UsageChange,
        now: DateTime<Utc>,
    ) -> AppResult<UsageOutcome> {
        let record = self.user_record(id).await?;
        let mut user = record.lock().await;
        let outcome = user.usage.apply_change(&change, now);
        user.updated_at = now;
        Ok(outcome)
    }

    async fn reset_monthly_usage(&self, id: &str, now: DateTime<Utc>) -> AppResult<User> {
        let record = self.user_record(id).await?;
        let mut user = record.lock().await;
        user.usage.monthly_analyses = 0;
        user.usage.last_reset_date = now;
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn mark_login(&self, id: &str, now: DateTime<Utc>) -> AppResult<User> {
        let record = self.user_record(id).await?;
        let mut user = record.lock().await;
        user.last_login = Some(now);
        user.updated_at = now;
        Ok(user.clone())
    }
}

#[async_trait]
impl SubscriptionOps for MemoryDatabaseAdapter {
    async fn create_subscription(&self, create: CreateSubscription) -> AppResult<Subscription> {
        let mut subscriptions = self.subscriptions.write().await;
        let mut token_index = self.token_index.write().await;

        if token_index.contains_key(&create.payment_token) {
            return Err(AppError::conflict("Payment token already recorded"));
        }

        let id = Uuid::new_v4().to_string();
        let subscription = Subscription::from_create(id.clone(), &create, Utc::now());

        token_index.insert(create.payment_token.clone(), id.clone());
        subscriptions.insert(id, subscription.clone());

        Ok(subscription)
    }

    async fn get_subscription_by_id(&self, id: &str) -> AppResult<Option<Subscription>> {
        Ok(self.subscriptions.read().await.get(id).cloned())
    }

    async fn get_subscription_by_payment_token(
        &self,
        token: &str,
    ) -> AppResult<Option<Subscription>> {
        let id = self.token_index.read().await.get(token).cloned();
        match id {
            Some(id) => self.get_subscription_by_id(&id).await,
            None => Ok(None),
        }
    }

    async fn list_user_subscriptions(&self, user_id: &str) -> AppResult<Vec<Subscription>> {
        let subscriptions = self.subscriptions.read().await;
        let mut owned: Vec<Subscription> = subscriptions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn transition_subscription(
        &self,
        id: &str,
        expected: SubscriptionStatus,
        next: SubscriptionStatus,
        changes: SubscriptionChanges,
    ) -> AppResult<Option<Subscription>> {
        let mut subscriptions = self.subscriptions.write().await;
        let subscription = subscriptions
            .get_mut(id)
            .ok_or_else(|| AppError::not_found("Subscription not found"))?;

        if subscription.status != expected {
            return Ok(None);
        }

        subscription.apply_transition(next, &changes, Utc::now());
        Ok(Some(subscription.clone()))
    }

    async fn cancel_user_subscriptions(&self, user_id: &str) -> AppResult<usize> {
        let mut subscriptions = self.subscriptions.write().await;
        let now = Utc::now();
        let mut cancelled = 0;
        for subscription in subscriptions.values_mut() {
            if subscription.user_id == user_id && subscription.status == SubscriptionStatus::Active
            {
                subscription.apply_transition(
                    SubscriptionStatus::Cancelled,
                    &SubscriptionChanges::default(),
                    now,
                );
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    async fn claim_webhook_event(&self, event_id: &str, _now: DateTime<Utc>) -> AppResult<bool> {
        Ok(self.webhook_events.lock().await.insert(event_id.to_string()))
    }

    async fn release_webhook_event(&self, event_id: &str) -> AppResult<()> {
        self.webhook_events.lock().await.remove(event_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Currency, CustomerInfo, PaidPlan, UsageKind};
    use chrono::TimeZone;

    fn create_user(email: &str) -> CreateUser {
        CreateUser {
            id: None,
            email: email.to_string(),
            name: "Test User".to_string(),
            password_hash: "hash".to_string(),
        }
    }

    fn create_subscription(user_id: &str, token: &str) -> CreateSubscription {
        CreateSubscription {
            user_id: user_id.to_string(),
            plan: PaidPlan::Yearly,
            amount_minor: 1_000,
            currency: Currency::Usd,
            provider: "demo".to_string(),
            payment_token: token.to_string(),
            conversation_id: Uuid::new_v4().to_string(),
            customer_info: CustomerInfo::default(),
            end_date: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let db = MemoryDatabaseAdapter::new();
        db.create_user(create_user("dup@example.com")).await.unwrap();
        let err = db
            .create_user(create_user("dup@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_update_email_moves_index() {
        let db = MemoryDatabaseAdapter::new();
        let user = db.create_user(create_user("old@example.com")).await.unwrap();
        db.update_user(
            &user.id,
            UpdateUser {
                email: Some("new@example.com".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(db.get_user_by_email("old@example.com").await.unwrap().is_none());
        assert_eq!(
            db.get_user_by_email("new@example.com").await.unwrap().unwrap().id,
            user.id
        );
        // the old address is free again
        db.create_user(create_user("old@example.com")).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_usage_increments_are_not_lost() {
        let db = MemoryDatabaseAdapter::new();
        let user = db.create_user(create_user("busy@example.com")).await.unwrap();
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let db = db.clone();
            let id = user.id.clone();
            handles.push(tokio::spawn(async move {
                db.apply_usage(
                    &id,
                    UsageChange {
                        kind: UsageKind::Analysis,
                        count: 1,
                        monthly_cap: None,
                    },
                    now,
                )
                .await
                .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = db.get_user_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(stored.usage.total_analyses, 50);
        assert_eq!(stored.usage.monthly_analyses, 50);
    }

    #[tokio::test]
    async fn test_concurrent_capped_usage_never_exceeds_cap() {
        let db = MemoryDatabaseAdapter::new();
        let user = db.create_user(create_user("capped@example.com")).await.unwrap();
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let db = db.clone();
            let id = user.id.clone();
            handles.push(tokio::spawn(async move {
                db.apply_usage(
                    &id,
                    UsageChange {
                        kind: UsageKind::Analysis,
                        count: 1,
                        monthly_cap: Some(3),
                    },
                    now,
                )
                .await
                .unwrap()
            }));
        }
        let mut applied = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), UsageOutcome::Applied(_)) {
                applied += 1;
            }
        }

        assert_eq!(applied, 3);
        let stored = db.get_user_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(stored.usage.monthly_analyses, 3);
    }

    #[tokio::test]
    async fn test_refresh_resets_stale_month() {
        let db = MemoryDatabaseAdapter::new();
        let user = db.create_user(create_user("stale@example.com")).await.unwrap();
        let january = Utc.with_ymd_and_hms(2026, 1, 20, 12, 0, 0).unwrap();
        let february = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();

        db.reset_monthly_usage(&user.id, january).await.unwrap();
        db.apply_usage(
            &user.id,
            UsageChange {
                kind: UsageKind::Analysis,
                count: 2,
                monthly_cap: None,
            },
            january,
        )
        .await
        .unwrap();

        let refreshed = db.refresh_monthly_usage(&user.id, february).await.unwrap();
        assert_eq!(refreshed.usage.monthly_analyses, 0);
        assert_eq!(refreshed.usage.total_analyses, 2);
        assert_eq!(refreshed.usage.last_reset_date, february);
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let db = MemoryDatabaseAdapter::new();
        let sub = db
            .create_subscription(create_subscription("u1", "tok-1"))
            .await
            .unwrap();

        let activated = db
            .transition_subscription(
                &sub.id,
                SubscriptionStatus::Pending,
                SubscriptionStatus::Active,
                SubscriptionChanges::default(),
            )
            .await
            .unwrap();
        assert_eq!(activated.unwrap().status, SubscriptionStatus::Active);

        let second = db
            .transition_subscription(
                &sub.id,
                SubscriptionStatus::Pending,
                SubscriptionStatus::Cancelled,
                SubscriptionChanges::default(),
            )
            .await
            .unwrap();
        assert!(second.is_none());

        let missing = db
            .transition_subscription(
                "nope",
                SubscriptionStatus::Pending,
                SubscriptionStatus::Active,
                SubscriptionChanges::default(),
            )
            .await;
        assert_eq!(missing.unwrap_err().status_code(), 404);
    }

    #[tokio::test]
    async fn test_payment_token_is_unique() {
        let db = MemoryDatabaseAdapter::new();
        db.create_subscription(create_subscription("u1", "tok-dup"))
            .await
            .unwrap();
        let err = db
            .create_subscription(create_subscription("u2", "tok-dup"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn test_cancel_user_subscriptions_only_touches_active() {
        let db = MemoryDatabaseAdapter::new();
        let active = db
            .create_subscription(create_subscription("u1", "tok-a"))
            .await
            .unwrap();
        let pending = db
            .create_subscription(create_subscription("u1", "tok-p"))
            .await
            .unwrap();
        db.transition_subscription(
            &active.id,
            SubscriptionStatus::Pending,
            SubscriptionStatus::Active,
            SubscriptionChanges::default(),
        )
        .await
        .unwrap();

        assert_eq!(db.cancel_user_subscriptions("u1").await.unwrap(), 1);
        let active = db.get_subscription_by_id(&active.id).await.unwrap().unwrap();
        let pending = db.get_subscription_by_id(&pending.id).await.unwrap().unwrap();
        assert_eq!(active.status, SubscriptionStatus::Cancelled);
        assert_eq!(pending.status, SubscriptionStatus::Pending);
    }

    #[tokio::test]
    async fn test_webhook_event_claimed_once_until_released() {
        let db = MemoryDatabaseAdapter::new();
        let now = Utc::now();

        assert!(db.claim_webhook_event("evt_1", now).await.unwrap());
        assert!(!db.claim_webhook_event("evt_1", now).await.unwrap());
        assert!(db.claim_webhook_event("evt_2", now).await.unwrap());

        db.release_webhook_event("evt_1").await.unwrap();
        assert!(db.claim_webhook_event("evt_1", now).await.unwrap());
    }
}
