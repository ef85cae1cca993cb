pub use super::traits::{SubscriptionOps, UsageChange, UsageOutcome, UserOps};

use crate::error::AppResult;
use crate::types::{Subscription, User};

/// Database adapter trait for persistence.
///
/// Any type implementing both [`UserOps`] and [`SubscriptionOps`]
/// automatically implements `DatabaseAdapter` via the blanket impl.
pub trait DatabaseAdapter: UserOps + SubscriptionOps {}

impl<T> DatabaseAdapter for T where T: UserOps + SubscriptionOps {}

/// Related records to load with a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserFetch {
    /// The user record only.
    Plain,
    /// The user plus the subscription referenced by `subscription_id`.
    WithSubscription,
}

/// A user together with any related records requested through [`UserFetch`].
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user: User,
    pub subscription: Option<Subscription>,
}

/// Load a user, joining related records only when asked to.
pub async fn fetch_user<DB: DatabaseAdapter>(
    db: &DB,
    id: &str,
    fetch: UserFetch,
) -> AppResult<Option<UserRecord>> {
    let Some(user) = db.get_user_by_id(id).await? else {
        return Ok(None);
    };

    let subscription = match (fetch, user.subscription_id.as_deref()) {
        (UserFetch::WithSubscription, Some(subscription_id)) => {
            db.get_subscription_by_id(subscription_id).await?
        }
        _ => None,
    };

    Ok(Some(UserRecord { user, subscription }))
}

#[cfg(feature = "postgres")]
pub mod sqlx_adapter {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use sqlx::postgres::PgRow;
    use sqlx::{PgPool, Postgres, Row, Transaction};
    use uuid::Uuid;

    use crate::error::{AppError, DatabaseError};
    use crate::types::{
        CreateSubscription, CreateUser, Currency, CustomerInfo, Language, PaidPlan, PaymentInfo,
        Plan, SubscriptionChanges, SubscriptionStatus, Theme, UpdateUser, Usage, UserSettings,
    };

    const SCHEMA: &str = r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            plan TEXT NOT NULL DEFAULT 'free',
            subscription_id TEXT,
            total_analyses BIGINT NOT NULL DEFAULT 0,
            monthly_analyses BIGINT NOT NULL DEFAULT 0,
            images_analyzed BIGINT NOT NULL DEFAULT 0,
            reports_downloaded BIGINT NOT NULL DEFAULT 0,
            last_reset_date TIMESTAMPTZ NOT NULL,
            api_key TEXT,
            email_notifications BOOLEAN NOT NULL DEFAULT TRUE,
            theme TEXT NOT NULL DEFAULT 'light',
            language TEXT NOT NULL DEFAULT 'en',
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            last_login TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        );
        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            plan TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            amount_minor BIGINT NOT NULL,
            currency TEXT NOT NULL,
            provider TEXT NOT NULL,
            payment_token TEXT NOT NULL UNIQUE,
            conversation_id TEXT NOT NULL,
            customer_info JSONB NOT NULL,
            payment_info JSONB,
            start_date TIMESTAMPTZ NOT NULL,
            end_date TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        );
        CREATE INDEX IF NOT EXISTS subscriptions_user_id_idx
            ON subscriptions (user_id, created_at DESC);
        CREATE TABLE IF NOT EXISTS webhook_events (
            id TEXT PRIMARY KEY,
            received_at TIMESTAMPTZ NOT NULL
        );
    "#;

    /// PostgreSQL database adapter via SQLx.
    pub struct SqlxAdapter {
        pool: PgPool,
    }

    #[derive(Debug, Clone)]
    pub struct PoolConfig {
        pub max_connections: u32,
        pub min_connections: u32,
        pub acquire_timeout: std::time::Duration,
        pub idle_timeout: Option<std::time::Duration>,
        pub max_lifetime: Option<std::time::Duration>,
    }

    impl Default for PoolConfig {
        fn default() -> Self {
            Self {
                max_connections: 10,
                min_connections: 0,
                acquire_timeout: std::time::Duration::from_secs(30),
                idle_timeout: Some(std::time::Duration::from_secs(600)),
                max_lifetime: Some(std::time::Duration::from_secs(1800)),
            }
        }
    }

    impl SqlxAdapter {
        pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
            let pool = PgPool::connect(database_url).await?;
            Ok(Self { pool })
        }

        pub async fn with_config(
            database_url: &str,
            config: PoolConfig,
        ) -> Result<Self, sqlx::Error> {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .acquire_timeout(config.acquire_timeout)
                .idle_timeout(config.idle_timeout)
                .max_lifetime(config.max_lifetime)
                .connect(database_url)
                .await?;
            Ok(Self { pool })
        }

        pub fn from_pool(pool: PgPool) -> Self {
            Self { pool }
        }

        /// Create the tables if they do not exist yet.
        pub async fn migrate(&self) -> AppResult<()> {
            sqlx::raw_sql(SCHEMA)
                .execute(&self.pool)
                .await
                .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            Ok(())
        }

        pub async fn close(&self) {
            self.pool.close().await;
        }

        async fn lock_user(
            tx: &mut Transaction<'_, Postgres>,
            id: &str,
        ) -> AppResult<User> {
            let row = sqlx::query("SELECT * FROM users WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or(AppError::UserNotFound)?;
            user_from_row(&row)
        }

        async fn write_usage(
            tx: &mut Transaction<'_, Postgres>,
            id: &str,
            usage: &Usage,
        ) -> AppResult<()> {
            sqlx::query(
                r#"
                UPDATE users SET total_analyses = $2, monthly_analyses = $3,
                    images_analyzed = $4, reports_downloaded = $5, last_reset_date = $6,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(usage.total_analyses as i64)
            .bind(usage.monthly_analyses as i64)
            .bind(usage.images_analyzed as i64)
            .bind(usage.reports_downloaded as i64)
            .bind(usage.last_reset_date)
            .execute(&mut **tx)
            .await?;
            Ok(())
        }
    }

    fn malformed(column: &str, value: &str) -> AppError {
        AppError::Database(DatabaseError::Query(format!(
            "unexpected value {value:?} in column {column}"
        )))
    }

    fn user_from_row(row: &PgRow) -> AppResult<User> {
        let plan: String = row.try_get("plan")?;
        let theme: String = row.try_get("theme")?;
        let language: String = row.try_get("language")?;
        Ok(User {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            password_hash: row.try_get("password_hash")?,
            plan: match plan.as_str() {
                "free" => Plan::Free,
                "yearly" => Plan::Yearly,
                "lifetime" => Plan::Lifetime,
                other => return Err(malformed("plan", other)),
            },
            subscription_id: row.try_get("subscription_id")?,
            usage: Usage {
                total_analyses: row.try_get::<i64, _>("total_analyses")? as u64,
                monthly_analyses: row.try_get::<i64, _>("monthly_analyses")? as u64,
                images_analyzed: row.try_get::<i64, _>("images_analyzed")? as u64,
                reports_downloaded: row.try_get::<i64, _>("reports_downloaded")? as u64,
                last_reset_date: row.try_get("last_reset_date")?,
            },
            settings: UserSettings {
                api_key: row.try_get("api_key")?,
                email_notifications: row.try_get("email_notifications")?,
                theme: if theme == "dark" { Theme::Dark } else { Theme::Light },
                language: if language == "tr" { Language::Tr } else { Language::En },
            },
            is_active: row.try_get("is_active")?,
            last_login: row.try_get("last_login")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn subscription_from_row(row: &PgRow) -> AppResult<Subscription> {
        let plan: String = row.try_get("plan")?;
        let status: String = row.try_get("status")?;
        let currency: String = row.try_get("currency")?;
        let customer_info: sqlx::types::Json<CustomerInfo> = row.try_get("customer_info")?;
        let payment_info: Option<sqlx::types::Json<PaymentInfo>> = row.try_get("payment_info")?;
        Ok(Subscription {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            plan: match plan.as_str() {
                "yearly" => PaidPlan::Yearly,
                "lifetime" => PaidPlan::Lifetime,
                other => return Err(malformed("plan", other)),
            },
            status: SubscriptionStatus::parse(&status)
                .ok_or_else(|| malformed("status", &status))?,
            amount_minor: row.try_get::<i64, _>("amount_minor")? as u64,
            currency: Currency::parse(&currency).ok_or_else(|| malformed("currency", &currency))?,
            provider: row.try_get("provider")?,
            payment_token: row.try_get("payment_token")?,
            conversation_id: row.try_get("conversation_id")?,
            customer_info: customer_info.0,
            payment_info: payment_info.map(|info| info.0),
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn theme_str(theme: Theme) -> &'static str {
        match theme {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    fn language_str(language: Language) -> &'static str {
        match language {
            Language::En => "en",
            Language::Tr => "tr",
        }
    }

    #[async_trait]
    impl UserOps for SqlxAdapter {
        async fn create_user(&self, create_user: CreateUser) -> AppResult<User> {
            let id = create_user
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let now = Utc::now();

            let row = sqlx::query(
                r#"
                INSERT INTO users (id, email, name, password_hash, last_reset_date,
                    created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $5, $5)
                RETURNING *
                "#,
            )
            .bind(&id)
            .bind(&create_user.email)
            .bind(&create_user.name)
            .bind(&create_user.password_hash)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match DatabaseError::from(e) {
                DatabaseError::Constraint(_) => {
                    AppError::bad_request("User already exists with this email")
                }
                other => AppError::Database(other),
            })?;

            user_from_row(&row)
        }

        async fn get_user_by_id(&self, id: &str) -> AppResult<Option<User>> {
            let row = sqlx::query("SELECT * FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(user_from_row).transpose()
        }

        async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
            let row = sqlx::query("SELECT * FROM users WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(user_from_row).transpose()
        }

        async fn update_user(&self, id: &str, update: UpdateUser) -> AppResult<User> {
            let mut query = sqlx::QueryBuilder::new("UPDATE users SET updated_at = NOW()");

            if let Some(email) = &update.email {
                query.push(", email = ");
                query.push_bind(email);
            }
            if let Some(name) = &update.name {
                query.push(", name = ");
                query.push_bind(name);
            }
            if let Some(password_hash) = &update.password_hash {
                query.push(", password_hash = ");
                query.push_bind(password_hash);
            }
            if let Some(plan) = update.plan {
                query.push(", plan = ");
                query.push_bind(plan.as_str());
            }
            if let Some(subscription_id) = &update.subscription_id {
                query.push(", subscription_id = ");
                query.push_bind(subscription_id);
            }
            if let Some(api_key) = &update.api_key {
                query.push(", api_key = ");
                query.push_bind(api_key.clone());
            }
            if let Some(email_notifications) = update.email_notifications {
                query.push(", email_notifications = ");
                query.push_bind(email_notifications);
            }
            if let Some(theme) = update.theme {
                query.push(", theme = ");
                query.push_bind(theme_str(theme));
            }
            if let Some(language) = update.language {
                query.push(", language = ");
                query.push_bind(language_str(language));
            }
            if let Some(is_active) = update.is_active {
                query.push(", is_active = ");
                query.push_bind(is_active);
            }

            query.push(" WHERE id = ");
            query.push_bind(id);
            query.push(" RETURNING *");

            let row = query
                .build()
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| match DatabaseError::from(e) {
                    DatabaseError::Constraint(_) => AppError::bad_request("Email already in use"),
                    other => AppError::Database(other),
                })?
                .ok_or(AppError::UserNotFound)?;
            user_from_row(&row)
        }

        async fn refresh_monthly_usage(&self, id: &str, now: DateTime<Utc>) -> AppResult<User> {
            let mut tx = self.pool.begin().await?;
            let mut user = Self::lock_user(&mut tx, id).await?;
            if user.usage.reset_if_new_month(now) {
                Self::write_usage(&mut tx, id, &user.usage).await?;
            }
            tx.commit().await?;
            Ok(user)
        }

        async fn apply_usage(
            &self,
            id: &str,
            change: UsageChange,
            now: DateTime<Utc>,
        ) -> AppResult<UsageOutcome> {
            let mut tx = self.pool.begin().await?;
            let mut user = Self::lock_user(&mut tx, id).await?;
            let outcome = user.usage.apply_change(&change, now);
            Self::write_usage(&mut tx, id, &user.usage).await?;
            tx.commit().await?;
            Ok(outcome)
        }

        async fn reset_monthly_usage(&self, id: &str, now: DateTime<Utc>) -> AppResult<User> {
            let mut tx = self.pool.begin().await?;
            let mut user = Self::lock_user(&mut tx, id).await?;
            user.usage.monthly_analyses = 0;
            user.usage.last_reset_date = now;
            Self::write_usage(&mut tx, id, &user.usage).await?;
            tx.commit().await?;
            Ok(user)
        }

        async fn mark_login(&self, id: &str, now: DateTime<Utc>) -> AppResult<User> {
            let row = sqlx::query(
                "UPDATE users SET last_login = $2, updated_at = $2 WHERE id = $1 RETURNING *",
            )
            .bind(id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::UserNotFound)?;
            user_from_row(&row)
        }
    }

    #[async_trait]
    impl SubscriptionOps for SqlxAdapter {
        async fn create_subscription(
            &self,
            create: CreateSubscription,
        ) -> AppResult<Subscription> {
            let id = Uuid::new_v4().to_string();
            let now = Utc::now();

            let row = sqlx::query(
                r#"
                INSERT INTO subscriptions (id, user_id, plan, status, amount_minor, currency,
                    provider, payment_token, conversation_id, customer_info, start_date, end_date,
                    created_at, updated_at)
                VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7, $8, $9, $10, $11, $10, $10)
                RETURNING *
                "#,
            )
            .bind(&id)
            .bind(&create.user_id)
            .bind(create.plan.as_str())
            .bind(create.amount_minor as i64)
            .bind(create.currency.code())
            .bind(&create.provider)
            .bind(&create.payment_token)
            .bind(&create.conversation_id)
            .bind(sqlx::types::Json(&create.customer_info))
            .bind(now)
            .bind(create.end_date)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match DatabaseError::from(e) {
                DatabaseError::Constraint(_) => {
                    AppError::conflict("Payment token already recorded")
                }
                other => AppError::Database(other),
            })?;

            subscription_from_row(&row)
        }

        async fn get_subscription_by_id(&self, id: &str) -> AppResult<Option<Subscription>> {
            let row = sqlx::query("SELECT * FROM subscriptions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(subscription_from_row).transpose()
        }

        async fn get_subscription_by_payment_token(
            &self,
            token: &str,
        ) -> AppResult<Option<Subscription>> {
            let row = sqlx::query("SELECT * FROM subscriptions WHERE payment_token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(subscription_from_row).transpose()
        }

        async fn list_user_subscriptions(&self, user_id: &str) -> AppResult<Vec<Subscription>> {
            let rows = sqlx::query(
                "SELECT * FROM subscriptions WHERE user_id = $1 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            rows.iter().map(subscription_from_row).collect()
        }

        async fn transition_subscription(
            &self,
            id: &str,
            expected: SubscriptionStatus,
            next: SubscriptionStatus,
            changes: SubscriptionChanges,
        ) -> AppResult<Option<Subscription>> {
            let row = sqlx::query(
                r#"
                UPDATE subscriptions SET status = $3,
                    payment_info = COALESCE($4, payment_info),
                    start_date = COALESCE($5, start_date),
                    end_date = COALESCE($6, end_date),
                    updated_at = NOW()
                WHERE id = $1 AND status = $2
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(expected.as_str())
            .bind(next.as_str())
            .bind(changes.payment_info.as_ref().map(sqlx::types::Json))
            .bind(changes.start_date)
            .bind(changes.end_date)
            .fetch_optional(&self.pool)
            .await?;

            match row {
                Some(row) => Ok(Some(subscription_from_row(&row)?)),
                None => match self.get_subscription_by_id(id).await? {
                    Some(_) => Ok(None),
                    None => Err(AppError::not_found("Subscription not found")),
                },
            }
        }

        async fn cancel_user_subscriptions(&self, user_id: &str) -> AppResult<usize> {
            let result = sqlx::query(
                "UPDATE subscriptions SET status = 'cancelled', updated_at = NOW() \
                 WHERE user_id = $1 AND status = 'active'",
            )
            .bind(user_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() as usize)
        }

        async fn claim_webhook_event(
            &self,
            event_id: &str,
            now: DateTime<Utc>,
        ) -> AppResult<bool> {
            let result = sqlx::query(
                "INSERT INTO webhook_events (id, received_at) VALUES ($1, $2) \
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(event_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        }

        async fn release_webhook_event(&self, event_id: &str) -> AppResult<()> {
            sqlx::query("DELETE FROM webhook_events WHERE id = $1")
                .bind(event_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }
}
