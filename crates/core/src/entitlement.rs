//! Usage metering and plan entitlements.
//!
//! The counter arithmetic lives on [`Usage`] as pure functions so adapters can
//! run it inside their own per-user critical section. [`EntitlementEngine`]
//! decides which cap applies to a user and drives the adapter.

use chrono::{DateTime, Datelike, Utc};
use std::sync::Arc;

use crate::adapters::{DatabaseAdapter, UsageChange, UsageOutcome};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::ledger::is_currently_active;
use crate::types::{Usage, UsageKind, User};

impl Usage {
    /// Whether `now` falls in a different calendar month (UTC) than the last reset.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.last_reset_date.year() != now.year() || self.last_reset_date.month() != now.month()
    }

    /// Zero the monthly counter when the month has rolled over. Returns whether it did.
    pub fn reset_if_new_month(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_stale(now) {
            self.monthly_analyses = 0;
            self.last_reset_date = now;
            true
        } else {
            false
        }
    }

    /// Add `count` to the counters `kind` maps to. Unknown kinds are ignored.
    pub fn record(&mut self, kind: UsageKind, count: u64) {
        match kind {
            UsageKind::Analysis => {
                self.total_analyses = self.total_analyses.saturating_add(count);
                self.monthly_analyses = self.monthly_analyses.saturating_add(count);
            }
            UsageKind::Images => {
                self.images_analyzed = self.images_analyzed.saturating_add(count);
            }
            UsageKind::Download => {
                self.reports_downloaded = self.reports_downloaded.saturating_add(count);
            }
            UsageKind::Unknown => {}
        }
    }

    /// Reset if stale, check the cap, then record.
    pub fn apply_change(&mut self, change: &UsageChange, now: DateTime<Utc>) -> UsageOutcome {
        self.reset_if_new_month(now);

        if let Some(cap) = change.monthly_cap
            && self.monthly_analyses >= cap
        {
            return UsageOutcome::LimitReached(self.clone());
        }

        self.record(change.kind, change.count);
        UsageOutcome::Applied(self.clone())
    }

    /// Whether another analysis fits under `cap`. `None` means unlimited.
    pub fn allows_analysis(&self, cap: Option<u64>) -> bool {
        cap.is_none_or(|cap| self.monthly_analyses < cap)
    }
}

/// A user's entitlement after the monthly reset has been applied.
#[derive(Debug, Clone)]
pub struct Entitlement {
    pub user: User,
    /// Monthly analysis cap, `None` for unlimited.
    pub monthly_cap: Option<u64>,
    pub can_analyze: bool,
}

/// Result of a metered action.
#[derive(Debug, Clone)]
pub struct RecordedUsage {
    pub usage: Usage,
    pub can_analyze: bool,
}

/// Decides and records metered actions.
pub struct EntitlementEngine<DB: DatabaseAdapter> {
    config: Arc<AppConfig>,
    database: Arc<DB>,
}

impl<DB: DatabaseAdapter> EntitlementEngine<DB> {
    pub fn new(config: Arc<AppConfig>, database: Arc<DB>) -> Self {
        Self { config, database }
    }

    /// Monthly analysis cap for `user`, or `None` when unlimited.
    pub async fn monthly_cap(&self, user: &User, now: DateTime<Utc>) -> AppResult<Option<u64>> {
        let free_cap = Some(u64::from(self.config.entitlement.free_monthly_analyses));

        if !user.plan.is_paid() {
            return Ok(free_cap);
        }

        if !self.config.entitlement.enforce_subscription_activity {
            return Ok(None);
        }

        let active = match user.subscription_id.as_deref() {
            Some(id) => self
                .database
                .get_subscription_by_id(id)
                .await?
                .is_some_and(|sub| is_currently_active(&sub, now)),
            None => false,
        };

        Ok(if active { None } else { free_cap })
    }

    /// Apply the monthly reset, persist it, and report what the user may do.
    pub async fn check(&self, user_id: &str, now: DateTime<Utc>) -> AppResult<Entitlement> {
        let user = self.database.refresh_monthly_usage(user_id, now).await?;
        let monthly_cap = self.monthly_cap(&user, now).await?;
        let can_analyze = user.usage.allows_analysis(monthly_cap);
        Ok(Entitlement {
            user,
            monthly_cap,
            can_analyze,
        })
    }

    /// Whether the user may perform `kind` right now. Only analyses are capped.
    pub async fn can_perform(&self, user_id: &str, kind: UsageKind) -> AppResult<bool> {
        let entitlement = self.check(user_id, Utc::now()).await?;
        Ok(match kind {
            UsageKind::Analysis => entitlement.can_analyze,
            _ => true,
        })
    }

    /// Record usage without a limit check.
    pub async fn record_usage(
        &self,
        user_id: &str,
        kind: UsageKind,
        count: u64,
    ) -> AppResult<RecordedUsage> {
        let now = Utc::now();
        let change = UsageChange {
            kind,
            count,
            monthly_cap: None,
        };
        let usage = match self.database.apply_usage(user_id, change, now).await? {
            UsageOutcome::Applied(usage) | UsageOutcome::LimitReached(usage) => usage,
        };
        self.recorded(user_id, usage, now).await
    }

    /// Check the cap and record in one atomic step.
    ///
    /// Analyses beyond the monthly cap fail with [`AppError::UsageLimitReached`]
    /// and leave the counters untouched.
    pub async fn consume(
        &self,
        user_id: &str,
        kind: UsageKind,
        count: u64,
    ) -> AppResult<RecordedUsage> {
        let now = Utc::now();
        let user = self
            .database
            .get_user_by_id(user_id)
            .await?
            .ok_or(AppError::UserNotFound)?;
        let monthly_cap = match kind {
            UsageKind::Analysis => self.monthly_cap(&user, now).await?,
            _ => None,
        };

        let change = UsageChange {
            kind,
            count,
            monthly_cap,
        };
        match self.database.apply_usage(user_id, change, now).await? {
            UsageOutcome::Applied(usage) => self.recorded(user_id, usage, now).await,
            UsageOutcome::LimitReached(usage) => Err(AppError::UsageLimitReached {
                usage,
                plan: user.plan,
            }),
        }
    }

    async fn recorded(
        &self,
        user_id: &str,
        usage: Usage,
        now: DateTime<Utc>,
    ) -> AppResult<RecordedUsage> {
        let user = self
            .database
            .get_user_by_id(user_id)
            .await?
            .ok_or(AppError::UserNotFound)?;
        let cap = self.monthly_cap(&user, now).await?;
        Ok(RecordedUsage {
            can_analyze: usage.allows_analysis(cap),
            usage,
        })
    }
}
